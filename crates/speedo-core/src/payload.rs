//! Synthetic payload generation for download measurements
//!
//! A payload is never materialised: the generator hands out a stream of
//! chunks whose lengths add up to exactly the requested size.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

/// Ordered stream of opaque payload chunks
pub type PayloadStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Default chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Produces measurement payloads
pub trait PayloadGenerator: Send + Sync {
    /// Stream of chunks totalling exactly `size` bytes
    fn produce(&self, size: u64) -> PayloadStream;
}

/// Generator backed by one pre-filled block
///
/// Every chunk is a reference-counted slice of the same block, so
/// producing a chunk costs no copy and memory stays at one block however
/// large the payload is.
#[derive(Debug, Clone)]
pub struct BlockPayload {
    block: Bytes,
}

impl BlockPayload {
    pub fn new(chunk_size: usize) -> Self {
        let mut block = vec![0u8; chunk_size.max(1)];
        fill_random(&mut block);
        Self {
            block: Bytes::from(block),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.block.len()
    }
}

impl Default for BlockPayload {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl PayloadGenerator for BlockPayload {
    fn produce(&self, size: u64) -> PayloadStream {
        let block = self.block.clone();
        stream::unfold(size, move |remaining| {
            let block = block.clone();
            async move {
                if remaining == 0 {
                    return None;
                }
                let n = remaining.min(block.len() as u64) as usize;
                Some((Ok(block.slice(..n)), remaining - n as u64))
            }
        })
        .boxed()
    }
}

/// Fill buffer with pseudo-random bytes (xorshift64)
///
/// Content only has to defeat transparent compression along the path.
fn fill_random(buf: &mut [u8]) {
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9E37_79B9_7F4A_7C15)
        | 1;

    for chunk in buf.chunks_mut(8) {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
}
