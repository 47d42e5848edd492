//! Endpoint handlers

pub mod ip;
pub mod measure;
pub mod results;
pub mod static_files;

pub use ip::IpInfo;
pub use measure::{Measure, DEFAULT_DOWNLOAD_SIZE};
pub use results::{Results, RESULTS_PREFIX};
pub use static_files::{StaticFileConfig, StaticFiles, VIRTUAL_PAGE_PREFIXES};
