//! End-to-end dispatch behaviour over the public API

use futures_util::StreamExt;
use http::Method;
use speedo_core::handlers::VIRTUAL_PAGE_PREFIXES;
use speedo_core::{
    BlockPayload, Body, Collaborators, Dispatcher, FsResultStore, NoGeo, Request,
    RequestBuilder, Response, ServerConfig, StatusCode,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    dispatcher: Dispatcher,
    results_dir: PathBuf,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let web_root = root.join("web");
    std::fs::create_dir_all(web_root.join("css")).unwrap();
    std::fs::write(web_root.join("index.html"), "<!doctype html><div id=app></div>").unwrap();
    std::fs::write(web_root.join("css/style.css"), "body{margin:0}").unwrap();
    std::fs::write(web_root.join("data.bin"), [1u8, 2, 3]).unwrap();

    let results_dir = root.join("results");
    let mut config = ServerConfig::new(&web_root);
    config.results_dir = results_dir.clone();

    let collaborators = Collaborators::new(
        Arc::new(BlockPayload::default()),
        Arc::new(FsResultStore::open(results_dir.clone()).await.unwrap()),
        Arc::new(NoGeo),
    );

    Fixture {
        dispatcher: Dispatcher::new(&config, collaborators),
        results_dir,
        _dir: dir,
    }
}

fn get(path: &str) -> Request {
    RequestBuilder::new(Method::GET, path).build()
}

/// Bytes in a body, counted without collecting it
async fn body_len(res: Response) -> u64 {
    match res.body {
        Body::Full(bytes) => bytes.len() as u64,
        Body::Stream(mut stream) => {
            let mut total = 0u64;
            while let Some(chunk) = stream.next().await {
                total += chunk.unwrap().len() as u64;
            }
            total
        }
    }
}

#[tokio::test]
async fn download_streams_exact_size() {
    let f = fixture().await;

    for size in [0u64, 1, 1024, 8_388_608, 100_000_000] {
        let req = RequestBuilder::new(Method::GET, "/download")
            .query(format!("size={}", size))
            .build();
        let res = f.dispatcher.dispatch(req).await;

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("application/octet-stream"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.content_length(), Some(size));
        assert_eq!(body_len(res).await, size, "size {}", size);
    }
}

#[tokio::test]
async fn download_defaults_to_8_mib() {
    let f = fixture().await;
    let res = f.dispatcher.dispatch(get("/download")).await;

    assert_eq!(res.content_length(), Some(8_388_608));
    assert_eq!(body_len(res).await, 8_388_608);
}

#[tokio::test]
async fn ping_and_upload_accept_anything() {
    let f = fixture().await;

    for path in ["/ping", "/upload"] {
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            let req = RequestBuilder::new(method.clone(), path)
                .body(vec![0u8; 300_000])
                .build();
            let res = f.dispatcher.dispatch(req).await;

            assert_eq!(res.status, StatusCode::OK, "{} {}", method, path);
            assert_eq!(res.header("access-control-allow-origin"), Some("*"));
            assert_eq!(body_len(res).await, 0);
        }
    }
}

#[tokio::test]
async fn save_then_fetch_round_trip() {
    let f = fixture().await;
    let doc = serde_json::json!({"download": 93.4, "upload": 11.2, "latency": [12, 14, 13]});

    let req = RequestBuilder::new(Method::POST, "/save")
        .body(doc.to_string())
        .build();
    let res = f.dispatcher.dispatch(req).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some("text/plain"));
    let id = String::from_utf8(res.body.collect().await.unwrap().to_vec()).unwrap();
    assert_eq!(id.len(), 32);
    assert!(f.results_dir.join(format!("{}.json", id)).is_file());

    let res = f.dispatcher.dispatch(get(&format!("/results/{}.json", id))).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some("application/json"));
    let stored: serde_json::Value =
        serde_json::from_slice(&res.body.collect().await.unwrap()).unwrap();
    assert_eq!(stored, doc);
}

#[tokio::test]
async fn saves_get_distinct_ids() {
    let f = fixture().await;
    let mut ids = std::collections::HashSet::new();

    for i in 0..8 {
        let req = RequestBuilder::new(Method::POST, "/save")
            .body(format!("{{\"run\":{}}}", i))
            .build();
        let res = f.dispatcher.dispatch(req).await;
        let id = res.body.collect().await.unwrap();
        assert!(ids.insert(id));
    }
}

#[tokio::test]
async fn malformed_json_is_server_error() {
    let f = fixture().await;
    let req = RequestBuilder::new(Method::POST, "/save")
        .body("{\"download\": ")
        .build();
    let res = f.dispatcher.dispatch(req).await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.content_type(), Some("text/plain"));
    assert_eq!(std::fs::read_dir(&f.results_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_result_is_empty_404() {
    let f = fixture().await;

    for path in ["/results/does-not-exist.json", "/results/", "/results/..", "/results/%2e%2e"] {
        let res = f.dispatcher.dispatch(get(path)).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", path);
        assert_eq!(body_len(res).await, 0, "{}", path);
    }
}

#[tokio::test]
async fn get_save_falls_through_to_static() {
    let f = fixture().await;
    let res = f.dispatcher.dispatch(get("/save")).await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body.collect().await.unwrap(), "Not found");
}

#[tokio::test]
async fn virtual_pages_serve_the_index() {
    let f = fixture().await;

    let index = f.dispatcher.dispatch(get("/")).await;
    assert_eq!(index.status, StatusCode::OK);
    assert_eq!(index.content_type(), Some("text/html"));
    let expected = index.body.collect().await.unwrap();

    for prefix in VIRTUAL_PAGE_PREFIXES {
        let mut paths = vec![prefix.to_string()];
        // `/results/...` belongs to the result store
        if *prefix != "/results" {
            paths.push(format!("{}/abc", prefix));
        }

        for path in paths {
            let res = f.dispatcher.dispatch(get(&path)).await;
            assert_eq!(res.status, StatusCode::OK, "{}", path);
            assert_eq!(res.content_type(), Some("text/html"), "{}", path);
            assert_eq!(res.body.collect().await.unwrap(), expected, "{}", path);
        }
    }
}

#[tokio::test]
async fn results_subpath_is_not_a_virtual_page() {
    let f = fixture().await;
    let res = f.dispatcher.dispatch(get("/results/abc")).await;

    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(body_len(res).await, 0);
}

#[tokio::test]
async fn static_assets_by_extension() {
    let f = fixture().await;

    let res = f.dispatcher.dispatch(get("/css/style.css")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some("text/css"));
    assert!(res.header("last-modified").is_some());

    let res = f.dispatcher.dispatch(get("/data.bin")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some("text/plain"));
    assert_eq!(res.content_length(), Some(3));

    let res = f.dispatcher.dispatch(get("/nonexistent-file.xyz")).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.content_type(), Some("text/plain"));
    assert_eq!(res.body.collect().await.unwrap(), "Not found");
}

#[tokio::test]
async fn ip_reports_client_address() {
    let f = fixture().await;
    let req = RequestBuilder::new(Method::GET, "/ip")
        .remote_addr("[::ffff:203.0.113.9]:40000".parse().unwrap())
        .build();
    let res = f.dispatcher.dispatch(req).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some("application/json"));
    let body: serde_json::Value =
        serde_json::from_slice(&res.body.collect().await.unwrap()).unwrap();
    assert_eq!(body, serde_json::json!({"ip": "203.0.113.9"}));
}
