//! Upload flow tests against a local HTTP stub.
//!
//! These verify the windowing contract end to end:
//! - `ceil(N/B)` windows, concatenating to the input order exactly
//! - The 120-record / batch-50 accounting (3 windows: 50, 50, 20)
//! - A transient 5xx followed by a 2xx counts the window as uploaded
//!   and leaves nothing in the failed-URLs file

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rinkscout_common::{Config, OutputPaths};
use rinkscout_uploader::uploader::BatchUploader;

/// Read one HTTP request off the socket, returning its body.
async fn read_request(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut tmp).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    Some(buf[header_end..].to_vec())
}

/// Answer each request with the next canned status, capturing the
/// parsed request documents in order.
async fn serve(listener: TcpListener, statuses: Vec<u16>, captured: Arc<Mutex<Vec<Value>>>) {
    let mut queue = statuses.into_iter();
    'accept: while let Ok((mut socket, _)) = listener.accept().await {
        while let Some(body) = read_request(&mut socket).await {
            let Some(status) = queue.next() else {
                break 'accept;
            };
            if let Ok(doc) = serde_json::from_slice::<Value>(&body) {
                captured.lock().unwrap().push(doc);
            }
            let response = format!("HTTP/1.1 {status} X\r\ncontent-length: 0\r\n\r\n");
            if socket.write_all(response.as_bytes()).await.is_err() {
                continue 'accept;
            }
        }
    }
}

fn test_config(endpoint: String, dir: &std::path::Path) -> Config {
    let mut paths = OutputPaths::from_env();
    paths.failed_urls = dir.join("failed_urls.txt");
    Config {
        base_url: "https://site.test".to_string(),
        games_url: "https://site.test/games".to_string(),
        graphql_url: "https://site.test/graphql".to_string(),
        login: None,
        cookie_header: None,
        image_base_url: "https://site.test/img/".to_string(),
        upload_endpoint: endpoint,
        upload_batch_size: 50,
        upload_max_input_bytes: 1 << 20,
        paths,
    }
}

fn record(i: usize) -> Value {
    json!({
        "user_id": i,
        "age": "20",
        "profile_link": format!("https://site.test/player/{i}/p")
    })
}

#[tokio::test]
async fn windows_partition_in_order_with_ceil_accounting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(serve(listener, vec![200, 200, 200], captured.clone()));

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(format!("http://{addr}/upload"), dir.path());
    let records: Vec<Value> = (0..120).map(record).collect();

    let uploader = BatchUploader::new(&config).unwrap();
    let stats = uploader.upload(records).await.unwrap();

    assert!(stats.is_success());
    assert_eq!(stats.windows, 3);
    assert_eq!(stats.windows_ok, 3);
    assert_eq!(stats.records_uploaded, 120);
    assert_eq!(stats.records_failed, 0);
    assert!(!config.paths.failed_urls.exists());

    let captured = captured.lock().unwrap();
    let sizes: Vec<usize> = captured
        .iter()
        .map(|d| d["recentlyUpdatedPlayers"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![50, 50, 20]);

    // Concatenating the windows reproduces the input order.
    let ids: Vec<i64> = captured
        .iter()
        .flat_map(|d| d["recentlyUpdatedPlayers"].as_array().unwrap())
        .map(|r| r["user_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (0..120).collect::<Vec<i64>>());
}

#[tokio::test]
async fn transient_failure_then_success_counts_as_uploaded() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(serve(listener, vec![503, 200], captured.clone()));

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(format!("http://{addr}/upload"), dir.path());

    let uploader = BatchUploader::new(&config).unwrap();
    let stats = uploader.upload(vec![record(1)]).await.unwrap();

    assert!(stats.is_success());
    assert_eq!(stats.windows_ok, 1);
    assert_eq!(stats.records_uploaded, 1);
    assert!(!config.paths.failed_urls.exists());

    // The window was sent twice: the 503 attempt, then the retry.
    assert_eq!(captured.lock().unwrap().len(), 2);
}
