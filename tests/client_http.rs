//! Training client against a local HTTP stub.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Map};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use trainscope::client::{TrainRequest, TrainingClient};
use trainscope::config::Config;
use trainscope::result::RawResult;

/// Reads one request off the socket and returns its body.
async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                return text[head_end + 4..].to_string();
            }
        }
    }
    String::new()
}

/// Serves `responses` in order, one per connection, and returns the base URL.
async fn serve(responses: Vec<(u16, serde_json::Value)>, hits: Arc<AtomicUsize>, bodies: Arc<std::sync::Mutex<Vec<String>>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            bodies.lock().unwrap().push(request);
            hits.fetch_add(1, Ordering::SeqCst);
            let payload = body.to_string();
            let reply = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                payload.len(),
                payload
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        }
    });
    format!("http://{}", addr)
}

fn config(base: String) -> Config {
    Config {
        api_base: base,
        http_timeout_secs: 5,
        retry_max: 2,
        retry_base_ms: 1,
        ..Default::default()
    }
}

fn request() -> TrainRequest {
    TrainRequest {
        dataset_id: "ds-42".to_string(),
        algorithm: "Decision Tree".to_string(),
        target_column: "label".to_string(),
        parameters: Map::new(),
    }
}

#[tokio::test]
async fn test_train_decodes_envelope() {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(std::sync::Mutex::new(Vec::new()));
    let base = serve(
        vec![(200, json!({"status": "success", "results": {"type": "classification", "accuracy": 0.9}}))],
        hits.clone(),
        bodies.clone(),
    )
    .await;

    let client = TrainingClient::new(&config(base)).unwrap();
    let result = client.train(&request()).await.unwrap();

    match result {
        RawResult::Classification(c) => assert_eq!(c.accuracy, Some(0.9)),
        other => panic!("expected classification, got {:?}", other),
    }
    let sent: serde_json::Value = serde_json::from_str(&bodies.lock().unwrap()[0]).unwrap();
    assert_eq!(sent["datasetId"], "ds-42");
    assert_eq!(sent["targetColumn"], "label");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(std::sync::Mutex::new(Vec::new()));
    let base = serve(
        vec![
            (503, json!({"message": "warming up"})),
            (200, json!({"status": "success", "results": {"type": "clustering", "n_clusters": 3}})),
        ],
        hits.clone(),
        bodies,
    )
    .await;

    let client = TrainingClient::new(&config(base)).unwrap();
    let result = client.train(&request()).await.unwrap();

    assert_eq!(result.kind(), "clustering");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_error_surfaces_message() {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(std::sync::Mutex::new(Vec::new()));
    let base = serve(vec![(400, json!({"message": "unknown dataset"}))], hits.clone(), bodies).await;

    let client = TrainingClient::new(&config(base)).unwrap();
    let err = client.train(&request()).await.unwrap_err();

    assert!(format!("{:#}", err).contains("unknown dataset"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_envelope_is_an_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(std::sync::Mutex::new(Vec::new()));
    let base = serve(vec![(200, json!({"error": "not enough rows"}))], hits, bodies).await;

    let client = TrainingClient::new(&config(base)).unwrap();
    let err = client.train(&request()).await.unwrap_err();
    assert!(format!("{:#}", err).contains("not enough rows"));
}
