//! Remote Annotator Integration Tests
//!
//! Runs the Ollama annotator against a one-shot local HTTP server.

use std::time::Duration;

use istok::adapters::{DashboardLink, OllamaAnnotator, RemoteAnnotator, RemoteExtraction};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve one canned response, returning the base URL and the request body
async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/api/generate", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + length || n == 0 {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        let text = String::from_utf8_lossy(&request).to_string();
        text.split("\r\n\r\n").nth(1).unwrap_or_default().to_string()
    });

    (url, handle)
}

#[tokio::test]
async fn test_parsed_answer_and_dashboard_link() {
    let generated = "```json\n{\"equipment\": \"пресс\", \"number\": 3, \"symptom\": \"вибрация\", \"action\": \"проверить\", \"urgency\": \"срочный\"}\n```";
    let body = serde_json::json!({ "response": generated }).to_string();
    let (url, server) = serve_once("200 OK", body).await;

    let annotator = OllamaAnnotator::new(url, "phi3", Duration::from_secs(10));
    let result = annotator.annotate("Пресс 3 вибрирует, срочно").await.unwrap();

    let entities = result.entities().expect("parsed entities");
    assert_eq!(entities.equipment.as_deref(), Some("пресс"));
    assert_eq!(entities.number.as_deref(), Some("3"));
    assert_eq!(entities.urgency.as_deref(), Some("срочный"));

    let link = DashboardLink::from_entities(entities);
    assert_eq!(link.pid.as_deref(), Some("WNPress:3"));
    assert_eq!(link.tid.as_deref(), Some("NC_VIBRATION"));

    let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["model"], "phi3");
    assert_eq!(request["stream"], false);
    assert!(request["prompt"].as_str().unwrap().contains("Пресс 3 вибрирует, срочно"));
}

#[tokio::test]
async fn test_error_status_is_raw() {
    let (url, _server) = serve_once("500 Internal Server Error", "model not loaded".to_string()).await;

    let annotator = OllamaAnnotator::new(url, "phi3", Duration::from_secs(10));
    let result = annotator.annotate("Насос течет").await.unwrap();
    assert_eq!(
        result,
        RemoteExtraction::Raw {
            raw_response: "model not loaded".to_string()
        }
    );
}

#[tokio::test]
async fn test_prose_answer_is_raw() {
    let body = serde_json::json!({ "response": "Оборудование: насос" }).to_string();
    let (url, _server) = serve_once("200 OK", body).await;

    let annotator = OllamaAnnotator::new(url, "phi3", Duration::from_secs(10));
    let result = annotator.annotate("Насос течет").await.unwrap();
    assert!(result.entities().is_none());
}
