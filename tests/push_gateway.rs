//! Push against a fake Pushgateway on a local TCP socket.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use e2e_dashboard::config::MetricsConfig;
use e2e_dashboard::metrics::{MetricsExporter, PushError};

/// Accept one connection, capture the raw request and answer with `response`.
async fn fake_gateway(response: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).into_owned()
    });

    (format!("http://{addr}"), handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

fn config(url: &str) -> MetricsConfig {
    MetricsConfig {
        gateway_url: Some(url.to_string()),
        username: Some("probe".into()),
        password: Some("s3cret".into()),
        timeout_secs: 2,
        ..MetricsConfig::default()
    }
}

#[tokio::test]
async fn test_push_posts_exposition_with_auth() {
    let (url, server) = fake_gateway("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
    let exporter = MetricsExporter::new(config(&url)).unwrap();

    assert_ok!(exporter.push("STAC API", "prod", true, 12.5).await);

    let request = server.await.unwrap();
    let (head, body) = request.split_once("\r\n\r\n").unwrap();
    let head_lower = head.to_ascii_lowercase();

    assert!(head.starts_with("POST /metrics/job/e2e_direct/env/prod/service/STAC%20API HTTP/1.1"));
    assert!(head_lower.contains("content-type: text/plain; version=0.0.4"));
    assert!(head_lower.contains("authorization: basic chjvymu6cznjcmv0"));

    assert!(body.contains("# TYPE eodc_e2e_last_result gauge\neodc_e2e_last_result 1\n"));
    assert!(body.contains("eodc_e2e_test_duration_seconds 12.5\n"));
    assert!(body.contains("eodc_e2e_last_success_timestamp "));
    assert!(!body.contains('{'));
}

#[tokio::test]
async fn test_failed_run_omits_last_success_timestamp() {
    let (url, server) = fake_gateway("HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\n\r\n").await;
    let exporter = MetricsExporter::new(MetricsConfig {
        username: None,
        ..config(&url)
    })
    .unwrap();

    assert_ok!(exporter.push("Dask Gateway", "dev", false, 3.0).await);

    let request = server.await.unwrap();
    assert!(!request.to_ascii_lowercase().contains("authorization:"));
    assert!(request.contains("eodc_e2e_last_result 0\n"));
    assert!(!request.contains("last_success_timestamp"));
}

#[tokio::test]
async fn test_rejected_push_surfaces_status_and_body() {
    let (url, server) = fake_gateway(
        "HTTP/1.1 400 Bad Request\r\ncontent-length: 15\r\n\r\nduplicate label",
    )
    .await;
    let exporter = MetricsExporter::new(config(&url)).unwrap();

    let err = assert_err!(exporter.push("openEO API", "dev", true, 1.0).await);
    match err {
        PushError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "duplicate label");
        }
        other => panic!("unexpected error: {other}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_unresponsive_gateway_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let _hold = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let exporter = MetricsExporter::new(MetricsConfig {
        timeout_secs: 1,
        ..config(&url)
    })
    .unwrap();

    let err = assert_err!(exporter.push("OpenStack", "dev", true, 1.0).await);
    assert!(matches!(err, PushError::Timeout(_)), "{err}");
}
