//! # REST Adapter End-to-End Test
//!
//! Runs the whole polling pipeline against a local mock HTTP server: the
//! production `ReqwestEndpointClient`, the `ServiceManager` and the
//! `LocalBroker`. Nothing leaves the machine.
//!
//! ## Scenarios:
//! 1. `auto` endpoints resolve to JSON, plain text and binary topics.
//! 2. An endpoint declared `json` answering `text/plain` is rejected and
//!    keeps polling.
//! 3. A failing endpoint is reported and does not disturb the others.
//! 4. Standby stops the requests; activation resumes them.
//! 5. Reconfiguration replaces a changed service; shutdown removes topics.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use lib_adapter::broker::LocalBroker;
use lib_adapter::endpoints::{EndpointTypeResolver, TopicValue};
use lib_adapter::metrics::CountingMetricsCollector;
use lib_adapter::model::{EndpointDescriptor, ServiceDescriptor};
use lib_adapter::retrieve::{ReqwestEndpointClient, ReqwestEndpointClientOptions};
use lib_adapter::services::{ServiceManager, ServiceSessionFactory, SessionContext};
use lib_adapter::topics::{TopicLifecycleManager, TopicRetention, TopicType};

/// Counts the requests the mock server answered, by path.
#[derive(Default)]
struct Hits {
    total: AtomicUsize,
    by_path: Mutex<HashMap<String, usize>>,
}

impl Hits {
    fn record(&self, path: &str) {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut by_path) = self.by_path.lock() {
            *by_path.entry(path.to_string()).or_insert(0) += 1;
        }
    }

    fn get(&self, path: &str) -> usize {
        self.by_path
            .lock()
            .map(|by_path| by_path.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// Starts a mock server on a random port answering a fixed route table.
fn start_mock_server() -> (u16, Arc<Hits>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener.local_addr().expect("local address").port();
    let hits = Arc::new(Hits::default());
    let counter = hits.clone();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut request_line = String::new();
            {
                let mut reader = BufReader::new(&stream);
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                // Drain the headers.
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 2).unwrap_or(false) {
                    line.clear();
                }
            }
            let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
            counter.record(&path);

            let (status, content_type, body): (&str, &str, Vec<u8>) = match path.as_str() {
                "/json" => ("200 OK", "application/json", br#"{"a":1}"#.to_vec()),
                "/text" => ("200 OK", "text/plain; charset=utf-8", b"hello".to_vec()),
                "/bin" => ("200 OK", "application/octet-stream", vec![0, 1, 2, 255]),
                "/v2/json" => ("200 OK", "application/json", br#"{"a":2}"#.to_vec()),
                _ => ("503 Service Unavailable", "text/plain", b"down".to_vec()),
            };
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len(),
                content_type
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
    });

    (port, hits)
}

fn service(port: u16, json_url: &str) -> ServiceDescriptor {
    ServiceDescriptor::new("mock", "127.0.0.1", "rest/mock")
        .with_origin(port, false)
        .with_poll_period(Duration::from_millis(200))
        .with_endpoint(EndpointDescriptor::new("json", json_url, "json", "auto"))
        .with_endpoint(EndpointDescriptor::new("text", "/text", "text", "auto"))
        .with_endpoint(EndpointDescriptor::new("bin", "/bin", "bin", "auto"))
        .with_endpoint(EndpointDescriptor::new("strict", "/text", "strict", "json"))
        .with_endpoint(EndpointDescriptor::new("down", "/down", "down", "auto"))
}

/// # Main Test Function
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (port, hits) = start_mock_server();

    let broker = Arc::new(LocalBroker::new());
    let collector = Arc::new(CountingMetricsCollector::new());
    let context = SessionContext {
        resolver: Arc::new(EndpointTypeResolver::new()?),
        client: Arc::new(ReqwestEndpointClient::new(ReqwestEndpointClientOptions::default())?),
        topics: TopicLifecycleManager::new(broker.clone(), collector.clone()),
        gateway: broker.clone(),
        metrics: collector.clone(),
        retention: TopicRetention::RemoveWhenUnused,
    };
    let manager = ServiceManager::new(ServiceSessionFactory::new(context));
    let mut updates = broker.subscribe();

    println!("--- Starting REST Adapter Tests (mock server on port {}) ---", port);

    // --- TEST 1: Type inference ---
    println!("\n[Test 1] Testing auto type resolution...");
    let report = manager.reconfigure(vec![service(port, "/json")]);
    assert_eq!(report.started, vec!["mock".to_string()]);
    tokio::time::sleep(Duration::from_millis(700)).await;

    let json = broker.topic("rest/mock/json").ok_or("json topic missing")?;
    assert_eq!(json.topic_type, TopicType::Json);
    assert_eq!(json.value, Some(TopicValue::Json(serde_json::json!({ "a": 1 }))));
    assert_eq!(broker.value("rest/mock/text"), Some(TopicValue::String("hello".to_string())));
    assert_eq!(
        broker.value("rest/mock/bin"),
        Some(TopicValue::Binary(vec![0u8, 1, 2, 255].into()))
    );
    let update = updates.recv().await?;
    assert!(update.path.starts_with("rest/mock/"));
    println!("✅ Topics: {:?}", broker.topic_paths());

    // --- TEST 2: Content type mismatch ---
    println!("\n[Test 2] Testing declared type mismatch...");
    assert!(broker.topic("rest/mock/strict").is_none());
    let summary = collector.summary();
    assert!(summary.responses_rejected >= 2, "rejected {}", summary.responses_rejected);
    println!("✅ Mismatches rejected: {}", summary.responses_rejected);

    // --- TEST 3: Failing endpoint ---
    println!("\n[Test 3] Testing failing endpoint isolation...");
    assert!(broker.topic("rest/mock/down").is_none());
    assert!(summary.poll_failures >= 2);
    assert!(hits.get("/down") >= 2);
    assert!(hits.get("/json") >= 2);
    println!("✅ Failures reported: {}, other endpoints kept polling", summary.poll_failures);

    // --- TEST 4: Standby and activation ---
    println!("\n[Test 4] Testing standby/active handover...");
    assert!(broker.standby("mock"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let during_standby = hits.total.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(hits.total.load(Ordering::SeqCst), during_standby);
    assert!(broker.topic_paths().is_empty());

    assert!(broker.activate("mock"));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(hits.total.load(Ordering::SeqCst) > during_standby);
    assert!(broker.topic("rest/mock/json").is_some());
    println!("✅ Polling paused on standby and resumed on activation");

    // --- TEST 5: Reconfiguration and shutdown ---
    println!("\n[Test 5] Testing reconfiguration and shutdown...");
    let report = manager.reconfigure(vec![service(port, "/v2/json")]);
    assert_eq!(report.closed, vec!["mock".to_string()]);
    assert_eq!(report.started, vec!["mock".to_string()]);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        broker.value("rest/mock/json"),
        Some(TopicValue::Json(serde_json::json!({ "a": 2 })))
    );

    manager.close();
    tokio::time::sleep(Duration::from_millis(100)).await;
    broker.close();
    assert!(broker.topic_paths().is_empty());
    println!("✅ Final metrics: {}", serde_json::to_string(&collector.summary())?);

    println!("\n--- All Tests Passed Successfully ---");
    Ok(())
}
