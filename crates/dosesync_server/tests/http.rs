//! HTTP-level tests for the data server.

use dosesync_protocol::ErrorCode;
use dosesync_server::{AccessConfig, DataServer, ServerConfig};
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

async fn spawn(access: AccessConfig) -> (DataServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::new(dir.path())
        .with_bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .with_port(0)
        .with_access(access);
    (DataServer::spawn(config).await.unwrap(), dir)
}

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(5))
        .build()
}

/// Performs a request, returning status and JSON body for any status code.
fn call(request: ureq::Request, body: Option<&str>) -> (u16, Value) {
    let result = match body {
        Some(body) => request.send_string(body),
        None => request.call(),
    };
    match result {
        Ok(resp) => (resp.status(), resp.into_json().unwrap()),
        Err(ureq::Error::Status(code, resp)) => (code, resp.into_json().unwrap()),
        Err(err) => panic!("transport error: {err}"),
    }
}

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn routes_over_the_wire() {
    let (server, _dir) = spawn(AccessConfig::new()).await;
    let base = format!("http://{}", server.local_addr());

    let (ping, meta, missing) = blocking(move || {
        let agent = agent();
        (
            call(agent.get(&format!("{base}/api/network/ping/")), None),
            call(agent.get(&format!("{base}/api/network/tracker-meta")), None),
            call(agent.get(&format!("{base}/api/other")), None),
        )
    })
    .await;

    assert_eq!(ping.0, 200);
    assert_eq!(ping.1["ok"], true);
    assert_eq!(meta.1, json!({"ok": true, "mtime": 0.0}));
    assert_eq!(missing, (404, json!({"ok": false, "error": "not_found"})));

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn access_key_by_header_or_query() {
    let (server, _dir) = spawn(AccessConfig::new().with_access_key("hunter2")).await;
    let base = format!("http://{}", server.local_addr());

    let results = blocking(move || {
        let agent = agent();
        let url = format!("{base}/api/network/ping");
        vec![
            call(agent.get(&url), None).0,
            call(agent.get(&url).set("X-Access-Key", "wrong"), None).0,
            call(agent.get(&url).set("X-Access-Key", "hunter2"), None).0,
            call(agent.get(&url).query("key", "hunter2"), None).0,
            call(agent.get(&url).query("key", "wrong"), None).0,
        ]
    })
    .await;

    assert_eq!(results, vec![401, 401, 200, 200, 401]);
    let stats = server
        .handler()
        .context()
        .access
        .audit_stats(ErrorCode::InvalidAccessKey);
    assert_eq!(stats.emitted + stats.suppressed, 3);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_wrong_shape_and_garbage() {
    let (server, dir) = spawn(AccessConfig::new()).await;
    let base = format!("http://{}", server.local_addr());

    let (array_for_tracker, garbage) = blocking(move || {
        let agent = agent();
        let url = format!("{base}/api/network/tracker-data");
        (
            call(agent.put(&url), Some("[1, 2]")),
            call(agent.put(&url), Some("{\"logs\": [")),
        )
    })
    .await;

    let expected = json!({"ok": false, "error": "invalid_tracker_payload"});
    assert_eq!(array_for_tracker, (400, expected.clone()));
    assert_eq!(garbage, (400, expected));
    assert!(!dir.path().join("tracker.json").exists());

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_puts_store_one_payload() {
    let (server, _dir) = spawn(AccessConfig::new()).await;
    let url = format!("http://{}/api/network/library-data", server.local_addr());

    let a = json!((0..300).map(|i| json!({"id": i, "who": "a"})).collect::<Vec<_>>());
    let b = json!((0..200).map(|i| json!({"id": i, "who": "b"})).collect::<Vec<_>>());

    let puts: Vec<_> = [a.clone(), b.clone()]
        .into_iter()
        .map(|doc| {
            let url = url.clone();
            tokio::task::spawn_blocking(move || call(agent().put(&url), Some(&doc.to_string())))
        })
        .collect();
    for put in puts {
        assert_eq!(put.await.unwrap(), (200, json!({"ok": true})));
    }

    let stored = blocking(move || call(agent().get(&url), None).1).await;
    assert!(stored == a || stored == b);

    server.shutdown().await.unwrap();
}
