//! Handler invocation against a real Node.js runtime.
//!
//! Skipped when `node` is not on PATH.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use edge_emulator::event::{CallbackResult, Stage};
use edge_emulator::handler::{HandlerInvoker, HandlerRef, Invocation, InvocationError, NodeInvoker};

fn node_available() -> bool {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn write_handler(dir: &Path, name: &str, source: &str) {
    let handler_dir = dir.join(name);
    std::fs::create_dir_all(&handler_dir).unwrap();
    std::fs::write(handler_dir.join("index.js"), source).unwrap();
}

fn event() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "Records": [{
            "cf": {
                "config": {
                    "distributionId": "E1234567890",
                    "distributionName": "E1234567890",
                    "eventType": "viewer-request",
                    "requestId": "00000000-0000-0000-0000-000000000000"
                },
                "request": {
                    "clientIp": "127.0.0.1",
                    "headers": {"host": [{"key": "Host", "value": "localhost"}]},
                    "method": "GET",
                    "querystring": "",
                    "uri": "/bar"
                }
            }
        }]
    }))
    .unwrap()
}

async fn invoke(dir: &Path, name: &str, timeout: Duration) -> Result<Value, InvocationError> {
    let payload = event();
    let handler = HandlerRef::new(name, "index.handler");
    let raw = NodeInvoker::default()
        .invoke(Invocation {
            stage: Stage::ViewerRequest,
            payload: &payload,
            handler: &handler,
            working_directory: dir,
            timeout,
        })
        .await?;
    Ok(serde_json::from_slice(&raw).unwrap())
}

#[tokio::test]
async fn callback_style_handler_returns_its_result() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_handler(
        dir.path(),
        "redirect",
        r#"
exports.handler = (event, context, callback) => {
  const request = event.Records[0].cf.request;
  console.log('redirecting', request.uri);
  callback(null, {
    status: '302',
    headers: { location: [{ key: 'Location', value: '/login?from=' + request.uri }] },
  });
};
"#,
    );

    let result = invoke(dir.path(), "redirect", Duration::from_secs(10)).await.unwrap();
    assert_eq!(result["status"], "302");
    assert_eq!(result["headers"]["location"][0]["value"], "/login?from=/bar");

    let parsed = CallbackResult::parse(result.to_string().as_bytes()).unwrap();
    assert_eq!(parsed.short_circuit_status(), Some("302"));
}

#[tokio::test]
async fn async_handler_result_is_delivered_once() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_handler(
        dir.path(),
        "asyncish",
        r#"
exports.handler = async (event, context, callback) => {
  const request = event.Records[0].cf.request;
  request.headers['x-seen'] = [{ key: 'X-Seen', value: '1' }];
  return request;
};
"#,
    );

    let result = invoke(dir.path(), "asyncish", Duration::from_secs(10)).await.unwrap();
    assert_eq!(result["uri"], "/bar");
    assert_eq!(result["headers"]["x-seen"][0]["value"], "1");
}

#[tokio::test]
async fn lingering_event_loop_does_not_delay_the_result() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_handler(
        dir.path(),
        "lingers",
        r#"
exports.handler = (event, context, callback) => {
  callback(null, { status: '200' });
  setTimeout(() => {}, 10000);
};
"#,
    );

    let started = std::time::Instant::now();
    let result = invoke(dir.path(), "lingers", Duration::from_secs(3)).await.unwrap();
    assert_eq!(result["status"], "200");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn throwing_handler_is_a_failure_with_output() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_handler(
        dir.path(),
        "throws",
        "exports.handler = () => { throw new Error('boom from handler'); };\n",
    );

    let err = invoke(dir.path(), "throws", Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Failed { .. }));
    assert!(err.output().unwrap().contains("boom from handler"));
}

#[tokio::test]
async fn handler_that_never_answers_times_out() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_handler(
        dir.path(),
        "hangs",
        "exports.handler = () => { setInterval(() => {}, 1000); };\n",
    );

    let err = invoke(dir.path(), "hangs", Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Timeout(_)));
}

#[tokio::test]
async fn es_module_handlers_are_imported() {
    if !node_available() {
        eprintln!("node not found, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("package.json"), r#"{"type":"module"}"#).unwrap();
    write_handler(
        dir.path(),
        "esm",
        r#"
export const handler = async (event) => ({ status: '204' });
"#,
    );

    let result = invoke(dir.path(), "esm", Duration::from_secs(10)).await.unwrap();
    assert_eq!(result["status"], "204");
}
