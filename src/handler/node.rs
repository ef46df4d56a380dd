//! Node.js handler runtime.
//!
//! # Responsibilities
//! - Resolve `<working_dir>/<path>/<file>.js` and its module flavour
//! - Spawn the runtime with a bootstrap script and feed it the envelope
//! - Surface the handler's console output through tracing
//! - Map exit status, timeouts and missing callbacks to invocation errors
//!
//! # Design Decisions
//! - The envelope travels over stdin; the bootstrap reads locations from the
//!   environment, so nothing user-controlled is spliced into source text
//! - The invocation completes on the first callback; a runtime whose event
//!   loop is still busy afterwards is killed, as is one that times out
//! - Exit without a callback is only judged once the exit status is known

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::handler::callback::CallbackListener;
use crate::handler::{HandlerInvoker, Invocation, InvocationError};

const BOOTSTRAP: &str = r#"
const http = require('http');
const { pathToFileURL } = require('url');

const target = process.env.EDGE_CALLBACK_URL;
const modulePath = process.env.EDGE_HANDLER_MODULE;
const exportName = process.env.EDGE_HANDLER_EXPORT;
const isModule = process.env.EDGE_HANDLER_ESM === '1';

let delivered = false;
const deliver = (result) => {
  if (delivered) return;
  delivered = true;
  const req = http.request(target, { method: 'POST', headers: { 'content-type': 'application/json' } });
  req.on('response', (res) => res.resume());
  req.on('error', (err) => { console.error(err); process.exitCode = 1; });
  req.end(JSON.stringify(result === undefined ? null : result));
};

const fail = (err) => { console.error(err); process.exitCode = 1; };

const run = (mod, event) => {
  const fn = mod[exportName] || (mod.default && mod.default[exportName]);
  if (typeof fn !== 'function') throw new Error(`export ${exportName} not found in ${modulePath}`);
  const callback = (err, result) => (err ? fail(err) : deliver(result));
  return Promise.resolve(fn(event, {}, callback)).then((result) => {
    if (result !== undefined) deliver(result);
  });
};

let input = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', (chunk) => { input += chunk; });
process.stdin.on('end', () => {
  const event = JSON.parse(input);
  const load = isModule ? import(pathToFileURL(modulePath).href) : Promise.resolve(require(modulePath));
  load.then((mod) => run(mod, event)).catch(fail);
});
"#;

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Runs handlers with a Node.js-compatible runtime.
#[derive(Debug, Clone)]
pub struct NodeInvoker {
    runtime: String,
}

impl NodeInvoker {
    /// Run handlers with the `runtime` executable.
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }

    /// The runtime executable name or path.
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    fn module_path(invocation: &Invocation<'_>) -> Result<PathBuf, InvocationError> {
        let (file, _) = invocation
            .handler
            .entry_point()
            .ok_or_else(|| InvocationError::InvalidHandler(invocation.handler.handler.clone()))?;
        let module = invocation
            .working_directory
            .join(&invocation.handler.path)
            .join(format!("{file}.js"));
        // A bare relative path would be resolved as a package name.
        if module.is_absolute() {
            return Ok(module);
        }
        Ok(std::env::current_dir()
            .map(|cwd| cwd.join(&module))
            .unwrap_or(module))
    }
}

impl Default for NodeInvoker {
    fn default() -> Self {
        Self::new("node")
    }
}

/// `package.json` with `"type": "module"` switches loading to `import()`.
fn is_es_module(working_directory: &Path) -> bool {
    let manifest = working_directory.join("package.json");
    std::fs::read(&manifest)
        .ok()
        .and_then(|raw| serde_json::from_slice::<PackageManifest>(&raw).ok())
        .and_then(|manifest| manifest.kind)
        .is_some_and(|kind| kind == "module")
}

/// Log each line of `stream` as it arrives and keep a copy for error reports.
fn capture_output<R>(stage: &'static str, stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut captured = String::new();
        let Some(stream) = stream else {
            return captured;
        };
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                tracing::info!(target: "edge_emulator::handler", stage, "{}", line);
            }
            captured.push_str(&line);
            captured.push('\n');
        }
        captured
    })
}

enum Completion {
    Callback(Bytes),
    Exited(std::io::Result<std::process::ExitStatus>),
}

#[async_trait]
impl HandlerInvoker for NodeInvoker {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<Bytes, InvocationError> {
        let module = Self::module_path(&invocation)?;
        let (_, export) = invocation
            .handler
            .entry_point()
            .ok_or_else(|| InvocationError::InvalidHandler(invocation.handler.handler.clone()))?;
        let esm = is_es_module(invocation.working_directory);

        let mut listener = CallbackListener::bind()
            .await
            .map_err(InvocationError::Listener)?;

        tracing::debug!(
            stage = %invocation.stage,
            handler = %invocation.handler,
            module = %module.display(),
            esm,
            callback = %listener.url(),
            "Invoking handler"
        );

        let mut child = Command::new(&self.runtime)
            .arg("-e")
            .arg(BOOTSTRAP)
            .current_dir(invocation.working_directory)
            .env("EDGE_CALLBACK_URL", listener.url())
            .env("EDGE_HANDLER_MODULE", &module)
            .env("EDGE_HANDLER_EXPORT", export)
            .env("EDGE_HANDLER_ESM", if esm { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                runtime: self.runtime.clone(),
                source,
            })?;

        let stdout = capture_output(invocation.stage.as_str(), child.stdout.take());
        let stderr = capture_output(invocation.stage.as_str(), child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            // A runtime that exits early closes its stdin; the exit status reports why.
            if let Err(e) = stdin.write_all(invocation.payload).await {
                tracing::debug!(error = %e, "Handler runtime closed stdin early");
            }
        }

        let completion = tokio::time::timeout(invocation.timeout, async {
            tokio::select! {
                Some(body) = listener.wait() => Completion::Callback(body),
                status = child.wait() => Completion::Exited(status),
            }
        })
        .await
        .map_err(|_| InvocationError::Timeout(invocation.timeout))?;

        let status = match completion {
            Completion::Callback(body) => {
                if let Err(e) = child.start_kill() {
                    tracing::trace!(error = %e, "Handler runtime already exited");
                }
                return Ok(body);
            }
            Completion::Exited(status) => status.map_err(|source| InvocationError::Spawn {
                runtime: self.runtime.clone(),
                source,
            })?,
        };

        let mut captured = stdout.await.unwrap_or_default();
        captured.push_str(&stderr.await.unwrap_or_default());

        if !status.success() {
            return Err(InvocationError::Failed {
                status: status.to_string(),
                output: captured,
            });
        }

        listener
            .try_take()
            .ok_or(InvocationError::MissingCallback { output: captured })
    }
}
