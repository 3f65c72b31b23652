use schooldocsd::config::{DaemonConfig, LOG_ENV};
use schooldocsd::ipc;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

fn main() {
    // Stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match DaemonConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    LocalSet::new().block_on(&runtime, serve(config));
}

async fn serve(config: DaemonConfig) {
    let (outbox, mut lines_out) = mpsc::unbounded_channel::<serde_json::Value>();
    let writer = tokio::task::spawn_local(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = lines_out.recv().await {
            let line = serde_json::to_string(&value).unwrap_or_else(|_| "{\"ok\":false}".to_string());
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway_timeout_ms = config.gateway_timeout.as_millis() as u64,
        "schooldocsd ready"
    );
    let mut state = ipc::AppState::new(config, outbox.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(v)) => v,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = outbox.send(json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                }));
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req).await;
        let _ = outbox.send(resp);
    }

    state.drain().await;
    drop(state);
    drop(outbox);
    let _ = writer.await;
}
