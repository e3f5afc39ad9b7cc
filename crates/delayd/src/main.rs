//! delayd: serves one model artifact over newline-delimited JSON.
//!
//! Each stdin line is a prediction request, optionally carrying an `id`
//! that is echoed back. Every line is scored on its own task against a
//! shared [`InferenceService`]; responses are written to stdout as they
//! complete, so their order may differ from the input order. The process
//! stops on EOF or Ctrl-C after in-flight requests have been answered.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use delay_core::{InferenceService, Prediction, PredictionRequest, METRICS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn, Level};

/// Requests scored concurrently before the reader stops pulling input.
const MAX_IN_FLIGHT: usize = 64;

#[derive(Parser)]
#[command(name = "delayd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve train delay predictions over stdin/stdout", long_about = None)]
struct Args {
    /// Model artifact to serve
    #[arg(short, long, env = "DELAY_ARTIFACT")]
    artifact: PathBuf,

    /// Weather observations used for the join
    #[arg(long, env = "DELAY_WEATHER")]
    weather: Option<PathBuf>,

    /// Weather alerts used for the join
    #[arg(long, env = "DELAY_ALERTS")]
    alerts: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Maximum number of requests scored at once
    #[arg(long, default_value_t = MAX_IN_FLIGHT)]
    max_in_flight: usize,
}

#[derive(Debug, Deserialize)]
struct RequestLine {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    request: PredictionRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Prediction(Prediction),
    Error(String),
}

#[derive(Debug, Serialize)]
struct ResponseLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(flatten)]
    outcome: Outcome,
}

/// Score one input line. Blank lines produce no response.
fn handle_line(service: &InferenceService, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let response = match serde_json::from_str::<RequestLine>(line) {
        Ok(RequestLine { id, request }) => match service.predict(&request) {
            Ok(prediction) => ResponseLine {
                id,
                outcome: Outcome::Prediction(prediction),
            },
            Err(err) => {
                warn!(error = %err, "prediction request refused");
                ResponseLine {
                    id,
                    outcome: Outcome::Error(err.to_string()),
                }
            }
        },
        Err(err) => ResponseLine {
            id: None,
            outcome: Outcome::Error(format!("malformed request: {}", err)),
        },
    };
    match serde_json::to_string(&response) {
        Ok(json) => Some(json),
        Err(err) => {
            warn!(error = %err, "failed to encode response");
            None
        }
    }
}

/// Read requests from `input` until EOF or `shutdown`, answering each on its
/// own task with at most `max_in_flight` tasks alive. Returns the number of
/// lines dispatched.
async fn serve<R, W, S>(
    service: Arc<InferenceService>,
    input: R,
    output: W,
    shutdown: S,
    max_in_flight: usize,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        output.shutdown().await?;
        Ok::<_, std::io::Error>(())
    });

    let in_flight = Arc::new(Semaphore::new(max_in_flight.max(1)));
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(input).lines();
    let mut dispatched = 0;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read request line")? else {
                    debug!("input closed");
                    break;
                };
                // Held until the response is queued for the writer.
                let permit = Arc::clone(&in_flight)
                    .acquire_owned()
                    .await
                    .context("Request limiter closed")?;
                let service = Arc::clone(&service);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_line(&service, &line) {
                        // Receiver only goes away if the writer failed.
                        let _ = tx.send(response).await;
                    }
                    drop(permit);
                });
                dispatched += 1;
            }
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }

    drop(tx);
    writer
        .await
        .context("Response writer panicked")?
        .context("Failed to write response")?;
    Ok(dispatched)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    delay_core::init_tracing(args.json, level);

    let service = InferenceService::load(
        &args.artifact,
        args.weather.as_deref(),
        args.alerts.as_deref(),
    )
    .with_context(|| format!("Failed to load artifact {:?}", args.artifact))?;
    let service = Arc::new(service);
    info!(
        artifact_id = %service.artifact().artifact_id,
        version = delay_core::VERSION,
        "delayd started"
    );

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let dispatched = serve(
        Arc::clone(&service),
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown,
        args.max_in_flight,
    )
    .await?;

    METRICS.flush();
    info!(requests = dispatched, "delayd stopped");
    Ok(())
}
