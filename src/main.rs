//! Newton Chat - notebook assistant backend
//!
//! Reads front end operations as JSON lines on stdin and writes the
//! resulting operations as JSON lines on stdout. Logs go to stderr.

mod bot;
mod config;
mod handlers;
mod instance;
mod knowledge;
mod message;
mod pagination;
mod protocol;
mod runtime;
mod state_machine;
mod states;

use config::AppConfig;
use knowledge::Knowledge;
use protocol::{parse_request, Envelope};
use runtime::RuntimeManager;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout carries the protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newton_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        data_dir = %config.data_dir.display(),
        page_size = config.page_size,
        bot = config.bot.name(),
        "Loading knowledge base"
    );
    let knowledge = Knowledge::load(&config.data_dir)?;

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = outbound_rx.recv().await {
            let mut line = match serde_json::to_string(&envelope) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize outbound operation");
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                tracing::error!(error = %e, "Failed to write to stdout");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let manager = RuntimeManager::new(knowledge, config, outbound_tx);
    manager.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_request(&line) {
            Ok(request) => manager.dispatch(request).await,
            Err((command, e)) => manager.report_error(&command, &e.to_string()).await,
        }
    }

    tracing::info!("Input closed, shutting down");
    if let Err(e) = manager.save_all().await {
        tracing::error!(error = %e, "Failed to save instances");
    }
    drop(manager);
    let _ = writer.await;
    Ok(())
}
