//! `ctm`: run one transfer and report its outcome.

mod args;
mod config;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use content_transfer::{
    ChannelListener, RequestId, TransferEvent, TransferManager, TransferOutcome,
};
use tracing_subscriber::EnvFilter;

use args::{Args, Command};
use config::CtmConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = CtmConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Command::Upload {
        base_uri: Some(base),
        ..
    } = &args.command
    {
        config.manager.upload_base_uri = Some(base.clone());
    }
    let show_progress = config.show_progress && !args.quiet;

    let manager = TransferManager::with_http(config.manager)?;
    let (listener, mut events) = ChannelListener::new();
    manager.set_default_listener(Some(Arc::new(listener)));

    let id = submit(&manager, args.command)?;

    let mut interrupted = false;
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::warn!(request = %id, "interrupted, canceling");
                if let Err(e) = manager.cancel(id) {
                    tracing::debug!(error = %e, "cancel after completion");
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("transfer manager stopped before {id} finished");
                };
                if let Some(outcome) = report(&manager, event, show_progress)? {
                    break outcome;
                }
            }
        }
    };

    manager.shutdown();
    match outcome.result {
        Ok(()) if interrupted => bail!("transfer {id} canceled"),
        Ok(()) => Ok(()),
        Err(e) if outcome.server_error_code.is_empty() => bail!("transfer {id} failed: {e}"),
        Err(_) => bail!(
            "transfer {id} failed: server returned {}: {}",
            outcome.server_error_code,
            outcome.server_error_msg
        ),
    }
}

fn submit(manager: &TransferManager, command: Command) -> anyhow::Result<RequestId> {
    let id = match command {
        Command::Download {
            uri,
            dest,
            replace,
            timeout,
            progress,
        } => {
            let dest = std::path::absolute(&dest)
                .with_context(|| format!("resolving {}", dest.display()))?;
            let id = manager.download(&uri, &dest, replace, timeout, progress)?;
            tracing::info!(request = %id, %uri, dest = %dest.display(), "download queued");
            id
        }
        Command::Fetch { uri, timeout } => {
            let id = manager.download_to_buffer(&uri, timeout, 0)?;
            tracing::info!(request = %id, %uri, "fetch queued");
            id
        }
        Command::Upload {
            src, dest, replace, ..
        } => {
            let (id, uri) = manager.upload(&src, &dest, replace)?;
            tracing::info!(request = %id, src = %src.display(), %uri, "upload queued");
            id
        }
    };
    Ok(id)
}

/// Prints `event`. Returns the outcome once the transfer is over.
fn report(
    manager: &TransferManager,
    event: TransferEvent,
    show_progress: bool,
) -> anyhow::Result<Option<TransferOutcome>> {
    match event {
        TransferEvent::Progress {
            request_id,
            transferred,
        } => {
            if show_progress {
                let percent = manager
                    .transfer_info(request_id)
                    .ok()
                    .and_then(|info| info.percentage());
                match percent {
                    Some(p) => eprintln!("{request_id}: {transferred} bytes ({p:.1}%)"),
                    None => eprintln!("{request_id}: {transferred} bytes"),
                }
            }
            Ok(None)
        }
        TransferEvent::DownloadCompleted {
            request_id,
            content_id,
            outcome,
        } => {
            if outcome.is_success() {
                match content_id {
                    Some(content) => println!("{request_id}: downloaded (content {content})"),
                    None => println!("{request_id}: downloaded"),
                }
            }
            Ok(Some(outcome))
        }
        TransferEvent::DownloadToBufferCompleted { buffer, outcome, .. } => {
            if outcome.is_success() {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&buffer).context("writing to stdout")?;
                stdout.flush()?;
            }
            Ok(Some(outcome))
        }
        TransferEvent::UploadCompleted {
            request_id,
            outcome,
        } => {
            if outcome.is_success() {
                println!("{request_id}: uploaded");
            }
            Ok(Some(outcome))
        }
        TransferEvent::Canceled {
            request_id,
            outcome,
        } => {
            eprintln!("{request_id}: canceled");
            Ok(Some(outcome))
        }
    }
}
