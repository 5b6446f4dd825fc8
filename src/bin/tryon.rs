use std::path::PathBuf;
use std::process::ExitCode;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tryon_client::models::payload::{ImageFile, SubmissionPayload};
use tryon_client::services::poller::CancelHandle;
use tryon_client::{ClientConfig, GeneratedResult, TryonClient};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Register application metrics
    metrics::describe_counter!("tryon_submissions_total", "Total generation jobs submitted");
    metrics::describe_counter!(
        "tryon_jobs_completed_total",
        "Total generation jobs completed"
    );
    metrics::describe_counter!("tryon_jobs_failed_total", "Total generation jobs that failed");
    metrics::describe_counter!(
        "tryon_submissions_coalesced_total",
        "Duplicate submissions coalesced onto an in-flight job"
    );
    metrics::describe_counter!(
        "tryon_history_cache_hits_total",
        "History reads served from the recency cache"
    );

    let mut args = std::env::args().skip(1);
    let (Some(person_path), Some(garment_path)) = (args.next(), args.next()) else {
        eprintln!("usage: tryon <person-image> <garment-image> [output-path]");
        eprintln!("configuration via TRYON_BASE_URL, TRYON_SHOP, TRYON_PROXY_ENDPOINT, ...");
        return ExitCode::FAILURE;
    };
    let output_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tryon-result.png"));

    let config = ClientConfig::from_env().expect("Failed to load configuration from environment");
    let client = TryonClient::new(config).expect("Failed to initialize client");

    let payload = SubmissionPayload {
        person_image: Some(read_image(&person_path)),
        clothing_image: Some(read_image(&garment_path)),
        ..Default::default()
    };

    // Stop polling cleanly on ctrl-c instead of leaking requests.
    let cancel = CancelHandle::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            signal_cancel.cancel();
        }
    });

    let (progress_tx, mut progress_rx) =
        mpsc::unbounded_channel::<tryon_client::services::poller::ProgressUpdate>();
    tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            tracing::info!(
                attempt = update.attempt,
                status = %update.status,
                description = update.description.as_deref().unwrap_or(""),
                "generation progress"
            );
        }
    });

    tracing::info!("Submitting generation job");
    let result = match client.generate(&payload, Some(&progress_tx), &cancel).await {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(error = %error, "generation failed");
            eprintln!("{}", error.user_message());
            return ExitCode::FAILURE;
        }
    };

    if let GeneratedResult::Job(result) = &result {
        tracing::info!(result_url = %result.source_url, "job completed");
    }

    let bytes = match client.download(&result).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(error = %error, "could not download result");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = std::fs::write(&output_path, &bytes) {
        tracing::error!(error = %error, path = %output_path.display(), "could not write output");
        return ExitCode::FAILURE;
    }

    tracing::info!(path = %output_path.display(), bytes = bytes.len(), "result saved");
    ExitCode::SUCCESS
}

fn read_image(path: &str) -> ImageFile {
    let bytes = std::fs::read(path).expect("Failed to read image file");
    let file_name = PathBuf::from(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    ImageFile::new(bytes, file_name)
}
