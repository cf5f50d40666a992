//! Themis worker entrypoint
//!
//! Reads one submission request as JSON (from a file argument or stdin),
//! grades it, and writes the structured verdict JSON to stdout.

use std::io::Read;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use themis::models::SubmissionRequest;
use themis::{Config, JudgePipeline};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing; logs go to stderr so stdout stays pure JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "themis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut request = read_request().context("failed to read the submission request")?;
    if request.id.is_none() {
        request.id = Some(uuid::Uuid::new_v4().to_string());
    }
    tracing::info!(
        id = %request.id.as_deref().unwrap_or_default(),
        language = %request.language,
        "Received submission"
    );

    let config = Config::from_env();
    let pipeline = JudgePipeline::new(config);
    let result = pipeline.judge(&request);

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn read_request() -> Result<SubmissionRequest> {
    let data = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read request file {path}"))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let request: SubmissionRequest =
        serde_json::from_str(&data).context("request is not valid JSON")?;
    Ok(request)
}
