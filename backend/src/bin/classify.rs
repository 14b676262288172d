use anyhow::Context;
use clap::Parser;
use skinguard_backend::config::AppConfig;
use skinguard_backend::logging;
use skinguard_backend::inference::Classifier;
use skinguard_backend::lambda::classify_encoded_image;
use std::io::Read;
use std::path::PathBuf;

/// Classify a base64-encoded skin image the way the serverless handler does.
#[derive(Parser, Debug)]
#[command(name = "classify", version)]
struct Args {
    /// File holding the base64 string (optionally a data URL). Reads stdin when omitted.
    input: Option<PathBuf>,

    /// Override the model artifact from the `lambda` config section.
    #[arg(long, env = "LAMBDA_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Override the 1-indexed label file.
    #[arg(long, env = "LAMBDA_LABELS_PATH")]
    labels: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    logging::init("info", None);
    let args = Args::parse();

    let mut model_config = AppConfig::load()?.lambda;
    if let Some(model) = args.model {
        model_config.path = model;
    }
    if let Some(labels) = args.labels {
        model_config.labels_path = Some(labels);
    }

    let encoded = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let classifier = Classifier::from_config(&model_config).with_context(|| {
        format!(
            "loading labels from {:?}",
            model_config.labels_path.as_deref()
        )
    })?;

    let prediction = classify_encoded_image(&classifier, encoded.trim())?;
    println!("{}", serde_json::to_string(&prediction)?);
    Ok(())
}
