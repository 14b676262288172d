use clap::Parser;
use reqwest::multipart::{Form, Part};
use shared::{HealthStatus, PredictResponse};
use skinguard_backend::logging;
use std::path::{Path, PathBuf};

/// Smoke-test a running SkinGuard API.
#[derive(Parser, Debug)]
#[command(name = "smoke", version)]
struct Args {
    /// Image to send to /predict. Only the health check runs when omitted.
    image: Option<PathBuf>,

    #[arg(long, env = "SKINGUARD_URL", default_value = "http://localhost:8000")]
    url: String,

    #[arg(long)]
    age: Option<u32>,

    #[arg(long)]
    gender: Option<String>,
}

fn guess_mime(path: &Path) -> &'static str {
    match image::ImageFormat::from_path(path) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "application/octet-stream",
    }
}

async fn check_health(client: &reqwest::Client, url: &str) -> bool {
    println!("Testing health endpoint...");
    match client.get(format!("{url}/health")).send().await {
        Ok(resp) => {
            let status = resp.status();
            println!("Status: {status}");
            match resp.json::<HealthStatus>().await {
                Ok(health) => println!("Response: {health:?}\n"),
                Err(e) => println!("Unreadable response: {e}\n"),
            }
            status.is_success()
        }
        Err(e) => {
            println!("Error: {e}\n");
            false
        }
    }
}

async fn check_predict(client: &reqwest::Client, args: &Args, image: &Path) -> anyhow::Result<bool> {
    println!("Testing prediction with image: {}", image.display());
    let bytes = match std::fs::read(image) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("Error: Image file not found: {} ({e})\n", image.display());
            return Ok(false);
        }
    };

    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(guess_mime(image))?;
    let mut form = Form::new().part("file", part);
    if let Some(age) = args.age {
        form = form.text("age", age.to_string());
    }
    if let Some(gender) = &args.gender {
        form = form.text("gender", gender.clone());
    }

    let resp = client
        .post(format!("{}/predict", args.url))
        .multipart(form)
        .send()
        .await?;
    let status = resp.status();
    println!("Status: {status}");
    if status.is_success() {
        let body: PredictResponse = resp.json().await?;
        println!("Response: {}\n", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Response: {}\n", resp.text().await?);
    }
    Ok(status.is_success())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("warn", None);
    let mut args = Args::parse();
    args.url = args.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    println!("{}", "=".repeat(50));
    println!("SkinGuard API Test Script");
    println!("{}\n", "=".repeat(50));

    if !check_health(&client, &args.url).await {
        println!("Health check failed. Is the API running?");
        std::process::exit(1);
    }

    match &args.image {
        Some(image) => {
            if !check_predict(&client, &args, image).await? {
                std::process::exit(1);
            }
        }
        None => {
            println!("No image provided. Usage: smoke <path_to_image>");
            println!("Example: smoke test_image.jpg");
        }
    }
    Ok(())
}
