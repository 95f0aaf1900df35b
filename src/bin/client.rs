use argh::FromArgs;
use catdog_infernum::{
    Class,
    dataset::{Dataset, LabeledImage},
    evaluation::EvaluationReport,
    messages::{HealthResponse, PredictionResponse, UPLOAD_FIELD},
    preprocess::{IMAGE_SIZE, encode_image},
};
use futures::{StreamExt, stream};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::{path::PathBuf, time::Duration};

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SMOKE_PREDICT_TIMEOUT: Duration = Duration::from_secs(30);

type BoxError = Box<dyn std::error::Error>;

#[derive(FromArgs)]
/// Client for the cats vs dogs classifier: predictions, smoke, stress and evaluation runs
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Health(HealthCommand),
    Predict(PredictCommand),
    Smoke(SmokeCommand),
    Stress(StressCommand),
    Evaluate(EvaluateCommand),
}

#[derive(FromArgs)]
/// Print the service health
#[argh(subcommand, name = "health")]
struct HealthCommand {}

#[derive(FromArgs)]
/// Classify an image file
#[argh(subcommand, name = "predict")]
struct PredictCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Check health and one prediction, exiting non-zero on failure
#[argh(subcommand, name = "smoke")]
struct SmokeCommand {}

#[derive(FromArgs)]
/// Send many concurrent prediction requests
#[argh(subcommand, name = "stress")]
struct StressCommand {
    /// total number of requests
    #[argh(option, short = 'n', default = "100")]
    requests: usize,

    /// number of requests in flight at once
    #[argh(option, short = 'c', default = "10")]
    concurrency: usize,
}

#[derive(FromArgs)]
/// Score a labelled batch and compute accuracy, precision, recall and F1
#[argh(subcommand, name = "evaluate")]
struct EvaluateCommand {
    /// dataset root with train/val/test splits; its test split is scored, a synthetic
    /// batch otherwise
    #[argh(option, short = 'd')]
    data_dir: Option<PathBuf>,

    /// size of the synthetic batch
    #[argh(option, short = 'n', default = "20")]
    samples: usize,

    /// seed of the synthetic batch and of missing dataset splits
    #[argh(option, default = "42")]
    seed: u64,

    /// where to write the metrics as JSON
    #[argh(option, short = 'o', default = "PathBuf::from(\"logs/post_deploy_metrics.json\")")]
    output: PathBuf,
}

struct Api {
    client: reqwest::Client,
    base_url: String,
}

impl Api {
    fn new(base_url: String, timeout: Duration) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    async fn health(&self) -> Result<HealthResponse, BoxError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Posts an encoded image; returns the status and the raw body.
    async fn predict(
        &self,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<(reqwest::StatusCode, serde_json::Value), BoxError> {
        self.predict_within(file_name, bytes, REQUEST_TIMEOUT).await
    }

    async fn predict_within(
        &self,
        file_name: String,
        bytes: Vec<u8>,
        timeout: Duration,
    ) -> Result<(reqwest::StatusCode, serde_json::Value), BoxError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part(UPLOAD_FIELD, part);
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.json().await?))
    }
}

fn jpeg(image: RgbImage) -> Result<Vec<u8>, BoxError> {
    Ok(encode_image(&DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)?)
}

fn gray_test_image() -> Result<Vec<u8>, BoxError> {
    jpeg(RgbImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Rgb([128, 128, 128])))
}

/// Random noise images with alternating labels; cats get a brighter left band.
fn synthetic_batch(samples: usize, seed: u64) -> Result<Vec<(Class, Vec<u8>)>, BoxError> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..samples)
        .map(|i| {
            let class = if i % 2 == 0 { Class::Cat } else { Class::Dog };
            let image = RgbImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, _| {
                let boost = if class == Class::Cat && x < 50 { 20 } else { 0 };
                Rgb([(); 3].map(|_| rng.gen_range(50u8..200) + boost))
            });
            Ok((class, jpeg(image)?))
        })
        .collect()
}

async fn load_split(images: Vec<LabeledImage>) -> Result<Vec<(Class, Vec<u8>)>, BoxError> {
    let mut batch = Vec::with_capacity(images.len());
    for image in images {
        batch.push((image.class, tokio::fs::read(&image.path).await?));
    }
    Ok(batch)
}

async fn smoke(api: &Api) -> Result<(), BoxError> {
    let health = api.health().await?;
    if health.status != "healthy" {
        return Err(format!("Expected healthy, got {health:?}").into());
    }

    let (status, body) = api
        .predict_within("test.jpg".into(), gray_test_image()?, SMOKE_PREDICT_TIMEOUT)
        .await?;
    if !status.is_success() {
        return Err(format!("Prediction failed: {status} {body}").into());
    }
    if body.get("label").is_none() && body.get("probabilities").is_none() {
        return Err(format!("Invalid response: {body}").into());
    }
    Ok(())
}

async fn stress(api: &Api, requests: usize, concurrency: usize) -> Result<usize, BoxError> {
    let image = gray_test_image()?;
    let successes = stream::iter(0..requests)
        .map(|_| api.predict("test.jpg".into(), image.clone()))
        .buffer_unordered(concurrency.max(1))
        .filter(|result| {
            futures::future::ready(matches!(result, Ok((status, _)) if status.is_success()))
        })
        .count()
        .await;
    Ok(successes)
}

async fn evaluate(api: &Api, batch: Vec<(Class, Vec<u8>)>) -> Option<EvaluationReport> {
    let mut truth = Vec::with_capacity(batch.len());
    let mut predicted = Vec::with_capacity(batch.len());
    for (class, bytes) in batch {
        truth.push(class);
        let prediction = match api.predict("img.jpg".into(), bytes).await {
            Ok((status, body)) if status.is_success() => {
                serde_json::from_value::<PredictionResponse>(body)
                    .ok()
                    .map(|p| p.label)
            }
            Ok((status, body)) => {
                log::warn!("Prediction failed: {status} {body}");
                None
            }
            Err(e) => {
                log::warn!("Prediction request failed: {e}");
                None
            }
        };
        predicted.push(prediction);
    }
    EvaluationReport::from_predictions(&truth, &predicted)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args: ClientArgs = argh::from_env();

    let api = Api::new(
        format!("http://{}:{}", args.host, args.port),
        REQUEST_TIMEOUT,
    )?;

    match args.command {
        ClientCommands::Health(_) => {
            let health = api.health().await?;
            println!("Result: {}", serde_json::to_string_pretty(&health)?);
        }
        ClientCommands::Predict(command) => {
            let bytes = tokio::fs::read(&command.image_path).await?;
            let file_name = command
                .image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let (status, body) = api.predict(file_name, bytes).await?;
            println!("Status: {status}");
            println!("Result: {}", serde_json::to_string_pretty(&body)?);
        }
        ClientCommands::Smoke(_) => {
            if let Err(e) = smoke(&api).await {
                eprintln!("Smoke test failed: {e}");
                std::process::exit(1);
            }
            println!("Smoke tests passed");
        }
        ClientCommands::Stress(command) => {
            println!(
                "Stress test POST /predict: {} | {} requests | {} workers",
                api.base_url, command.requests, command.concurrency
            );
            let successes = stress(&api, command.requests, command.concurrency).await?;
            println!("Done: {successes}/{} successful", command.requests);
        }
        ClientCommands::Evaluate(command) => {
            println!("Evaluating model at {}...", api.base_url);
            let batch = match &command.data_dir {
                Some(root) => load_split(Dataset::scan_with_seed(root, command.seed)?.test).await?,
                None => synthetic_batch(command.samples, command.seed)?,
            };
            let Some(report) = evaluate(&api, batch).await else {
                println!("No successful predictions");
                return Ok(());
            };
            let json = serde_json::to_string_pretty(&report)?;
            println!("{json}");
            if let Some(parent) = command.output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&command.output, json).await?;
            println!("Saved to {}", command.output.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_batch_is_seeded() {
        let a = synthetic_batch(4, 42).unwrap();
        let b = synthetic_batch(4, 42).unwrap();
        assert_eq!(a, b);
        let labels: Vec<_> = a.iter().map(|(class, _)| *class).collect();
        assert_eq!(labels, [Class::Cat, Class::Dog, Class::Cat, Class::Dog]);
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accepts connections and never answers
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let api = Api::new(format!("http://{addr}"), Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let err = api.health().await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        let err = err.downcast::<reqwest::Error>().unwrap();
        assert!(err.is_timeout());

        let err = api
            .predict_within("test.jpg".into(), vec![0; 16], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.downcast::<reqwest::Error>().unwrap().is_timeout());
    }
}
