use argh::FromArgs;
use catdog_infernum::{
    Classifier, EngineConfig,
    config::{self, ServerConfig},
    logging,
    metrics::ApiMetrics,
    model,
    server::{self, AppState},
};
use std::{path::PathBuf, sync::Arc};

#[derive(FromArgs)]
/// Serves the cats vs dogs classifier over HTTP.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "config::DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "config::DEFAULT_PORT")]
    port: u16,

    /// path to the ONNX model; defaults to models/model.onnx or models/cats_dogs.onnx
    #[argh(option, short = 'm')]
    model: Option<PathBuf>,

    /// number of inference worker threads
    #[argh(option)]
    workers: Option<usize>,

    /// number of requests allowed to wait for a worker
    #[argh(option)]
    queue_depth: Option<usize>,

    /// maximum upload size in bytes
    #[argh(option, default = "config::DEFAULT_MAX_UPLOAD_BYTES")]
    max_upload_bytes: usize,

    /// directory for api.log
    #[argh(option, default = "PathBuf::from(config::DEFAULT_LOG_DIR)")]
    log_dir: PathBuf,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        let defaults = EngineConfig::default();
        Self {
            host: args.host,
            port: args.port,
            model_path: args.model,
            engine: EngineConfig {
                workers: args.workers.unwrap_or(defaults.workers),
                queue_depth: args.queue_depth.unwrap_or(defaults.queue_depth),
            },
            max_upload_bytes: args.max_upload_bytes,
            log_dir: args.log_dir,
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for ctrl-c: {e}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config: ServerConfig = argh::from_env::<ServerArgs>().into();
    logging::init(&config.log_dir)?;

    let model = model::load_at_startup(config.model_path.as_deref());
    let classifier = Classifier::new(model, config.engine);
    let state = Arc::new(AppState::new(classifier, Arc::new(ApiMetrics::new()?)));
    let app = server::router(state, config.max_upload_bytes);

    log::info!("🚀 Starting the server");
    log::info!(
        "🔥 Listening on: {} ({} workers, queue depth {})",
        config.addr(),
        config.engine.workers,
        config.engine.queue_depth
    );
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}
