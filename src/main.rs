use actix_web::{App, HttpServer, middleware, web};
use clap::Parser;
use std::io;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, filter::LevelFilter};
mod api;
use crate::api::{health::health_config, process::process_config, validation};
mod config;
mod job_api;
mod shutdown;
mod storage;
mod worker;
use crate::config::PipelineMode;
use crate::job_api::JobApiClient;
use crate::shutdown::ShutdownCoordinator;
use crate::storage::S3Store;
use crate::worker::PipelineRunner;

/// HTTP worker that runs captioning jobs and reports progress to the job API
#[derive(Parser, Debug)]
#[command(name = "captions-worker", version)]
struct Cli {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Pipeline mode (overrides PIPELINE_MODE)
    #[arg(long, value_enum)]
    mode: Option<PipelineMode>,
}

fn invalid_config(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

/// Console output plus daily rotating files per level
/// Log files will be created as: logs/info.log.2024-12-22, logs/error.log.2024-12-22, etc.
fn init_tracing(log_dir: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(log_dir, "debug.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::from_env().map_err(invalid_config)?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    std::fs::create_dir_all(&config.log_dir)?;
    init_tracing(&config.log_dir);

    info!("Starting captions-worker");
    info!("Configuration loaded successfully:");
    info!("  - Pipeline mode: {:?}", config.mode);
    info!("  - Job API: {}", config.job_api_base_url);

    let jobs = JobApiClient::new(config.job_api_base_url.clone());

    let runner = match config.mode {
        PipelineMode::Fake => {
            info!("  - Simulated stage delay: {:?}", config.fake_stage_delay);
            PipelineRunner::simulated(jobs, config.fake_stage_delay)
        }
        PipelineMode::S3 => {
            let s3_config = config.s3_config().map_err(|e| {
                error!("{}", e);
                invalid_config(e)
            })?;
            let store = S3Store::connect(s3_config).await;
            info!("  - Input bucket: {}", store.bucket());
            info!("  - Download directory: {}", config.download_dir.display());
            PipelineRunner::download(
                jobs,
                Arc::new(store),
                config.download_dir.clone(),
                config.dispatch_delay,
            )
        }
    };
    let runner = web::Data::new(runner);

    let server_runner = runner.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(server_runner.clone())
            .app_data(validation::query_config())
            .configure(health_config)
            .configure(process_config)
    })
    // Signals are handled by the shutdown coordinator
    .disable_signals();

    info!("Worker listening on {}", config.bind_addr);

    let server = server.bind(config.bind_addr.as_str())?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(server_handle, server_task, runner)
        .wait_for_shutdown()
        .await
}
