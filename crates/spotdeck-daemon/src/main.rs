mod http;
mod logs;

use spotdeck_engine::Engine;
use spotdeck_proto::config::Config;
use spotdeck_proto::model::SessionStatus;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::logs::{BufferLayer, LogBuffer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_buffer = LogBuffer::default();

    // File logging + in-memory buffer for /api/logs
    let data_dir = spotdeck_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("spotdeck.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BufferLayer::new(log_buffer.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,spotdeck=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let engine = Engine::new(&config)?;

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            engine.clone(),
            log_buffer.clone(),
        );
    }

    let session = engine.start().await;
    match session.status {
        SessionStatus::Valid => info!("Session ready, polling every {:?}", engine.poller().interval()),
        status => warn!(
            "Session not ready ({:?}): {}",
            status,
            session.message.as_deref().unwrap_or("no details")
        ),
    }

    tokio::signal::ctrl_c().await?;
    engine.shutdown();
    info!("Shut down");

    Ok(())
}
