use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .with_file(false),
        )
        .init();

    let config = chat_service::config::load_service_config();
    tracing::info!(?config, "starting chat service");

    if let Err(error) = chat_service::server::run(config).await {
        tracing::error!("failed to run chat service: {error}");
        std::process::exit(1);
    }
}
