//! mmlab API Server

use mmlab_core::{logging, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("MMLAB_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;

    logging::init(&config.logging);

    mmlab_api::serve(config).await
}
