use std::path::Path;

use broadside::prelude::*;
use tracing_subscriber::EnvFilter;

/// Path of an optional JSON config file.
const CONFIG_VAR: &str = "BROADSIDE_CONFIG";
/// Overrides the bind address from the config file.
const BIND_VAR: &str = "BROADSIDE_BIND";

/// Reads the config file if one is named, falling back to defaults.
fn load_config(path: Option<&Path>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var_os(CONFIG_VAR);
    let mut config = load_config(config_path.as_deref().map(Path::new))?;
    if let Ok(addr) = std::env::var(BIND_VAR) {
        config.bind_addr = addr;
    }
    tracing::info!(bind = %config.bind_addr, "starting battleship server");

    let server = BroadsideServer::builder().config(config).build().await?;
    server.run().await?;
    Ok(())
}
