//! `threadline serve`: Start the HTTP gateway.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        eprintln!("  WARNING: no API key configured; model calls will be rejected upstream.");
        eprintln!("  Set THREADLINE_API_KEY or OPENAI_API_KEY, or add api_key to the config file.");
    }

    println!("Threadline Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);
    println!("   Default:   {} memory", config.store.default_mode);
    println!("   SQLite:    {}", config.store.sqlite_path.display());

    threadline_gateway::start(config).await?;

    Ok(())
}
