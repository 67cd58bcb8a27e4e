//! `threadline forget`: Delete a session and its history.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    session: &str,
    mode: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let service = super::build_service(&config).await?;
    let mode = service.resolve_mode(mode)?;

    let removed = service.forget(mode, session).await;
    service.shutdown().await;

    if removed? {
        println!("Forgot session '{session}' ({mode} memory).");
    } else {
        println!("No session '{session}' in {mode} memory.");
    }
    Ok(())
}
