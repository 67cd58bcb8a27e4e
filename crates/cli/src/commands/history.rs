//! `threadline history` / `threadline sessions`: Inspect stored sessions.

use std::path::Path;

use threadline_core::message::{Message, Role};
use threadline_core::session::MemoryMode;

pub async fn run(
    config_path: Option<&Path>,
    session: &str,
    mode: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let service = super::build_service(&config).await?;
    let mode = service.resolve_mode(mode)?;

    let history = service.history(mode, session).await;
    service.shutdown().await;
    let history = history?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No messages for session '{session}' in {mode} memory.");
        if mode == MemoryMode::Temporary {
            println!("(temporary sessions live only as long as the process that created them)");
        }
        return Ok(());
    }

    for message in &history {
        println!("{}", render(message));
    }
    Ok(())
}

pub async fn list(config_path: Option<&Path>, mode: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let service = super::build_service(&config).await?;
    let mode = service.resolve_mode(mode)?;

    let sessions = service.sessions(mode).await;
    service.shutdown().await;
    let sessions = sessions?;

    if sessions.is_empty() {
        println!("No sessions in {mode} memory.");
        return Ok(());
    }

    println!("{:<36}  {:>8}  updated", "session", "messages");
    for s in &sessions {
        println!(
            "{:<36}  {:>8}  {}",
            s.id,
            s.message_count,
            s.updated_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}

/// One transcript line per message.
fn render(message: &Message) -> String {
    match message.role {
        Role::Assistant if message.requests_tools() => {
            let calls: Vec<String> = message
                .tool_calls
                .iter()
                .map(|c| format!("{}({})", c.name, c.arguments))
                .collect();
            format!("[assistant] -> {}", calls.join(", "))
        }
        Role::Tool => format!(
            "[tool:{}] {}",
            message.tool_name.as_deref().unwrap_or("?"),
            message.content
        ),
        role => format!("[{role}] {}", message.content),
    }
}
