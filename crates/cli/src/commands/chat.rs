//! `threadline chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;

use threadline_agent::{ChatReply, ChatService};
use threadline_core::message::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config_path: Option<&Path>,
    session: Option<String>,
    mode: Option<String>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    // Fail early without an API key
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    THREADLINE_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", threadline_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let service = super::build_service(&config).await?;
    let session = session.unwrap_or_else(|| SessionId::new().to_string());
    let mode = service.resolve_mode(mode.as_deref())?;

    let result = match message {
        Some(msg) => single(&service, &session, mode.as_str(), &msg).await,
        None => interactive(&service, &session, mode.as_str(), &config.model).await,
    };

    service.shutdown().await;
    result
}

async fn single(
    service: &ChatService,
    session: &str,
    mode: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    eprint!("  Thinking...");
    let reply = service.chat(session, message, Some(mode)).await;
    eprint!("\r              \r");
    println!("{}", reply?.reply);
    Ok(())
}

async fn interactive(
    service: &ChatService,
    session: &str,
    mode: &str,
    model: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Threadline: Interactive Mode");
    println!();
    println!("  Session:   {session}");
    println!("  Memory:    {mode}");
    println!("  Model:     {model}");
    println!("  Tools:     /weather <city>, /wiki <topic>, /upper <text>");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        match service.chat(session, line, Some(mode)).await {
            Ok(reply) => {
                eprint!("\r     \r");
                print_reply(&reply);
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn print_reply(reply: &ChatReply) {
    println!();
    for line in reply.reply.lines() {
        println!("  Assistant > {line}");
    }
    if let (Some(input), Some(output)) = (reply.tokens_input, reply.tokens_output) {
        println!("  ({input} in / {output} out tokens)");
    }
    println!();
}
