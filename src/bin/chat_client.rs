//! Chat client - Entry Point
//!
//! Joins a relay and turns keyboard lines into protocol sends.
//! Commands: `send <message>` and `leave`.

use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chat_relay::client::{render, Command};
use chat_relay::ChatClient;

/// Interactive client for the chat relay
#[derive(Parser, Debug)]
#[command(name = "chat_client", version, about)]
struct Args {
    /// Server host
    #[arg(long, env = "CHAT_HOST", default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(long, env = "CHAT_PORT", default_value_t = 8080)]
    port: u16,

    /// Name to join the room under
    #[arg(long, env = "CHAT_USERNAME")]
    username: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.username.trim().is_empty() {
        return Err("username is required (--username or CHAT_USERNAME)".into());
    }

    let addr = format!("{}:{}", args.host, args.port);
    let client = ChatClient::connect(&addr, &args.username).await?;
    println!("Connected to {} as {}", addr, client.username());
    println!("Commands: 'send <message>' or 'leave'");

    let (mut incoming, mut outgoing) = client.split();

    let mut printer = tokio::spawn(async move {
        while let Some(msg) = incoming.recv().await {
            if let Some(text) = render(&msg) {
                print!("\n{}\n> ", text);
                let _ = std::io::stdout().flush();
            }
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            _ = &mut printer => {
                println!("\nDisconnected from server.");
                return Ok(());
            }
            line = stdin.next_line() => {
                let command = match line? {
                    Some(line) => Command::parse(&line),
                    None => Command::Leave,
                };
                match command {
                    Command::Send(body) => outgoing.send(&body).await?,
                    Command::Leave => {
                        outgoing.leave().await?;
                        printer.abort();
                        return Ok(());
                    }
                    Command::Empty => {}
                    Command::Unknown => {
                        println!("Unknown command. Use 'send <message>' or 'leave'.");
                    }
                }
                prompt();
            }
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
