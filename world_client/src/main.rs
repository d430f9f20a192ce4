//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p world_client -- [--addr 127.0.0.1:9095] [--wander]
//!
//! The client connects to the server, sends one action per view, and prints
//! its own position as views arrive. With `--wander` it picks a random
//! direction every tick instead of reading the console.
//!
//! Console commands:
//!   w|a|s|d [n]   - Move up/left/down/right, optionally by `n` tiles
//!   j             - Jump (combine with a move, e.g. `d j`)
//!   .             - Stand still
//!   quit          - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use world_client::input::{parse_command, random_walk};
use world_client::GameClient;
use world_shared::action::Action;

struct ClientArgs {
    server_addr: String,
    wander: bool,
}

fn parse_args() -> ClientArgs {
    let mut out = ClientArgs {
        server_addr: "127.0.0.1:9095".to_string(),
        wander: false,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                out.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--wander" => {
                out.wander = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    info!(server = %args.server_addr, wander = args.wander, "Starting client");

    let mut client = GameClient::connect(&args.server_addr)
        .await
        .context("connect")?;

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    if !args.wander {
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                print!("] ");
                let _ = stdout.flush();
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let line = line.trim().to_string();
                if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        println!("Connected as {}. Type w/a/s/d to move, 'quit' to exit.", client.player_id);
    }

    let mut rng = rand::thread_rng();
    let mut next = Action::default();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            if line == "quit" {
                client.close().await?;
                return Ok(());
            }
            match parse_command(&line) {
                Some(action) => next = action,
                None => println!("Unknown command: {line}"),
            }
        }

        let Some(view) = client.recv_view(Duration::from_millis(250)).await? else {
            continue;
        };

        if let Some(pos) = client.position() {
            info!(
                tick = view.tick,
                %pos,
                health = view.player.health,
                visible = view.snapshot.entities.len(),
                "View"
            );
        }

        let action = if args.wander {
            random_walk(&mut rng)
        } else {
            std::mem::take(&mut next)
        };
        client.send_action(action).await?;
    }
}
