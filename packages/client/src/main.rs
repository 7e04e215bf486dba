use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use client::{ClientError, MatchmakingClient, MatchmakingSession, PollState, DEFAULT_POLL_INTERVAL};
use shared::models::matchmaking::responses::MatchmakingState;

#[derive(Parser)]
#[command(name = "matchmaking-client")]
#[command(about = "Command line client for the matchmaking API", long_about = None)]
struct Cli {
    /// Base URL of the matchmaking API
    #[arg(long, env = "MATCHMAKING_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Bearer token from `login`
    #[arg(long, env = "MATCHMAKING_TOKEN")]
    token: Option<String>,

    /// Seconds between status polls while waiting
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    interval_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print a bearer token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "MATCHMAKING_PASSWORD")]
        password: String,
    },

    /// Join the matchmaking queue
    Join,

    /// Leave the matchmaking queue
    Leave,

    /// Show the current matchmaking status
    Status,

    /// Join, then poll until matched. Ctrl-C leaves the queue.
    Wait,
}

enum WaitOutcome {
    Finished(Option<PollState>),
    Interrupted,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ClientError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn wait_for_match(client: MatchmakingClient, interval: Duration) -> Result<(), ClientError> {
    let mut session = MatchmakingSession::new(client, interval);
    let joined = session.join().await?;
    print_json(&joined)?;
    if joined.status != MatchmakingState::Waiting {
        return Ok(());
    }

    if let Some(mut updates) = session.updates() {
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                if let PollState::Waiting { position, total } = state {
                    info!(?position, ?total, "still waiting");
                }
            }
        });
    }

    let outcome = tokio::select! {
        state = session.wait_for_match() => WaitOutcome::Finished(state),
        _ = tokio::signal::ctrl_c() => WaitOutcome::Interrupted,
    };

    match outcome {
        WaitOutcome::Finished(Some(PollState::Matched(details))) => print_json(&details),
        WaitOutcome::Finished(Some(PollState::Failed(message))) => {
            Err(ClientError::Polling(message))
        }
        WaitOutcome::Finished(_) => {
            eprintln!("No longer in the queue");
            Ok(())
        }
        WaitOutcome::Interrupted => {
            let left = session.leave().await?;
            print_json(&left)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "client=info,warn".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut client = MatchmakingClient::new(cli.base_url);
    if let Some(token) = cli.token {
        client = client.with_token(token);
    }
    let interval = Duration::from_secs(cli.interval_secs.max(1));

    match cli.command {
        Commands::Login { email, password } => {
            let login = client.login(&email, &password).await?;
            print_json(&login)
        }
        Commands::Join => print_json(&client.join().await?),
        Commands::Leave => print_json(&client.leave().await?),
        Commands::Status => print_json(&client.status().await?),
        Commands::Wait => wait_for_match(client, interval).await,
    }
}
