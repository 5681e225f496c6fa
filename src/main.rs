//! Roundhouse server binary.
//!
//! Loads the game rule book, starts one scheduler loop per game, and serves
//! the HTTP boundary.

use clap::Parser;
use roundhouse::api::{ApiConfig, ApiServer};
use roundhouse::balance::InMemoryBalanceStore;
use roundhouse::config::RuleBook;
use roundhouse::engine::Engine;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "roundhouse")]
#[command(about = "Round settlement engine for timed wagering games", long_about = None)]
struct Args {
    /// Path to a TOML rules file; built-in rule sets are used if omitted
    #[arg(long)]
    rules: Option<String>,

    /// API server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// API server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Scheduler tick interval in milliseconds
    #[arg(long, default_value = "250")]
    tick_ms: u64,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Seed every listed player with this balance in minor units
    /// (development only; format: player1,player2)
    #[arg(long)]
    seed_players: Option<String>,

    /// Balance to seed each listed player with
    #[arg(long, default_value = "100000")]
    seed_amount: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roundhouse=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let rule_book = match &args.rules {
        Some(path) => {
            tracing::info!("loading rules from {}", path);
            RuleBook::from_file(path)?
        }
        None => RuleBook::builtin(),
    };
    tracing::info!(
        version = rule_book.version(),
        games = ?rule_book.game_ids(),
        "rule book loaded"
    );

    // The in-memory store stands in for the deployment's authoritative
    // balance store.
    let store = Arc::new(InMemoryBalanceStore::new());
    if let Some(players) = &args.seed_players {
        for player in players.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            store.set_balance(player, args.seed_amount);
            tracing::info!(player, amount = args.seed_amount, "seeded balance");
        }
    }

    let engine = Arc::new(Engine::new(rule_book, store));
    engine.start(Duration::from_millis(args.tick_ms));

    let allowed_origins: Vec<String> = args
        .cors_origins
        .split(',')
        .map(|origin| origin.trim().to_string())
        .collect();

    let api_config = ApiConfig {
        host: args.host,
        port: args.port,
        allowed_origins,
        request_timeout_secs: args.timeout,
    };

    let server = ApiServer::new(api_config, engine);
    server.run().await?;

    Ok(())
}
