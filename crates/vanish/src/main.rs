use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vanish", about = "vanish — secrets that burn after reading", version)]
struct Cli {
    /// vanish server URL (default: http://localhost:3000 or $VANISH_SERVER)
    #[arg(long, env = "VANISH_SERVER", default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the vanish HTTP server
    Serve {
        /// Port to listen on (default: $VANISH_PORT or 3000)
        #[arg(long, env = "VANISH_PORT", default_value = "3000")]
        port: u16,
        /// Host to bind (default: $VANISH_HOST or 0.0.0.0)
        #[arg(long, env = "VANISH_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Storage backend: redb or memory (default: $VANISH_STORAGE or redb)
        #[arg(long, env = "VANISH_STORAGE", default_value = "redb")]
        storage: String,
    },
    /// Store a secret and print its hash
    Create {
        /// Secret text
        text: String,
        /// Number of views before the secret is destroyed
        #[arg(long, default_value = "1")]
        views: u32,
        /// Lifetime in whole minutes, e.g. 30m, 2h, 1d (default: no time limit)
        #[arg(long)]
        ttl: Option<String>,
    },
    /// Read a secret, spending one of its views
    Get {
        /// Secret hash
        hash: String,
    },
    /// Remove dead secrets from the local database (server must be stopped)
    Purge,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VANISH_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
        } => cmd_serve(host, port, &storage).await,

        Commands::Create { text, views, ttl } => {
            let ttl_minutes = ttl.as_deref().map(parse_ttl_minutes).transpose()?;
            cmd_create(&cli.server, &text, views, ttl_minutes.unwrap_or(0)).await
        }

        Commands::Get { hash } => cmd_get(&cli.server, &hash).await,

        Commands::Purge => cmd_purge(),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16, storage: &str) -> Result<()> {
    let cfg = vanish_server::ServerConfig {
        host,
        port,
        storage: storage.parse()?,
        ..Default::default()
    };

    vanish_server::run(cfg).await
}

async fn cmd_create(server: &str, text: &str, views: u32, ttl_minutes: u32) -> Result<()> {
    let body = serde_json::json!({
        "secret": text,
        "expireAfterViews": views,
        "expireAfter": ttl_minutes,
    });

    let resp = Client::new()
        .post(format!("{}/v1/secret", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        let message = json["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("server returned {status}: {message}");
    }

    let hash = json["hash"].as_str().context("response has no hash")?;
    println!("{hash}");
    eprintln!(
        "✓ stored — {} view(s), {}",
        json["remainingViews"],
        match json["expiresAt"].as_str() {
            Some(at) => format!("expires {at}"),
            None => "no time limit".to_string(),
        }
    );
    eprintln!("  {}/v1/secret/{hash}", server.trim_end_matches('/'));
    Ok(())
}

async fn cmd_get(server: &str, hash: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/v1/secret/{}", server.trim_end_matches('/'), hash))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        anyhow::bail!("secret not found or no longer available");
    }
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        let message = json["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("server returned {status}: {message}");
    }

    println!("{}", json["secretText"].as_str().unwrap_or(""));
    match json["remainingViews"].as_u64() {
        Some(0) => eprintln!("(that was the last view)"),
        Some(n) => eprintln!("({n} view(s) left)"),
        None => {}
    }
    Ok(())
}

fn cmd_purge() -> Result<()> {
    let cfg = vanish_server::ServerConfig::default();
    let path = vanish_server::dirs::db_path(cfg.data_dir.as_deref())?;
    let store = vanish_server::store::Store::open(&path)?;
    let removed = store.purge()?;
    println!("purged {removed} dead secret(s)");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Parse human durations like "30m", "2h", "1d" into whole minutes.
fn parse_ttl_minutes(s: &str) -> Result<u32> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    let secs = d.as_secs();
    if secs % 60 != 0 || d.subsec_nanos() != 0 {
        anyhow::bail!("TTL must be a whole number of minutes: {s}");
    }
    u32::try_from(secs / 60).with_context(|| format!("TTL too long: {s}"))
}
