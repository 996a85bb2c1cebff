// Mamar Bank - Web Server
// REST API with Axum; routes live in `mamar_bank::api`

use anyhow::{Context, Result};
use std::path::PathBuf;

use mamar_bank::api::{self, AppState};
use mamar_bank::{db, telemetry, Bank, BankConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config_file = std::env::args().nth(1).map(PathBuf::from);
    let config = BankConfig::load(config_file.as_deref())?;
    telemetry::init(&config.telemetry);

    println!("🌐 Mamar Bank - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = db::open(&config.database.path, config.busy_timeout())
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    let bank = Bank::open(conn, &config.bank)?;
    println!("✓ Database opened: {}", config.database.path.display());
    if bank.is_bankrupt()? {
        tracing::warn!("bank starts in bankrupt mode; money operations are refused");
    }

    let app = api::router(AppState::new(bank));

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/health", addr);
    println!("\n   Press Ctrl+C to stop\n");
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}
