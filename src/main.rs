use std::sync::Arc;

use inbox_ledger::config::RelayConfig;
use inbox_ledger::error::Result;
use inbox_ledger::pipeline::spawn_pipeline;
use inbox_ledger::providers::{
    CredentialProvider, GmailClient, LoggingCredentials, OAuthRefresher, SheetsClient,
};
use inbox_ledger::webhook::webhook_routes;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().inspect_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!("  Required: EXPECTED_SENDER, LEDGER_SPREADSHEET_ID, LEDGER_DEBIT_CELL,");
        eprintln!("            LEDGER_CREDIT_CELL, GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET,");
        eprintln!("            GOOGLE_REFRESH_TOKEN");
    })?;

    eprintln!("📒 Inbox Ledger v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    eprintln!("   Sender filter: {}", config.expected_sender);
    eprintln!(
        "   Ledger: {} ({}!{} debit, {}!{} credit)",
        config.ledger.spreadsheet_id,
        config.ledger.sheet_name,
        config.ledger.debit_cell,
        config.ledger.sheet_name,
        config.ledger.credit_cell,
    );

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    // ── Credentials ─────────────────────────────────────────────────────
    let credentials = Arc::new(LoggingCredentials::new(
        "google",
        OAuthRefresher::new(http.clone(), config.oauth.clone()),
    ));
    credentials
        .current_credential()
        .await
        .inspect_err(|e| eprintln!("Error: could not obtain an access token: {}", e))?;

    // ── Providers ───────────────────────────────────────────────────────
    let gmail = Arc::new(GmailClient::new(
        http.clone(),
        credentials.clone(),
        config.gmail_user.clone(),
    ));
    let sheets = Arc::new(SheetsClient::new(
        http,
        credentials,
        config.ledger.spreadsheet_id.clone(),
    ));

    match &config.watch {
        Some(watch) => match gmail.watch(watch).await {
            Ok(reply) => eprintln!(
                "   Watch: {} (history {}, expires {})",
                watch.topic_name,
                reply.history_id,
                reply
                    .expiration
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            Err(e) => {
                tracing::warn!(error = %e, topic = %watch.topic_name, "Gmail watch registration failed");
                eprintln!("   Watch: registration failed, relying on an existing watch");
            }
        },
        None => eprintln!("   Watch: not registered (GMAIL_WATCH_TOPIC unset)"),
    }

    // ── Pipeline ────────────────────────────────────────────────────────
    let (sequencer, _worker) = spawn_pipeline(&config, gmail, sheets);
    tracing::warn!(
        "Cursor and seen-message state are in memory only; a restart loses queued windows"
    );

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = webhook_routes(sequencer);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
