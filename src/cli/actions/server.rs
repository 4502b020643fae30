use crate::{
    auth::{Gateway, PasswordHasher, Services, SessionCodec},
    cli::globals::GlobalArgs,
    oauth::{github::GitHubExchange, OAuthExchange},
    store::{postgres::PgStore, CredentialStore, MemoryStore},
    vaas,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub session_ttl: i64,
    pub grace_window: i64,
    pub adapter_timeout: Duration,
    pub globals: GlobalArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store, session codec or listener cannot be set up.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store: Arc<dyn CredentialStore> = match &args.dsn {
        Some(dsn) => Arc::new(
            PgStore::connect(dsn)
                .await
                .context("Could not connect to the database")?,
        ),
        None => {
            warn!("No DSN given, accounts are kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let oauth: Option<Arc<dyn OAuthExchange>> = match args.globals.github() {
        Some((client_id, client_secret)) => Some(Arc::new(GitHubExchange::new(
            client_id.to_string(),
            client_secret.clone(),
        )?)),
        None => None,
    };

    let codec = SessionCodec::new(
        &args.globals.session_secret,
        args.session_ttl,
        args.grace_window,
    )?;

    let services = Services {
        store,
        oauth,
        codec: Arc::new(codec),
        hasher: PasswordHasher::new()?,
    };

    let gateway = Gateway::from_services(&services, args.adapter_timeout)?;

    vaas::new(args.port, gateway).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("session_ttl", format!("{}s", args.session_ttl)),
        ("grace_window", format!("{}s", args.grace_window)),
        (
            "adapter_timeout",
            format!("{}ms", args.adapter_timeout.as_millis()),
        ),
        ("github_oauth", args.globals.github().is_some().to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
