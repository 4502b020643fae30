use crate::cli::{
    actions::{server, Action},
    globals::GlobalArgs,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// Turn parsed arguments into the action to run.
/// # Errors
/// Returns an error if a required argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let session_secret = matches
        .get_one::<String>("session-secret")
        .cloned()
        .context("missing required argument: --session-secret")?;

    let mut globals = GlobalArgs::new(SecretString::from(session_secret));

    if let (Some(id), Some(secret)) = (
        matches.get_one::<String>("github-client-id"),
        matches.get_one::<String>("github-client-secret"),
    ) {
        globals.set_github(id.to_string(), SecretString::from(secret.to_string()));
    }

    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(3020),
        dsn: matches.get_one::<String>("dsn").cloned(),
        session_ttl: matches.get_one::<i64>("session-ttl").copied().unwrap_or(900),
        grace_window: matches
            .get_one::<i64>("grace-window")
            .copied()
            .unwrap_or(10800),
        adapter_timeout: Duration::from_millis(
            matches
                .get_one::<u64>("adapter-timeout")
                .copied()
                .unwrap_or(5000),
        ),
        globals,
    }))
}
