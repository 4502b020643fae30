use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("vaas")
        .about("Authentication gateway for the VaaS backend")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("3020")
                .env("VAAS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string; an in-memory store is used when omitted")
                .env("VAAS_DSN"),
        )
        .arg(
            Arg::new("session-secret")
                .long("session-secret")
                .help("HMAC key for session tokens, at least 32 bytes")
                .env("VAAS_SESSION_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("session-ttl")
                .long("session-ttl")
                .help("Session token lifetime in seconds")
                .default_value("900")
                .env("VAAS_SESSION_TTL")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("grace-window")
                .long("grace-window")
                .help("Seconds after expiry during which a token is still accepted and renewed")
                .default_value("10800")
                .env("VAAS_GRACE_WINDOW")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new("adapter-timeout")
                .long("adapter-timeout")
                .help("Timeout in milliseconds for database and OAuth calls")
                .default_value("5000")
                .env("VAAS_ADAPTER_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("github-client-id")
                .long("github-client-id")
                .help("GitHub OAuth app client id")
                .env("VAAS_GITHUB_CLIENT_ID")
                .requires("github-client-secret"),
        )
        .arg(
            Arg::new("github-client-secret")
                .long("github-client-secret")
                .help("GitHub OAuth app client secret")
                .env("VAAS_GITHUB_CLIENT_SECRET")
                .hide_env_values(true)
                .requires("github-client-id"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("VAAS_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}
