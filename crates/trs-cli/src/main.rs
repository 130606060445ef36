//! TRS command-line client.
//!
//! Signs in to the student records service, keeps the session token
//! between runs, and shows who is logged in.

mod commands;
mod output;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trs_core::{Config, SessionStore, StorageBackend};

use commands::register::RegisterArgs;
use output::{OutputFormat, Reported};

/// Log file name prefix in the cache directory (rotated daily)
const LOG_FILE_PREFIX: &str = "trs.log";

#[derive(Parser)]
#[command(name = "trs")]
#[command(about = "TRS CLI - Sign in to the student records service")]
#[command(version)]
pub struct Cli {
    /// Backend URL prefix (the `/api` suffix is added). TRS_API_URL takes
    /// precedence when set.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Where the session token is kept
    #[arg(long, value_enum)]
    pub storage: Option<StorageArg>,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session token
    Login {
        /// Student or staff ID (defaults to the last one used)
        #[arg(long, short)]
        username: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show whether a session is active
    Status,

    /// Show the logged-in user's profile
    Whoami,

    /// Create a student account
    Register(RegisterArgs),

    /// List the roles known to the backend
    Roles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageArg {
    /// `session.json` in the cache directory
    File,
    /// The OS keychain
    Keyring,
    /// This process only
    Memory,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::File => StorageBackend::File,
            StorageArg::Keyring => StorageBackend::Keyring,
            StorageArg::Memory => StorageBackend::Memory,
        }
    }
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

async fn run(cli: Cli, mut config: Config, store: &SessionStore) -> Result<()> {
    let output = cli.output;

    match cli.command {
        Commands::Login { username } => {
            commands::auth::login(store, &mut config, username, cli.quiet).await
        }
        Commands::Logout => {
            commands::auth::logout(store, cli.quiet);
            Ok(())
        }
        Commands::Status => commands::auth::status(store, output),
        Commands::Whoami => commands::auth::whoami(store, output),
        Commands::Register(args) => commands::register::register(store, args, cli.quiet).await,
        Commands::Roles => commands::register::roles(store, output).await,
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config ({}), using defaults", e);
        Config::default()
    });

    // Flags apply to this run only; the saved config keeps its own values
    let mut effective = config.clone();
    if let Some(ref url) = cli.api_url {
        effective.api_url = Some(url.clone());
    }
    if let Some(storage) = cli.storage {
        effective.storage = storage.into();
    }

    let guard = init_tracing(&effective);
    info!("TRS CLI starting");

    let result = match trs_core::connect(&effective) {
        Ok((_client, store)) => {
            let state = store.initialize();
            info!(%state, "Session initialized");
            run(cli, config, &store).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if e.downcast_ref::<Reported>().is_some() {
            debug!("Command failed: {:#}", e);
        } else {
            eprintln!("Error: {:#}", e);
        }
        // Flush the file log before exiting
        drop(guard);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use trs_core::Department;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["trs", "status"]);
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.output, OutputFormat::Text);
        assert_eq!(cli.storage, None);
        assert!(cli.api_url.is_none());
        assert!(!cli.quiet);
    }

    #[test]
    fn test_global_flags() {
        let cli = parse(&[
            "trs",
            "--api-url",
            "http://localhost:8000",
            "--storage",
            "keyring",
            "-o",
            "json",
            "-q",
            "whoami",
        ]);
        assert!(matches!(cli.command, Commands::Whoami));
        assert_eq!(cli.storage, Some(StorageArg::Keyring));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:8000"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_login_username_is_optional() {
        let cli = parse(&["trs", "login", "-u", "1604001"]);
        assert!(matches!(cli.command, Commands::Login { username: Some(ref u) } if u == "1604001"));

        let cli = parse(&["trs", "login"]);
        assert!(matches!(cli.command, Commands::Login { username: None }));
    }

    #[test]
    fn test_simple_subcommands() {
        assert!(matches!(parse(&["trs", "logout"]).command, Commands::Logout));
        assert!(matches!(parse(&["trs", "roles"]).command, Commands::Roles));
    }

    #[test]
    fn test_register_args() {
        let base = [
            "trs",
            "register",
            "-u",
            "1604001",
            "--email",
            "alice@example.com",
            "--first-name",
            "Alice",
            "--last-name",
            "Rahman",
            "--phone-number",
            "01711111111",
        ];

        let Commands::Register(args) = parse(&base).command else {
            panic!("expected register");
        };
        assert_eq!(args.username, "1604001");
        assert_eq!(args.department, Department::Cse);

        let mut with_department = base.to_vec();
        with_department.extend(["--department", "eee"]);
        let Commands::Register(args) = parse(&with_department).command else {
            panic!("expected register");
        };
        assert_eq!(args.department, Department::Eee);
    }

    #[test]
    fn test_register_requires_contact_fields() {
        let err = Cli::try_parse_from(["trs", "register", "-u", "1604001"])
            .err()
            .expect("missing fields rejected");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_unknown_storage_is_rejected() {
        let err = Cli::try_parse_from(["trs", "--storage", "vault", "status"])
            .err()
            .expect("unknown backend rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);

        let err = Cli::try_parse_from(["trs", "--output", "yaml", "status"])
            .err()
            .expect("unknown format rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["trs"]).is_err());
    }

    #[test]
    fn test_storage_arg_maps_to_backend() {
        assert_eq!(StorageBackend::from(StorageArg::File), StorageBackend::File);
        assert_eq!(StorageBackend::from(StorageArg::Keyring), StorageBackend::Keyring);
        assert_eq!(StorageBackend::from(StorageArg::Memory), StorageBackend::Memory);
    }
}
