//! Ask the mail directory what an MTA would ask it.

use std::{env, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use mailroom::{CONFIG_ENV, Mailroom, Query, check, query};
use mailroom_common::logging;
use mailroom_directory::{
    Directory, DirectoryBackend, DirectoryConfig,
    backend::{LdapBackend, MemoryBackend},
    config::BackendConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

/// Variable holding the password for `authn`, read from stdin when unset.
const SECRET_ENV: &str = "MAILROOM_SECRET";

/// Exit code for a lookup that succeeded with a negative answer.
const NEGATIVE: u8 = 2;

#[derive(Parser)]
#[command(name = "mailroom")]
#[command(about = "Directory-backed recipient, alias and authorization lookups", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file, overriding MAILROOM_CONFIG and the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Give up on a lookup after this many seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a recipient address exists
    Rcpt { address: String },

    /// Expand an address into its forwarding addresses
    Alias { address: String },

    /// Check that a principal may send as an address
    Authz { principal: String, address: String },

    /// Verify a password (taken from MAILROOM_SECRET or the first line of stdin)
    Authn { user: String },

    /// Validate the configuration and every search template
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init();

    let cli = Cli::parse();

    let path = Mailroom::locate(cli.config.as_deref(), env::var_os(CONFIG_ENV))?;
    let config = Mailroom::load(&path)?;
    info!(path = %path.display(), "Loaded configuration");

    let query = match cli.command {
        Commands::Check => return Ok(cmd_check(&config.directory)),
        Commands::Rcpt { address } => Query::Rcpt { address },
        Commands::Alias { address } => Query::Alias { address },
        Commands::Authz { principal, address } => Query::Authz { principal, address },
        Commands::Authn { user } => Query::Authn {
            user,
            secret: read_secret().await?,
        },
    };

    let timeout = Duration::from_secs(cli.timeout);
    let directory = config.directory;
    match &directory.backend {
        BackendConfig::Ldap(ldap) => {
            cmd_query(LdapBackend::new(ldap), directory.clone(), &query, timeout).await
        }
        BackendConfig::Memory(memory) => {
            cmd_query(MemoryBackend::from_config(memory), directory.clone(), &query, timeout).await
        }
    }
}

fn cmd_check(config: &DirectoryConfig) -> ExitCode {
    let report = check(config);
    print!("{report}");

    if report.is_ok() {
        println!("configuration ok");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn cmd_query<B: DirectoryBackend>(
    backend: B,
    config: DirectoryConfig,
    query: &Query,
    timeout: Duration,
) -> anyhow::Result<ExitCode> {
    let directory =
        Directory::connect(backend, config).context("Failed to set up the directory pool")?;
    let answer = query::run(&directory, query, timeout).await;

    if let Err(err) = directory.close() {
        debug!(%err, "Directory pool already closed");
    }

    let answer = answer.context("Directory lookup failed")?;
    println!("{answer}");

    Ok(if answer.is_positive() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(NEGATIVE)
    })
}

async fn read_secret() -> anyhow::Result<String> {
    if let Some(secret) = env::var_os(SECRET_ENV) {
        return secret
            .into_string()
            .map_err(|_| anyhow::anyhow!("{SECRET_ENV} is not valid UTF-8"));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await.context("Failed to read secret from stdin")? {
        Some(secret) => Ok(secret),
        None => bail!("No secret given on stdin and {SECRET_ENV} is unset"),
    }
}
