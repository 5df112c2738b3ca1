//! bunker: remote signer.
//!
//! Holds a signing key and lets one remote client use it over public
//! relays. The client pairs with a `bunker://` URL carrying a shared secret.

mod commands;
mod config;
mod secret;
mod state;
mod uri;

use bunker_core::CipherSuite;
use clap::{Args, Parser, Subcommand};
use config::{expand_tilde, BunkerConfig, Overrides};
use tracing::{error, info};

/// bunker: remote signer over relays
#[derive(Parser, Debug)]
#[command(name = "bunker", version, about = "Serve a local signing key to one remote client over relays")]
struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = "~/.bunker/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer requests from the paired client until interrupted
    Serve(ServeArgs),

    /// Generate a signing key
    Keygen {
        /// Where to write the key (defaults to [signer] key_file)
        #[arg(short, long)]
        output: Option<String>,

        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Print the bunker:// URL clients pair with
    Url(SharedArgs),
}

/// Options shared by every command that talks to relays.
#[derive(Args, Debug)]
struct SharedArgs {
    /// Relay URL (repeatable; replaces the configured list)
    #[arg(short, long = "relay")]
    relays: Vec<String>,

    /// Connect secret
    #[arg(long, conflicts_with = "secret_file")]
    secret: Option<String>,

    /// File holding the connect secret, re-read at every connect
    #[arg(long)]
    secret_file: Option<String>,

    /// Signing key file
    #[arg(long)]
    key_file: Option<String>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Refuse connects from anyone but the already authorized client
    #[arg(long)]
    exclusive: bool,

    /// Force one cipher suite (nip44 or nip04) on every response instead of
    /// answering in the suite of each request
    #[arg(long)]
    suite: Option<CipherSuite>,

    /// Where the authorized client is remembered
    #[arg(long)]
    state_file: Option<String>,
}

impl SharedArgs {
    fn into_overrides(self) -> Overrides {
        Overrides {
            key_file: self.key_file,
            relays: self.relays,
            secret: self.secret,
            secret_file: self.secret_file,
            ..Default::default()
        }
    }
}

impl ServeArgs {
    fn into_overrides(self) -> Overrides {
        Overrides {
            exclusive: self.exclusive,
            suite: self.suite,
            state_file: self.state_file,
            ..self.shared.into_overrides()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = expand_tilde(&cli.config);

    let result = match cli.command {
        Command::Serve(args) => match BunkerConfig::load(&config_path, args.into_overrides()) {
            Ok(config) => {
                info!(version = env!("CARGO_PKG_VERSION"), "bunker starting");
                let outcome = commands::serve::run(&config, shutdown_signal()).await;
                info!("bunker stopped");
                outcome
            }
            Err(e) => Err(e),
        },
        Command::Keygen { output, force } => {
            let overrides = Overrides {
                key_file: output,
                ..Default::default()
            };
            match BunkerConfig::load(&config_path, overrides) {
                Ok(config) => commands::keygen::run(&config.key_file, force).await,
                Err(e) => Err(e),
            }
        }
        Command::Url(args) => match BunkerConfig::load(&config_path, args.into_overrides()) {
            Ok(config) => commands::url::run(&config).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("bunker: {e:#}");
        std::process::exit(1);
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
