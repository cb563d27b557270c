mod commands;
mod config;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    EXIT_FAILURE, EXIT_INPUT_ERROR, EXIT_RETRYABLE, INPUT_ERROR_PREFIX, RETRYABLE_PREFIX,
};
use config::Config;
use gitenv_core::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "gitenv",
    version,
    about = "Track package environments in git and deploy them by label"
)]
struct Cli {
    /// Path to a TOML config file (default: $GITENV_CONFIG or ~/.config/gitenv/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Package backend to resolve and install with (conda, mock).
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve every environment spec into a manifest branch.
    Resolve {
        /// URI of the tracking repository.
        repo_uri: String,
        /// Only resolve environments matching these globs.
        #[arg(long, num_args = 1..)]
        envs: Vec<String>,
        /// User for authenticated channels.
        #[arg(long)]
        api_user: Option<String>,
        /// Key for authenticated channels.
        #[arg(long)]
        api_key: Option<String>,
        /// Commit locally without pushing manifest branches.
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },
    /// Tag new manifest commits as dated snapshots.
    Autotag {
        /// URI of the tracking repository.
        repo_uri: String,
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },
    /// Promote a snapshot tag through the labels of its environment.
    Autolabel {
        /// URI of the tracking repository.
        repo_uri: String,
        /// Snapshot tag to promote, e.g. env-default-2024_01_31.
        tag: String,
        /// Only move the `next` label.
        #[arg(long, default_value_t = false)]
        next_only: bool,
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },
    /// Install labelled snapshots under a target directory and link labels.
    Deploy {
        /// URI of the tracking repository.
        repo_uri: String,
        /// Root directory to deploy into.
        target: PathBuf,
        /// Only deploy `<env>/<label>` pairs matching these globs.
        #[arg(long, num_args = 1..)]
        env_labels: Vec<String>,
        /// Replace every package channel with this mirror.
        #[arg(long)]
        mirror: Option<String>,
        #[arg(long)]
        api_user: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        /// Seconds to wait for a lock before giving up.
        #[arg(long)]
        lock_timeout: Option<u64>,
        /// Reclaim lock files older than this many seconds.
        #[arg(long)]
        stale_lock_after: Option<u64>,
    },
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn run(cli: Cli) -> Result<u8, String> {
    let mut config = Config::discover(cli.config.as_deref())?;
    if cli.backend.is_some() {
        config.backend = cli.backend;
    }
    let json = cli.json;

    match cli.command {
        Commands::Resolve {
            repo_uri,
            envs,
            api_user,
            api_key,
            no_push,
        } => {
            let backend = commands::make_backend(&config)?;
            config.override_credentials(api_user, api_key);
            commands::resolve::run(
                backend.as_ref(),
                &repo_uri,
                &envs,
                config.credentials(),
                !no_push,
                json,
            )
        }
        Commands::Autotag { repo_uri, no_push } => {
            commands::autotag::run(&repo_uri, !no_push, json)
        }
        Commands::Autolabel {
            repo_uri,
            tag,
            next_only,
            no_push,
        } => commands::autolabel::run(&repo_uri, &tag, next_only, !no_push, json),
        Commands::Deploy {
            repo_uri,
            target,
            env_labels,
            mirror,
            api_user,
            api_key,
            lock_timeout,
            stale_lock_after,
        } => {
            let backend = commands::make_backend(&config)?;
            config.override_credentials(api_user, api_key);
            let mut lock = config.lock_options();
            if let Some(secs) = lock_timeout {
                lock.timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = stale_lock_after {
                lock.stale_after = Some(Duration::from_secs(secs));
            }
            let args = commands::deploy::DeployArgs {
                uri: &repo_uri,
                target: &target,
                env_labels: &env_labels,
                mirror: mirror.or_else(|| config.mirror.clone()),
                credentials: config.credentials(),
                lock,
            };
            commands::deploy::run(backend.as_ref(), args, json)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GITENV_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(INPUT_ERROR_PREFIX) {
                EXIT_INPUT_ERROR
            } else if msg.starts_with(RETRYABLE_PREFIX) {
                EXIT_RETRYABLE
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
