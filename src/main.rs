mod audit;
mod auth;
mod cli;
mod clock;
mod config;
mod prompt;

use anyhow::Result;
use auth::{AuthError, AuthGate, AuthOutcome};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "warden", about = "Password-protected operator console")]
pub struct Args {
    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "WARDEN_DATA_DIR",
        help = "Directory holding the credential, ledger and session"
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(long, help = "Print security status and exit without logging in")]
    pub status: bool,

    #[arg(long, help = "Debug output")]
    pub debug: bool,
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.debug {
        "warden=debug"
    } else {
        "warden=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };
    if let Some(data_dir) = &args.data_dir {
        cfg.data_dir = Some(data_dir.clone());
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("Config error {}", error);
        }
        return Err(anyhow::anyhow!(
            "Invalid configuration ({} errors)",
            errors.len()
        ));
    }
    tracing::debug!("state directory: {}", cfg.data_dir().display());

    let gate = AuthGate::open(&cfg)?;

    if args.status {
        print!("{}", cli::format_status(&gate.status()));
        return Ok(ExitCode::SUCCESS);
    }

    let mut prompter = prompt::TerminalPrompter::new()?;
    match gate.authenticate(&mut prompter)? {
        AuthOutcome::Granted(session) => {
            println!("Welcome! Session {} started.", session.short_id());
        }
        AuthOutcome::Locked { .. } => {
            let secs = gate.status().locked_for_secs.unwrap_or_default();
            println!("{}. Try again later.", AuthError::Locked(secs));
            return Ok(ExitCode::FAILURE);
        }
        AuthOutcome::Rejected { locked_until } => {
            println!("Authentication failed.");
            if locked_until.is_some() {
                println!("Too many failed attempts. The console is locked.");
            }
            return Ok(ExitCode::FAILURE);
        }
        AuthOutcome::Cancelled => {
            println!();
            println!("Authentication cancelled.");
            return Ok(ExitCode::FAILURE);
        }
    }

    let ctx = cli::Context {
        gate,
        paths: cfg.paths(),
        prompter: RefCell::new(prompter),
    };
    cli::run_repl(&ctx)?;
    Ok(ExitCode::SUCCESS)
}
