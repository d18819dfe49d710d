use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tasksync_core::LifecycleEvent;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod context;
mod session;

use commands::{AuthCommand, ConfigCommand, ListCommand, ShopCommand, SyncCommand, TaskCommand};
use config::Config;
use context::AppContext;

#[derive(Parser)]
#[command(name = "tasks")]
#[command(version)]
#[command(about = "Offline-first to-do and shopping lists with sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage to-do lists
    List(ListCommand),

    /// Manage tasks of the selected list
    Task(TaskCommand),

    /// Manage shops and shopping items
    Shop(ShopCommand),

    /// Sync with remote server
    Sync(SyncCommand),

    /// Sign in or out
    Auth(AuthCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cli_config_path = cli.config.clone();
    let config = Config::load(cli.config)?;

    let command = match cli.command {
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli_config_path)?;
            return Ok(());
        }
        Some(command) => command,
        None => {
            println!("Use --help to see available commands");
            return Ok(());
        }
    };

    let auto_sync = config.sync.auto_sync;
    let mut ctx = AppContext::open(config).await?;

    // Auto-sync BEFORE data commands
    if auto_sync && !matches!(command, Commands::Sync(_) | Commands::Auth(_)) {
        fire(&ctx, LifecycleEvent::Started).await;
    }

    let result = execute_command(&command, &mut ctx).await;

    // Auto-sync AFTER write commands (only if command succeeded)
    if result.is_ok() && auto_sync && is_write_command(&command) {
        fire(&ctx, LifecycleEvent::Stopped).await;
    }

    ctx.save_session()?;
    result.map_err(Into::into)
}

async fn execute_command(
    command: &Commands,
    ctx: &mut AppContext,
) -> Result<(), commands::CommandError> {
    match command {
        Commands::List(cmd) => cmd.run(ctx).await,
        Commands::Task(cmd) => cmd.run(ctx).await,
        Commands::Shop(cmd) => cmd.run(ctx).await,
        Commands::Sync(cmd) => cmd.run(ctx).await,
        Commands::Auth(cmd) => cmd.run(ctx).await,
        // Handled before the context is opened.
        Commands::Config(_) => Ok(()),
    }
}

/// Runs a lifecycle sync. Failures are contained in the report; only a
/// summary of them is shown.
async fn fire(ctx: &AppContext, event: LifecycleEvent) {
    let Some(trigger) = &ctx.trigger else {
        return;
    };
    if let Some(report) = trigger.on_lifecycle(event).await {
        if report.failed() > 0 {
            eprintln!(
                "Auto-sync: {} write(s) failed, will retry next time",
                report.failed()
            );
        }
        if report.unreachable() > 0 {
            eprintln!("Auto-sync: server unreachable for part of the data, will retry next time");
        }
    }
}

/// Returns true if the command is a write operation that should sync after execution.
fn is_write_command(command: &Commands) -> bool {
    match command {
        Commands::List(cmd) => cmd.is_write(),
        Commands::Task(cmd) => cmd.is_write(),
        Commands::Shop(cmd) => cmd.is_write(),
        Commands::Sync(_) | Commands::Auth(_) | Commands::Config(_) => false,
    }
}
