//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use tasksync_core::is_local_owner;

use super::{CommandError, OutputFormat};
use crate::context::AppContext;

/// Sync with remote server
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,

    /// Output format for the sync report
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and local record counts
    Status,

    /// Rewrite remote documents stored in the legacy schema
    Migrate,
}

impl SyncCommand {
    pub async fn run(&self, ctx: &AppContext) -> Result<(), CommandError> {
        match &self.command {
            None => self.sync(ctx).await,
            Some(SyncSubcommand::Status) => status(ctx).await,
            Some(SyncSubcommand::Migrate) => migrate(ctx).await,
        }
    }

    async fn sync(&self, ctx: &AppContext) -> Result<(), CommandError> {
        let orchestrator = ctx
            .orchestrator
            .as_ref()
            .ok_or(CommandError::SyncNotConfigured)?;
        let owner = signed_in_owner(ctx)?;

        let report = orchestrator.sync(&owner).await;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text => {
                println!("{}", report);
                println!();
                if report.failed() > 0 {
                    println!(
                        "{} write(s) failed; they will be retried on the next sync.",
                        report.failed()
                    );
                } else if report.changes() == 0 {
                    println!("Already up to date.");
                } else {
                    println!("Sync complete.");
                }
            }
        }
        Ok(())
    }
}

fn signed_in_owner(ctx: &AppContext) -> Result<String, CommandError> {
    let owner = ctx.identity.todo_owner();
    if is_local_owner(&owner) {
        return Err(CommandError::NotSignedIn);
    }
    Ok(owner)
}

async fn status(ctx: &AppContext) -> Result<(), CommandError> {
    println!("Sync Configuration");
    println!("==================");
    println!();

    let sync = &ctx.config.sync;
    match ctx.identity.current_user() {
        Some(user) => println!("Signed in as: {}", user),
        None => println!("Signed in as: (nobody, data stays on this device)"),
    }

    if !sync.is_configured() {
        println!("Status:       Not configured");
        println!();
        println!("To enable sync, add to your config file:");
        println!();
        println!("  sync:");
        println!("    server_url: \"http://localhost:8080\"");
        println!("    api_key: \"your-secret-key-here\"");
        println!();
        println!("Or set environment variables:");
        println!("  TASKS_SYNC_URL");
        println!("  TASKS_SYNC_API_KEY");
        return Ok(());
    }

    if let Some(url) = &sync.server_url {
        println!("Server:       {}", url);
    }
    println!(
        "Auto-sync:    {}",
        if sync.auto_sync { "enabled" } else { "disabled" }
    );
    match sync.tombstone_retention_days {
        Some(days) => println!("Tombstones:   collected after {} day(s)", days),
        None => println!("Tombstones:   kept forever"),
    }

    let owner = ctx.identity.todo_owner();
    let lists = ctx.store.lists.all_by_owner(&owner).await?;
    let shops = ctx.store.shops.all_by_owner(&owner).await?;
    let pending = lists.iter().filter(|l| l.is_deleted).count()
        + shops.iter().filter(|s| s.is_deleted).count();
    println!();
    println!("Local lists:  {}", lists.len());
    println!("Local shops:  {}", shops.len());
    println!("Tombstones:   {} awaiting sync", pending);
    Ok(())
}

async fn migrate(ctx: &AppContext) -> Result<(), CommandError> {
    let orchestrator = ctx
        .orchestrator
        .as_ref()
        .ok_or(CommandError::SyncNotConfigured)?;
    let owner = signed_in_owner(ctx)?;

    let report = orchestrator.migrate_remote_schema(&owner).await?;
    println!(
        "Rewrote {} list(s), {} shop(s) and {} task(s) in the current schema.",
        report.lists, report.shops, report.tasks
    );
    Ok(())
}
