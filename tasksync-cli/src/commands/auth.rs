//! Sign-in commands.
//!
//! Signing in makes the user id the owner of new lists and shops and enables
//! sync. Data created while signed out stays on this device.

use clap::{Args, Subcommand};

use super::CommandError;
use crate::context::AppContext;

/// Authentication commands
#[derive(Args)]
pub struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Sign in as a user
    SignIn {
        /// User id; must match the owner used on your other devices
        user: String,
    },
    /// Sign out; lists and shops of the user stay in the local store
    SignOut,
    /// Show the signed-in user
    Whoami,
}

impl AuthCommand {
    /// Runs the command; owner changes go through the sync trigger.
    pub async fn run(&self, ctx: &mut AppContext) -> Result<(), CommandError> {
        match &self.command {
            AuthSubcommand::SignIn { user } => {
                let user = user.trim();
                ctx.identity.sign_in(user)?;
                if let Some(trigger) = &ctx.trigger {
                    if let Some(report) = trigger.on_owner_changed(Some(user.to_string())).await {
                        println!("{}", report);
                    }
                } else {
                    ctx.todo.selection().clear();
                }
                ctx.save_session()?;
                println!("Signed in as {}", user);
            }
            AuthSubcommand::SignOut => {
                ctx.identity.sign_out();
                match &ctx.trigger {
                    Some(trigger) => {
                        trigger.on_owner_changed(None).await;
                    }
                    None => ctx.todo.selection().clear(),
                }
                ctx.save_session()?;
                println!("Signed out.");
            }
            AuthSubcommand::Whoami => match ctx.identity.current_user() {
                Some(user) => println!("{}", user),
                None => println!("Not signed in."),
            },
        }
        Ok(())
    }
}
