//! To-do list commands.
//!
//! Lists are addressed by their 1-based position in `tasks list show`.

use clap::{Args, Subcommand};

use super::{pick, report, CommandError, OutputFormat};
use crate::context::AppContext;

#[derive(Args)]
pub struct ListCommand {
    #[command(subcommand)]
    pub command: ListSubcommand,
}

#[derive(Subcommand)]
pub enum ListSubcommand {
    /// Show active lists; the selected one is marked with `*`
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create a list and select it
    Add {
        /// List name
        name: String,
    },

    /// Rename a list
    Rename {
        /// List position
        list: usize,
        /// New name
        name: String,
    },

    /// Delete a list and its tasks
    Delete {
        /// List position
        list: usize,
    },

    /// Select the list task commands work on
    Select {
        /// List position
        list: usize,
    },
}

impl ListCommand {
    pub fn is_write(&self) -> bool {
        matches!(
            self.command,
            ListSubcommand::Add { .. } | ListSubcommand::Rename { .. } | ListSubcommand::Delete { .. }
        )
    }

    pub async fn run(&self, ctx: &AppContext) -> Result<(), CommandError> {
        let todo = &ctx.todo;
        match &self.command {
            ListSubcommand::Show { format } => {
                let lists = todo.active_lists().await?;
                let selected = todo.selected_list().await?.map(|l| l.id);
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&lists)?);
                    }
                    OutputFormat::Text => {
                        if lists.is_empty() {
                            println!("No lists yet.");
                        }
                        for (i, list) in lists.iter().enumerate() {
                            let marker = if Some(list.id) == selected { "*" } else { " " };
                            let tasks = ctx.store.tasks.count_active_for_list(list.id).await?;
                            println!("{} {:>2}. {} ({} task(s))", marker, i + 1, list.name, tasks);
                        }
                    }
                }
            }
            ListSubcommand::Add { name } => match todo.add_list(name).await? {
                Some(list) => println!("Created list: {}", list.name),
                None => println!("List name must not be blank."),
            },
            ListSubcommand::Rename { list, name } => {
                let lists = todo.active_lists().await?;
                let target = pick(&lists, "list", *list)?;
                report(todo.rename_list(target.id, name).await?, "List renamed.");
            }
            ListSubcommand::Delete { list } => {
                let lists = todo.active_lists().await?;
                let target = pick(&lists, "list", *list)?;
                report(
                    todo.delete_list(target.id).await?,
                    &format!("Deleted list: {}", target.name),
                );
            }
            ListSubcommand::Select { list } => {
                let lists = todo.active_lists().await?;
                let target = pick(&lists, "list", *list)?;
                report(
                    todo.select_list(target.id).await?,
                    &format!("Selected list: {}", target.name),
                );
            }
        }
        Ok(())
    }
}
