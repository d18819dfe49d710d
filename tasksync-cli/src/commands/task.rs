//! Task commands on the selected list.
//!
//! Tasks and subtasks are addressed by their 1-based position in
//! `tasks task show`.

use clap::{Args, Subcommand};
use tasksync_core::{SubTask, Task};

use super::{index, pick, report, CommandError, OutputFormat};
use crate::context::AppContext;

#[derive(Args)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Show the tasks of the selected list
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Add a task at the end of the selected list
    Add {
        /// Task title
        title: String,
    },

    /// Rename a task
    Rename { task: usize, title: String },

    /// Delete a task
    Delete { task: usize },

    /// Move a task to another position
    Move { from: usize, to: usize },

    /// Mark a task and all its subtasks complete
    Done { task: usize },

    /// Mark a task and all its subtasks incomplete
    Undone { task: usize },

    /// Expand or collapse a task's subtasks
    Toggle { task: usize },

    /// Add a subtask
    AddSub { task: usize, title: String },

    /// Rename a subtask
    RenameSub {
        task: usize,
        subtask: usize,
        title: String,
    },

    /// Delete a subtask
    DeleteSub { task: usize, subtask: usize },

    /// Mark a subtask complete
    DoneSub { task: usize, subtask: usize },

    /// Mark a subtask incomplete
    UndoneSub { task: usize, subtask: usize },
}

impl TaskCommand {
    pub fn is_write(&self) -> bool {
        !matches!(self.command, TaskSubcommand::Show { .. })
    }

    pub async fn run(&self, ctx: &AppContext) -> Result<(), CommandError> {
        let todo = &ctx.todo;
        let list = todo
            .selected_list()
            .await?
            .ok_or(CommandError::NoListSelected)?;
        let tasks = todo.tasks().await?;

        match &self.command {
            TaskSubcommand::Show { format } => match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
                OutputFormat::Text => print_tasks(&list.name, &tasks),
            },
            TaskSubcommand::Add { title } => match todo.add_task(title).await? {
                Some(task) => println!("Added task: {}", task.title),
                None => println!("Task title must not be blank."),
            },
            TaskSubcommand::Rename { task, title } => {
                let task = pick(&tasks, "task", *task)?;
                report(todo.rename_task(task.id, title).await?, "Task renamed.");
            }
            TaskSubcommand::Delete { task } => {
                let task = pick(&tasks, "task", *task)?;
                report(
                    todo.delete_task(task.id).await?,
                    &format!("Deleted task: {}", task.title),
                );
            }
            TaskSubcommand::Move { from, to } => {
                let moved = todo
                    .move_task(index("task", *from)?, index("task", *to)?)
                    .await?;
                report(moved, "Task moved.");
            }
            TaskSubcommand::Done { task } => {
                let task = pick(&tasks, "task", *task)?;
                report(todo.set_task_completed(task.id, true).await?, "Task completed.");
            }
            TaskSubcommand::Undone { task } => {
                let task = pick(&tasks, "task", *task)?;
                report(todo.set_task_completed(task.id, false).await?, "Task reopened.");
            }
            TaskSubcommand::Toggle { task } => {
                let task = pick(&tasks, "task", *task)?;
                report(todo.toggle_task_expanded(task.id).await?, "Task toggled.");
            }
            TaskSubcommand::AddSub { task, title } => {
                let task = pick(&tasks, "task", *task)?;
                report(todo.add_subtask(task.id, title).await?, "Subtask added.");
            }
            TaskSubcommand::RenameSub {
                task,
                subtask,
                title,
            } => {
                let (task, subtask) = pick_subtask(&tasks, *task, *subtask)?;
                report(
                    todo.rename_subtask(task.id, subtask.id, title).await?,
                    "Subtask renamed.",
                );
            }
            TaskSubcommand::DeleteSub { task, subtask } => {
                let (task, subtask) = pick_subtask(&tasks, *task, *subtask)?;
                report(
                    todo.delete_subtask(task.id, subtask.id).await?,
                    "Subtask deleted.",
                );
            }
            TaskSubcommand::DoneSub { task, subtask } => {
                let (task, subtask) = pick_subtask(&tasks, *task, *subtask)?;
                report(
                    todo.set_subtask_completed(task.id, subtask.id, true).await?,
                    "Subtask completed.",
                );
            }
            TaskSubcommand::UndoneSub { task, subtask } => {
                let (task, subtask) = pick_subtask(&tasks, *task, *subtask)?;
                report(
                    todo.set_subtask_completed(task.id, subtask.id, false).await?,
                    "Subtask reopened.",
                );
            }
        }
        Ok(())
    }
}

fn pick_subtask(
    tasks: &[Task],
    task: usize,
    subtask: usize,
) -> Result<(&Task, &SubTask), CommandError> {
    let task = pick(tasks, "task", task)?;
    let subtask = pick(&task.subtasks, "subtask", subtask)?;
    Ok((task, subtask))
}

fn print_tasks(list_name: &str, tasks: &[Task]) {
    println!("{}", list_name);
    println!("{}", "=".repeat(list_name.chars().count()));
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    for (i, task) in tasks.iter().enumerate() {
        let check = if task.is_completed { "[x]" } else { "[ ]" };
        let fold = match (task.subtasks.is_empty(), task.is_expanded) {
            (true, _) => "",
            (false, true) => " -",
            (false, false) => " +",
        };
        println!("{:>2}. {} {}{}", i + 1, check, task.title, fold);
        if task.is_expanded {
            for (j, subtask) in task.subtasks.iter().enumerate() {
                let check = if subtask.is_completed { "[x]" } else { "[ ]" };
                println!("      {}. {} {}", j + 1, check, subtask.title);
            }
        }
    }
}
