mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// rhythmiq CLI -- chaos levels, pattern nudges and multi-model chat.
#[derive(Parser)]
#[command(name = "rq", version, about)]
struct Cli {
    /// Config file (defaults to ~/.rhythmiq/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and record the user's current chaos level.
    Chaos {
        #[arg(long)]
        user: Uuid,
    },

    /// Run the pattern detectors without recording anything.
    Patterns {
        #[arg(long)]
        user: Uuid,
    },

    /// Send a message to the configured models. Use @name or @all to target.
    Ask {
        #[arg(long)]
        user: Uuid,
        /// Continue an existing conversation thread.
        #[arg(long)]
        thread: Option<Uuid>,
        /// Message text.
        message: String,
    },

    /// Show recorded chaos levels, newest first.
    History {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Capture a task or an idea.
    Capture {
        #[arg(long)]
        user: Uuid,
        /// Record a task instead of an idea.
        #[arg(long)]
        task: bool,
        /// Mark the task as a most-important task.
        #[arg(long, requires = "task")]
        mit: bool,
        /// Title text.
        title: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = commands::Env::open(cli.config.as_deref(), cli.json_logs).await?;

    match cli.command {
        Commands::Chaos { user } => commands::chaos::run(&env, user).await?,
        Commands::Patterns { user } => commands::patterns::run(&env, user).await?,
        Commands::Ask {
            user,
            thread,
            message,
        } => commands::ask::run(&env, user, thread, &message).await?,
        Commands::History { user, limit } => commands::history::run(&env, user, limit).await?,
        Commands::Capture {
            user,
            task,
            mit,
            title,
        } => commands::capture::run(&env, user, task, mit, &title).await?,
    }

    Ok(())
}
