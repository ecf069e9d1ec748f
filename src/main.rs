use anyhow::Result;
use clap::{Parser, Subcommand};
use claude_dashboard::cli;
use claude_dashboard::config::Config;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "claude-dashboard")]
#[command(about = "List and manage Claude Code sessions in tmux and terminals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions once (default)
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Refresh the session list until Ctrl+C
    Watch {
        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Start Claude in a new tmux session
    New {
        name: String,
        /// Start directory
        #[arg(long)]
        dir: Option<String>,
        /// Extra arguments passed to claude
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        args: String,
    },
    /// Kill a tmux session
    Kill { name: String },
    /// Attach the current terminal to a session
    Attach { name: String },
    /// Print recent pane output
    Logs {
        name: String,
        /// Scrollback lines (default from config)
        #[arg(long)]
        lines: Option<usize>,
    },
    /// Type text into a session followed by Enter
    Send { name: String, text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{:#}; using defaults", e);
            Config::default()
        }
    };
    let manager = cli::system_manager(&config);

    match cli.command {
        None => cli::list(&manager, false).await?,
        Some(Commands::List { json }) => cli::list(&manager, json).await?,
        Some(Commands::Watch { interval_ms }) => {
            let every = interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.refresh_interval());
            cli::watch::run(&manager, every).await?;
        }
        Some(Commands::New { name, dir, args }) => {
            let dir = dir.or_else(|| config.default_dir.clone());
            cli::create(&manager, &name, dir.as_deref(), &args).await?;
        }
        Some(Commands::Kill { name }) => cli::kill(&manager, &name).await?,
        Some(Commands::Attach { name }) => cli::attach(&manager, &name).await?,
        Some(Commands::Logs { name, lines }) => {
            cli::logs(&manager, &name, lines.unwrap_or(0)).await?
        }
        Some(Commands::Send { name, text }) => cli::send(&manager, &name, &text).await?,
    }

    Ok(())
}
