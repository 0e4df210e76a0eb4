use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use dirmind::config::DirmindConfig;
use dirmind::server::StateFiles;
use dirmind::{cli, server};

#[derive(Parser)]
#[command(name = "dirmind", version, about = "Sandboxed directory, git, memory and LLM tools over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArgs {
    /// Config file (default: $DIRMIND_CONFIG or ~/.dirmind/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to serve, overriding watch_dir from config
    #[arg(long)]
    watch_dir: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport)
    Serve {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Run a single tool call and print its result
    Tool {
        /// Tool name, e.g. read_file
        name: String,
        /// Arguments as KEY=VALUE; values are parsed as JSON when possible
        args: Vec<String>,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Validate configuration and report sandbox, files and providers
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

impl ConfigArgs {
    fn load(&self) -> Result<DirmindConfig> {
        let mut config = match &self.config {
            Some(path) => DirmindConfig::load_from(path)?,
            None => DirmindConfig::load()?,
        };
        if let Some(dir) = &self.watch_dir {
            config.watch_dir = Some(dir.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let config = config.load()?;
            let root = config.validate_sandbox()?;
            let files = StateFiles::resolve(&config, &root);
            init_tracing(&config.server.log_level, Some(&files.log));
            server::serve_stdio(config, &root).await?;
        }
        Command::Tool { name, args, config } => {
            let config = config.load()?;
            init_tracing(&config.server.log_level, None);
            let root = config.validate_sandbox()?;
            let output = cli::run_tool(config, &root, &name, &args).await?;
            println!("{output}");
        }
        Command::Check { config } => {
            let config = config.load()?;
            init_tracing(&config.server.log_level, None);
            cli::check(&config)?;
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays clean for MCP JSON-RPC, and optionally to a
/// plain-text file.
fn init_tracing(level: &str, log_file: Option<&Path>) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let mut open_error = None;
    let file_layer = log_file.and_then(|path| match open_log(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            open_error = Some((path.to_path_buf(), e));
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some((path, e)) = open_error {
        tracing::warn!(path = %path.display(), error = %e, "cannot open log file, logging to stderr only");
    }
}

fn open_log(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
