//! # wallo CLI
//!
//! Command-line front end for the wallo writing assistant.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wallo ingest <paths…>` | Add files or directories to the retrieval index |
//! | `wallo query "<text>"` | Show the most similar indexed chunks |
//! | `wallo ask "<text>"` | Run a prompt (or free chat) and print the reply |
//! | `wallo transcribe <audio>` | Print a transcript of an audio file |
//! | `wallo speak "<text>" --out f` | Synthesize speech into a file |
//! | `wallo prompts` | List configured prompts |
//! | `wallo services` | List configured services |
//!
//! ## Examples
//!
//! ```bash
//! wallo ingest ~/papers ./style-guide.md
//! wallo ask --prompt Professional "we did the thing and it kinda worked"
//! wallo ask --prompt summarize_paper --file paper.pdf --rag ""
//! wallo ask --prompt "summarize the paper" --answer "k words=150 words" ""
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wallo::assistant::Assistant;
use wallo::commands::{self, AskOptions};
use wallo::config::{self, Config};
use wallo::router::ServiceRouter;

/// wallo: writing assistance by large language models.
///
/// Configuration is read from `--config`, else `~/.wallo.toml`, else the
/// built-in defaults. See `config/wallo.example.toml`.
#[derive(Parser)]
#[command(name = "wallo", version, about = "Writing assistance by large language models")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files or directories into the retrieval index.
    ///
    /// Re-ingesting a file replaces all of its previous chunks.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Query the retrieval index.
    Query {
        text: String,

        /// Number of chunks to return (defaults to `rag.top_k`).
        #[arg(short, long, allow_negative_numbers = true)]
        k: Option<i64>,
    },

    /// Send text to the chat service and print the reply.
    ///
    /// Without `--prompt` the text is sent as-is (free chat).
    Ask {
        text: String,

        /// Prompt name from the configuration.
        #[arg(long)]
        prompt: Option<String>,

        /// Chat service to use instead of the prompt's or the default one.
        #[arg(long)]
        service: Option<String>,

        /// Document for `pdf` prompts.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Ground the request with chunks from the retrieval index.
        #[arg(long)]
        rag: bool,

        /// Inquiry answers as `field=value` pairs.
        #[arg(long = "answer", value_parser = commands::parse_key_val)]
        answers: Vec<(String, String)>,
    },

    /// Transcribe an audio file.
    Transcribe { audio: PathBuf },

    /// Synthesize speech from text.
    Speak {
        text: String,

        #[arg(long)]
        out: PathBuf,
    },

    /// List configured prompts.
    Prompts,

    /// List configured services.
    Services,
}

fn resolve_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        return config::load_config(path);
    }
    let default_path = config::default_config_path();
    if default_path.exists() {
        config::load_config(&default_path)
    } else {
        info!("no config at {}, using built-in defaults", default_path.display());
        Ok(Config::builtin())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let cfg = Arc::new(resolve_config(cli.config.as_ref())?);

    match cli.command {
        Commands::Prompts => {
            commands::list_prompts(&cfg);
            return Ok(());
        }
        Commands::Services => {
            commands::list_services(&cfg);
            return Ok(());
        }
        _ => {}
    }

    let router = Arc::new(ServiceRouter::new(Arc::clone(&cfg))?);
    let assistant = Assistant::new(cfg, router)
        .await
        .context("Failed to open retrieval index")?;

    let ok = match cli.command {
        Commands::Ingest { paths } => {
            commands::run_ingest(&assistant, &paths).await?;
            true
        }
        Commands::Query { text, k } => {
            commands::run_query(&assistant, &text, k).await?;
            true
        }
        Commands::Ask {
            text,
            prompt,
            service,
            file,
            rag,
            answers,
        } => {
            commands::run_ask(
                &assistant,
                AskOptions {
                    text,
                    prompt,
                    service,
                    file,
                    rag,
                    answers,
                },
            )
            .await?
        }
        Commands::Transcribe { audio } => commands::run_transcribe(&assistant, &audio).await?,
        Commands::Speak { text, out } => commands::run_speak(&assistant, &text, &out).await?,
        Commands::Prompts | Commands::Services => true,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
