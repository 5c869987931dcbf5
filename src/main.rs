use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueHint};
use tracing_subscriber::EnvFilter;

use flashgen::commands::generate::{self, GenerateArgs};
use flashgen::commands::quiz::{self, QuizFilter};
use flashgen::commands::serve::{self, ServeArgs};
use flashgen::commands::stats;
use flashgen::config::{BackendKind, Settings, StorageMode};
use flashgen::crud::FlashcardStore;
use flashgen::llm::{self, Backend, GenerationOptions};
use flashgen::palette::Palette;
use flashgen::pipeline::StopSignal;

#[derive(Parser, Debug)]
#[command(
    name = "flashgen",
    version,
    about = "Turn study notes into flashcards with an LLM, then quiz yourself.",
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true,
    disable_help_subcommand = true
)]
struct Cli {
    /// Settings file. Defaults to config.toml in the user config folder.
    #[arg(long, global = true, value_name = "PATH", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate flashcards from a folder of notes
    Generate {
        /// Notes folder laid out as Subject/Subtopic/files
        #[arg(value_name = "NOTES_DIR", value_hint = ValueHint::DirPath)]
        notes_dir: PathBuf,
        /// Folder the card databases are written to
        #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
        output: Option<PathBuf>,
        /// Cards to request per chunk
        #[arg(long, value_name = "COUNT")]
        cards_per_chunk: Option<usize>,
        /// local_inference, local_server or remote_http
        #[arg(long, value_name = "KIND")]
        backend: Option<BackendKind>,
        /// Model name for a local server, or weights path for local inference
        #[arg(long, value_name = "NAME")]
        model: Option<String>,
        /// Server base URL or remote endpoint
        #[arg(long, value_name = "URL")]
        url: Option<String>,
        /// global or per_subject
        #[arg(long, value_name = "MODE")]
        storage_mode: Option<StorageMode>,
    },
    /// Quiz yourself on stored flashcards
    Quiz {
        #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
        output: Option<PathBuf>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        subtopic: Option<String>,
        /// Maximum number of questions
        #[arg(long, value_name = "COUNT")]
        limit: Option<usize>,
    },
    /// Serve upload, download, flashcard and quiz endpoints over HTTP
    Serve {
        #[arg(long, value_name = "HOST")]
        host: Option<String>,
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
        #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
        output: Option<PathBuf>,
    },
    /// Show counts of stored flashcards
    Stats {
        #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
        output: Option<PathBuf>,
    },
    /// Print the effective settings
    Config,
    /// Manage the backend connection
    Backend {
        /// Store an API key for the remote HTTP backend
        #[arg(long, value_name = "KEY", conflicts_with = "clear_key")]
        set_key: Option<String>,
        /// Remove the stored API key
        #[arg(long, conflicts_with = "test")]
        clear_key: bool,
        /// Check that the configured backend answers
        #[arg(long)]
        test: bool,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run_cli().await {
        eprintln!("{:?}", err);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flashgen=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let (settings, config_path) = Settings::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Generate {
            notes_dir,
            output,
            cards_per_chunk,
            backend,
            model,
            url,
            storage_mode,
        } => {
            let stop = stop_on_ctrl_c();
            let args = GenerateArgs {
                notes_dir,
                output,
                cards_per_chunk,
                backend,
                model,
                url,
                storage_mode,
            };
            generate::run(settings, args, stop).await?;
        }
        Command::Quiz {
            output,
            subject,
            subtopic,
            limit,
        } => {
            let store = store_for(&settings, output)?;
            quiz::run(
                &store,
                QuizFilter {
                    subject,
                    subtopic,
                    limit,
                },
            )
            .await?;
        }
        Command::Serve { host, port, output } => {
            serve::run(settings, ServeArgs { host, port, output }).await?;
        }
        Command::Stats { output } => {
            let store = store_for(&settings, output)?;
            stats::run(&store).await?;
        }
        Command::Config => {
            println!("{} {}", Palette::dim("# config file:"), config_path.display());
            print!("{}", settings.to_toml()?);
        }
        Command::Backend {
            set_key,
            clear_key,
            test,
        } => handle_backend_command(&settings, set_key, clear_key, test).await?,
    }

    Ok(())
}

fn store_for(settings: &Settings, output: Option<PathBuf>) -> Result<FlashcardStore> {
    let dir = match output {
        Some(dir) => dir,
        None => settings.resolve_output_dir()?,
    };
    Ok(FlashcardStore::new(dir, settings.storage_mode))
}

/// First Ctrl-C finishes the current chunk and stops; a second one exits.
fn stop_on_ctrl_c() -> StopSignal {
    let stop = StopSignal::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!(
            "{}",
            Palette::paint(
                Palette::WARNING,
                "Stopping after the current chunk. Press Ctrl-C again to quit now."
            )
        );
        signal.stop();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    stop
}

async fn handle_backend_command(
    settings: &Settings,
    set_key: Option<String>,
    clear_key: bool,
    test: bool,
) -> Result<()> {
    let mut action_taken = false;

    if let Some(key) = set_key {
        let key = if key.trim().is_empty() {
            llm::secrets::prompt_for_api_key()?
        } else {
            key
        };
        let path = llm::store_api_key(&key)?;
        println!("Stored the remote API key in {}.", path.display());
        action_taken = true;
    }

    if clear_key {
        if llm::clear_api_key()? {
            println!("Removed the stored remote API key.");
        } else {
            println!("No saved remote API key to remove.");
        }
        action_taken = true;
    }

    if test {
        let api_key = llm::resolve_api_key(&settings.backend)?;
        let backend = Backend::from_config(&settings.backend, api_key)?;
        let options = GenerationOptions::from(&settings.generation);
        backend
            .health_check(&options)
            .await
            .with_context(|| format!("{backend} did not answer"))?;
        println!(
            "{} {}",
            Palette::paint(Palette::SUCCESS, "Backend is reachable:"),
            backend
        );
        action_taken = true;
    }

    if !action_taken {
        bail!("No action provided. Use --set-key, --clear-key, or --test.");
    }
    Ok(())
}
