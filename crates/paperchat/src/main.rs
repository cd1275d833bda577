use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{LevelFilter, debug, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use paperchat::config::Config;
use paperchat::docstore::DocStoreClient;
use paperchat::session::{ChatSession, Role, SessionStatus, SessionUpdate};

#[derive(Debug, Parser)]
#[command(
    name = "paperchat",
    about = "Streaming client for a document question-answering service",
    version
)]
struct Cli {
    /// Config file path
    #[arg(short, long, env = "PAPERCHAT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// WebSocket endpoint of the answer service
    #[arg(long, env = "PAPERCHAT_CHAT_URL", global = true)]
    chat_url: Option<String>,

    /// Base URL of the document store
    #[arg(long, env = "PAPERCHAT_DOCSTORE_URL", global = true)]
    docstore_url: Option<String>,

    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Reduce output to only errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat session (default)
    Chat,
    /// Manage stored documents
    Docs {
        #[command(subcommand)]
        command: DocsCommand,
    },
    /// Check that the document store is reachable
    Health,
}

#[derive(Debug, Subcommand)]
enum DocsCommand {
    /// List stored documents
    List,
    /// Upload a PDF document
    Upload {
        /// Path to the PDF file
        path: PathBuf,
    },
    /// Download a document
    Download {
        /// Document filename in the store
        filename: String,
        /// Directory to write the file into (default: current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a document
    Delete {
        /// Document filename in the store
        filename: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.quiet, cli.verbose);
    let config = load_config(&cli)?;
    debug!("resolved config: {config:?}");

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(&config).await,
        Command::Docs { command } => run_docs(&config, command).await,
        Command::Health => run_health(&config).await,
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path).with_context(|| format!("loading config from {}", path.display()))?
    } else {
        match Config::default_path() {
            Some(path) if path.exists() => Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            _ => Config::default(),
        }
    };

    if let Some(url) = &cli.chat_url {
        config.chat_url = url.clone();
    }
    if let Some(url) = &cli.docstore_url {
        config.docstore_url = url.clone();
    }
    Ok(config)
}

async fn run_chat(config: &Config) -> Result<()> {
    let docstore = DocStoreClient::new(&config.docstore_url)?;
    let mut session = ChatSession::from_config(config);
    let updates = session.subscribe();
    let renderer = tokio::spawn(render_updates(updates));

    println!("paperchat: ask about your documents ('/help' for commands, '-q' to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.eq_ignore_ascii_case("-q") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            handle_chat_command(&docstore, &mut session, command).await;
        } else if let Err(e) = session.run(&line).await {
            // terminal failures are rendered from the update stream; this
            // only catches pre-send rejections
            debug!("query not accepted: {e}");
        }

        // let the renderer drain before the next prompt
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    renderer.abort();
    println!("bye");
    Ok(())
}

/// Document shortcuts available inside the chat loop. Outcomes land in the
/// transcript as info notices, like the original sidebar actions.
async fn handle_chat_command(docstore: &DocStoreClient, session: &mut ChatSession, command: &str) {
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("help"), _) => {
            println!("  /docs              list stored documents");
            println!("  /upload <path>     upload a PDF document");
            println!("  /delete <filename> delete a document");
        }
        (Some("docs"), _) => match docstore.list().await {
            Ok(documents) if documents.is_empty() => println!("  no documents"),
            Ok(documents) => {
                for doc in documents {
                    println!("  {:<40} {:>12}  {}", doc.filename, doc.size, doc.upload_time);
                }
            }
            Err(e) => eprintln!("error: {e}"),
        },
        (Some("upload"), Some(path)) => {
            let path = PathBuf::from(path);
            let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
                eprintln!("error: invalid file name: {}", path.display());
                return;
            };
            match tokio::fs::read(&path).await {
                Ok(content) => match docstore.upload(filename, content).await {
                    Ok(receipt) => session.note(&format!(
                        "document \"{}\" uploaded ({} bytes)",
                        receipt.filename, receipt.size
                    )),
                    Err(e) => eprintln!("error: {e}"),
                },
                Err(e) => eprintln!("error: reading {}: {e}", path.display()),
            }
        }
        (Some("delete"), Some(filename)) => match docstore.delete(filename).await {
            Ok(()) => session.note(&format!("document \"{filename}\" deleted")),
            Err(e) => eprintln!("error: {e}"),
        },
        _ => eprintln!("unknown command, try /help"),
    }
}

async fn render_updates(mut updates: broadcast::Receiver<SessionUpdate>) {
    loop {
        match updates.recv().await {
            Ok(SessionUpdate::TurnAppended(turn)) => {
                if turn.role == Role::Info {
                    println!("  · {}", turn.text);
                }
            }
            Ok(SessionUpdate::AssistantDelta { delta, .. }) => {
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            Ok(SessionUpdate::StatusChanged(SessionStatus::Idle)) => println!(),
            Ok(SessionUpdate::StatusChanged(SessionStatus::Failed(reason))) => {
                println!();
                eprintln!("error: {reason}");
            }
            Ok(SessionUpdate::StatusChanged(SessionStatus::Awaiting)) => {}
            Ok(SessionUpdate::StagesChanged(_)) => {}
            Ok(SessionUpdate::ProtocolWarning(message)) => warn!("{message}"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("renderer lagged, {skipped} updates dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_docs(config: &Config, command: DocsCommand) -> Result<()> {
    let client = DocStoreClient::new(&config.docstore_url)?;

    match command {
        DocsCommand::List => {
            let documents = client.list().await?;
            if documents.is_empty() {
                println!("no documents");
                return Ok(());
            }
            for doc in documents {
                println!("{:<40} {:>12}  {}", doc.filename, doc.size, doc.upload_time);
            }
        }
        DocsCommand::Upload { path } => {
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("invalid file name: {}", path.display()))?
                .to_string();
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let receipt = client.upload(&filename, content).await?;
            println!("uploaded {} ({} bytes)", receipt.filename, receipt.size);
        }
        DocsCommand::Download { filename, out } => {
            let content = client.fetch(&filename).await?;
            let target = out.unwrap_or_else(|| PathBuf::from(".")).join(&filename);
            tokio::fs::write(&target, &content)
                .await
                .with_context(|| format!("writing {}", target.display()))?;
            println!("downloaded {} to {}", filename, target.display());
        }
        DocsCommand::Delete { filename } => {
            client.delete(&filename).await?;
            println!("deleted {filename}");
        }
    }
    Ok(())
}

async fn run_health(config: &Config) -> Result<()> {
    let client = DocStoreClient::new(&config.docstore_url)?;
    if client.health().await? {
        println!("document store at {} is healthy", config.docstore_url);
        Ok(())
    } else {
        anyhow::bail!("document store at {} is not healthy", config.docstore_url)
    }
}
