use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ripple_chat::chat::{ChatEngine, ChatEvent, ChatStore};
use ripple_chat::config::Config;
use ripple_chat::core::{ChatError, ChatMessage};
use ripple_chat::history::{ChatHistory, FileHistory};
use ripple_chat::llm::HttpTransport;

#[derive(Parser)]
#[command(name = "ripple")]
#[command(author, about = "Streaming chat client for an AI coding assistant daemon", long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), env!("RIPPLE_VERSION_SUFFIX")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant (interactive unless a message is given)
    Chat {
        /// One-shot message; omit for an interactive session
        message: Option<String>,

        /// Model to request (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Daemon base URL (overrides config)
        #[arg(long)]
        url: Option<String>,

        /// Saved-chats directory (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Inspect saved chats
    History {
        #[command(subcommand)]
        command: HistoryCommands,

        /// Saved-chats directory (overrides config)
        #[arg(long, global = true)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List saved chats, most recently updated first
    List,
    /// Print one saved chat
    Show { id: String },
    /// Delete one saved chat
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load()?;

    match cli.command {
        Commands::Chat {
            message,
            model,
            url,
            dir,
        } => run_chat(config, message, model, url, dir).await,
        Commands::History { command, dir } => run_history(config, command, dir),
    }
}

fn open_history(config: &Config, dir: Option<PathBuf>) -> Result<FileHistory> {
    let root = dir
        .or_else(|| config.history.dir.clone())
        .unwrap_or_else(FileHistory::default_root);
    FileHistory::new(root).context("Failed to open chat history")
}

async fn run_chat(
    config: Config,
    message: Option<String>,
    model: Option<String>,
    url: Option<String>,
    dir: Option<PathBuf>,
) -> Result<()> {
    let base_url = url.unwrap_or_else(|| config.server.base_url.clone());
    let history = Arc::new(open_history(&config, dir)?);
    let transport = Arc::new(HttpTransport::new(base_url));
    let store = Arc::new(ChatStore::new());

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = ChatEngine::new(store.clone(), transport, history)
        .with_events(events_tx)
        .with_max_auto_continuations(config.chat.max_auto_continuations);

    engine.set_use_tools(config.chat.use_tools);
    engine.set_system_prompt(config.chat.system_prompt.clone());
    if let Some(model) = model.or_else(|| {
        if config.chat.model.is_empty() {
            None
        } else {
            Some(config.chat.model.clone())
        }
    }) {
        engine.set_model(model);
    }

    let printer = tokio::spawn(print_events(events_rx, store.clone()));

    if let Some(message) = message {
        submit_and_report(&engine, &message).await;
    } else {
        run_repl(&engine).await?;
    }

    drop(engine);
    let _ = printer.await;
    Ok(())
}

async fn run_repl(engine: &ChatEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    eprintln!("Interactive chat. Empty line or Ctrl-D to quit, /new for a fresh thread, /resume after an error.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        match line.as_str() {
            "" => break,
            "/new" => {
                engine.new_chat();
                eprintln!("(started a new thread)");
            }
            "/resume" => {
                engine.enable_send();
                eprintln!("(sending re-enabled)");
            }
            _ => submit_and_report(engine, &line).await,
        }
    }
    Ok(())
}

async fn submit_and_report(engine: &ChatEngine, message: &str) {
    match engine.submit(message).await {
        Ok(()) => {}
        Err(ChatError::SendBlocked) => {
            eprintln!("The last turn failed; type /resume to enable sending again.");
        }
        Err(err) => eprintln!("error: {}", err),
    }
}

/// Mirror engine events onto the terminal, streaming assistant text as it
/// is merged into the thread
async fn print_events(
    mut events: tokio::sync::mpsc::UnboundedReceiver<ChatEvent>,
    store: Arc<ChatStore>,
) {
    // byte offset of assistant content already printed for the current turn
    let mut printed = 0usize;

    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::QuestionAsked { .. } => {
                printed = 0;
            }
            ChatEvent::ResponseMerged { thread_id } => {
                if store.thread_id() != thread_id {
                    continue;
                }
                if let Some(ChatMessage::Assistant { content, .. }) = store.messages().last() {
                    if let Some(fresh) = content.get(printed..) {
                        print!("{}", fresh);
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                    }
                    printed = content.len();
                }
            }
            ChatEvent::StreamDone { .. } => {
                println!();
            }
            ChatEvent::StreamError { message, .. } => {
                eprintln!("\nstream error: {}", message);
            }
            ChatEvent::ToolCallsPending { calls, .. } => {
                for call in &calls {
                    eprintln!("(model requested tool `{}`)", call.function.name);
                }
            }
            ChatEvent::ThreadReplaced { .. } => {
                printed = 0;
            }
        }
    }
}

fn run_history(config: Config, command: HistoryCommands, dir: Option<PathBuf>) -> Result<()> {
    let history = open_history(&config, dir)?;
    match command {
        HistoryCommands::List => {
            let threads = history.list()?;
            if threads.is_empty() {
                println!("no saved chats");
                return Ok(());
            }
            for thread in threads {
                let updated = thread
                    .updated_at
                    .or(thread.created_at)
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let title = if thread.title.is_empty() {
                    first_user_line(&thread.messages).unwrap_or_else(|| "(untitled)".to_string())
                } else {
                    thread.title.clone()
                };
                println!(
                    "{}  {}  {} messages  {}",
                    thread.id,
                    updated,
                    thread.messages.len(),
                    title
                );
            }
        }
        HistoryCommands::Show { id } => {
            let thread = history.restore_chat(&id)?;
            for message in &thread.messages {
                match message {
                    ChatMessage::System { content } => println!("[system] {}", content),
                    ChatMessage::User { content } => println!("[user] {}", content),
                    ChatMessage::Assistant { content, tool_calls } => {
                        println!("[assistant] {}", content);
                        if let Some(calls) = tool_calls {
                            for call in calls {
                                println!("  -> {}({})", call.function.name, call.function.arguments);
                            }
                        }
                    }
                    ChatMessage::Tool {
                        content,
                        tool_call_id,
                    } => println!("[tool {}] {}", tool_call_id, content),
                    ChatMessage::ContextFile { content } => {
                        for file in content {
                            println!("[context] {}:{}-{}", file.file_name, file.line1, file.line2);
                        }
                    }
                }
            }
        }
        HistoryCommands::Remove { id } => {
            history.remove(&id)?;
            println!("removed {}", id);
        }
    }
    Ok(())
}

fn first_user_line(messages: &[ChatMessage]) -> Option<String> {
    messages.iter().find_map(|message| match message {
        ChatMessage::User { content } => Some(content.lines().next().unwrap_or("").to_string()),
        _ => None,
    })
}
