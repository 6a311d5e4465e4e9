//! library-chat - terminal client for the library's admin/member chat
//!
//! Talks to the chat server's WebSocket channel for live messages and to
//! its REST API for history, read receipts and attachments.

mod api;
mod config;
mod conversation;
mod error;
mod models;
mod transport;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use conversation::attachments::Disposition;
use conversation::grouping::message_line;
use conversation::{ConversationController, ConversationEvent, HistoryLoad};
use models::{ChatMessage, Participant, UserType};

#[derive(Parser)]
#[command(name = "library-chat")]
#[command(about = "Chat between library admins and members", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Who is acting.
#[derive(Args)]
struct Identity {
    /// Role: admin or member
    #[arg(long = "as", value_name = "ROLE")]
    role: UserType,

    /// Your user id
    #[arg(long)]
    id: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an interactive conversation
    Chat {
        #[command(flatten)]
        identity: Identity,

        /// Your display name
        #[arg(long, default_value = "")]
        name: String,

        /// Counterpart user id (always of the other role)
        #[arg(long = "with", value_name = "ID")]
        with: String,

        /// Counterpart display name
        #[arg(long = "with-name", default_value = "")]
        with_name: String,
    },

    /// Print the conversation with a counterpart
    History {
        #[command(flatten)]
        identity: Identity,

        /// Counterpart user id
        #[arg(long = "with", value_name = "ID")]
        with: String,
    },

    /// Mark a counterpart's messages to you as read
    MarkRead {
        #[command(flatten)]
        identity: Identity,

        /// Sender whose messages to mark
        #[arg(long, value_name = "ID")]
        from: String,
    },

    /// Upload a file
    Upload {
        path: PathBuf,

        #[command(flatten)]
        identity: Identity,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Download a file by id
    Download {
        file_id: i64,

        /// Output path (defaults to the original file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show metadata for a file
    FileInfo { file_id: i64 },

    /// List uploaded files
    Files {
        /// Only files uploaded by this user id
        #[arg(long, requires = "uploader_type")]
        uploader: Option<String>,

        /// Role of --uploader
        #[arg(long, requires = "uploader")]
        uploader_type: Option<UserType>,
    },

    /// Delete a file by id
    DeleteFile { file_id: i64 },

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_from(&config_path)?;

    match cli.command {
        Commands::Chat {
            identity,
            name,
            with,
            with_name,
        } => {
            let me = Participant::new(identity.id, name, identity.role);
            let counterpart = Participant::new(with, with_name, identity.role.opposite());
            run_chat(&config, me, counterpart).await?;
        }
        Commands::History { identity, with } => {
            api::show_history(
                &config,
                &identity.id,
                identity.role,
                &with,
                identity.role.opposite(),
            )
            .await?;
        }
        Commands::MarkRead { identity, from } => {
            api::mark_read(
                &config,
                &identity.id,
                identity.role,
                &from,
                identity.role.opposite(),
            )
            .await?;
        }
        Commands::Upload {
            path,
            identity,
            description,
        } => {
            tracing::info!("Uploading {}...", path.display());
            api::upload(
                &config,
                &path,
                &identity.id,
                identity.role,
                description.as_deref(),
            )
            .await?;
        }
        Commands::Download { file_id, output } => {
            api::download(&config, file_id, output.as_deref()).await?;
        }
        Commands::FileInfo { file_id } => {
            api::file_info(&config, file_id).await?;
        }
        Commands::Files {
            uploader,
            uploader_type,
        } => {
            let filter = uploader.as_deref().zip(uploader_type);
            api::list_files(&config, filter).await?;
        }
        Commands::DeleteFile { file_id } => {
            api::delete_file(&config, file_id).await?;
        }
        Commands::Config { init } => {
            show_config(&config, &config_path, init)?;
        }
    }

    Ok(())
}

fn print_message(msg: &ChatMessage) {
    println!("{}", message_line(msg));
}

fn show_config(config: &Config, path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            config.save_to(path)?;
            println!("Wrote default config to {}", path.display());
        }
    }

    println!("Config file:  {}", path.display());
    println!("API base URL: {}", config.server.api_base_url);
    println!("Chat channel: {}", config.server.ws_url);
    println!(
        "Token:        {}",
        if config.server.bearer_token.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!(
        "Reconnect:    {}ms base, {}ms cap, {} attempts",
        config.reconnect.base_delay_ms, config.reconnect.max_delay_ms, config.reconnect.max_attempts
    );
    Ok(())
}

/// Interactive session: live messages in, stdin lines out.
async fn run_chat(config: &Config, me: Participant, counterpart: Participant) -> Result<()> {
    let ctl = ConversationController::from_config(config, me);
    let mut events = ctl.subscribe();

    if let Err(e) = ctl.initialize().await {
        tracing::warn!("{}; retrying in the background", e);
    }

    match ctl.select_counterpart(counterpart.clone()).await {
        Ok(HistoryLoad::Stale) => {}
        Ok(HistoryLoad::Loaded(count)) => {
            tracing::debug!("Loaded {} messages", count);
            let today = Local::now().date_naive();
            for group in ctl.grouped_messages(today) {
                println!("\n[{}]", group.label);
                for msg in &group.messages {
                    print_message(msg);
                }
            }
        }
        Err(e) => tracing::warn!("Could not load history: {}", e),
    }

    println!(
        "\nChatting with {} {}. Commands: /file PATH [description], /files, /open FILE_ID, /status, /reconnect, /quit",
        counterpart.user_type, counterpart.id
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if !handle_input(&ctl, line.trim()).await {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(ConversationEvent::Appended(msg)) if msg.involves(&counterpart) => {
                    print_message(&msg);
                }
                Ok(ConversationEvent::Connection(up)) => {
                    println!("* {}", if up { "connected" } else { "disconnected" });
                }
                Ok(ConversationEvent::Reconciled(msg)) => {
                    tracing::debug!("Message {:?} confirmed by server", msg.id);
                }
                Ok(ConversationEvent::HistoryLoaded { counterpart: cp, count }) => {
                    tracing::debug!("History with {} loaded ({} messages)", cp.id, count);
                }
                Ok(ConversationEvent::Appended(_)) => {}
                Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    ctl.dispose();
    Ok(())
}

/// Returns false when the user asked to leave.
async fn handle_input(ctl: &ConversationController, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }

    if line == "/quit" {
        return false;
    }

    if line == "/reconnect" {
        if let Err(e) = ctl.reconnect().await {
            eprintln!("! {}", e);
        }
        return true;
    }

    if line == "/status" {
        print_status(ctl);
        return true;
    }

    if line == "/files" {
        list_attachments(ctl).await;
        return true;
    }

    if let Some(id) = line.strip_prefix("/open ") {
        match id.trim().parse::<i64>() {
            Ok(file_id) => {
                if let Err(e) = open_file(ctl, file_id).await {
                    eprintln!("! {:#}", e);
                }
            }
            Err(_) => eprintln!("! Usage: /open FILE_ID"),
        }
        return true;
    }

    if let Some(rest) = line.strip_prefix("/file ") {
        let (path, description) = match rest.trim().split_once(' ') {
            Some((path, desc)) => (path, Some(desc.trim())),
            None => (rest.trim(), None),
        };
        if let Err(e) = send_file(ctl, Path::new(path), description).await {
            eprintln!("! {:#}", e);
        }
        return true;
    }

    if let Err(e) = ctl.send_text(line) {
        eprintln!("! Not sent: {}", e);
    }
    true
}

async fn send_file(
    ctl: &ConversationController,
    path: &Path,
    description: Option<&str>,
) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Path has no file name")?;
    let msg = ctl
        .send_file(file_name, &data, description)
        .await
        .context("Failed to send file")?;
    tracing::debug!("Sent file message for file {:?}", msg.file_id);
    Ok(())
}

fn print_status(ctl: &ConversationController) {
    let me = ctl.me();
    println!("You:        {} {} ({:?} sends)", me.user_type, me.id, ctl.send_mode());
    if let Some(cp) = ctl.counterpart() {
        println!("With:       {} {}", cp.user_type, cp.id);
    }
    println!(
        "State:      {:?}{}",
        ctl.view_state(),
        if ctl.is_loading() { ", loading history" } else { "" }
    );
    println!("Connected:  {}", ctl.is_connected());
    println!("Messages:   {}", ctl.messages().len());
    println!("File cache: {} entries", ctl.cached_file_count());
}

/// Attachments referenced in the visible conversation.
async fn list_attachments(ctl: &ConversationController) {
    let mut found = 0;
    for msg in ctl.messages() {
        if msg.file_id.is_none() && !msg.message.starts_with('📎') {
            continue;
        }
        match ctl.resolve_attachment(&msg).await {
            Some(file) => {
                found += 1;
                println!(
                    "{:>6}  {:<32} {:>10}  {}",
                    file.id,
                    file.original_file_name,
                    api::format_file_size(file.file_size),
                    file.kind().label()
                );
            }
            None => println!("     ?  {} (unavailable)", msg.message),
        }
    }
    if found == 0 {
        println!("  (no attachments)");
    }
}

async fn open_file(ctl: &ConversationController, file_id: i64) -> Result<()> {
    let file = ctl
        .file_info(file_id)
        .await
        .with_context(|| format!("File {} is unavailable", file_id))?;
    let opened = ctl.open_file(&file).await.context("Download failed")?;

    let target = Path::new(&opened.file.original_file_name)
        .file_name()
        .map(PathBuf::from)
        .context("File has no usable name")?;
    tokio::fs::write(&target, &opened.bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    let action = match opened.disposition {
        Disposition::Preview => "open it in a viewer to preview",
        Disposition::Download => "saved for download",
    };
    println!("Saved {} ({})", target.display(), action);
    Ok(())
}
