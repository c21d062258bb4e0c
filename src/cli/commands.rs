use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use colored::Colorize;
use std::io::{BufRead, Write};
use std::time::Duration;

use crate::{
    api::{ChatBackend, DocumentUpload, HttpBackend},
    app::{get_config_dir, init_config, Config},
    session::{
        ClientStateStore, FileListOutcome, FileStateStore, HistoryOutcome, SessionManager,
        UploadOutcome,
    },
};

use super::Commands;

/// Wire up the session manager from configuration: HTTP backend plus the
/// on-disk state store
pub fn build_manager(config: &Config) -> Result<SessionManager> {
    let backend = HttpBackend::new(
        &config.server.base_url,
        Duration::from_secs(config.server.timeout_secs),
    )
    .context("Failed to build the HTTP client")?;
    let store = FileStateStore::open_default().context("Failed to open the client state store")?;
    Ok(SessionManager::new(
        Box::new(backend),
        Box::new(store),
        Duration::from_millis(config.upload.recheck_delay_ms),
    ))
}

/// Handle CLI subcommands. Returns false when the caller should continue
/// into the interactive chat.
pub async fn handle_command(command: &Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Chat => Ok(false), // Continue to the chat loop
        Commands::Send { message } => {
            let mut manager = build_manager(config)?;
            match manager.send_message(message).await {
                Ok(turn) => println!("{}", turn.answer),
                Err(e) => println!("{}", e.to_string().red()),
            }
            Ok(true)
        }
        Commands::Upload { path } => {
            let mut manager = build_manager(config)?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .context("Upload path has no file name")?
                .to_string();
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            match manager.upload_file(DocumentUpload { filename, bytes }).await {
                Ok(UploadOutcome::Completed) => {
                    println!("{}", "Upload complete.".green());
                }
                Ok(UploadOutcome::Failed(reason)) => {
                    println!("{} {}", "Upload failed:".red(), reason);
                }
                Ok(UploadOutcome::Unconfirmed(reason)) => {
                    println!(
                        "{} {}",
                        "Ambiguous outcome, please verify the file list:".yellow(),
                        reason
                    );
                }
                Err(e) => println!("{}", e.to_string().red()),
            }
            Ok(true)
        }
        Commands::Files => {
            let mut manager = build_manager(config)?;
            match manager.refresh_file_list().await {
                Ok(outcome) => render_file_list(&outcome, config.ui.show_timestamps),
                Err(e) => println!("{}", e.to_string().red()),
            }
            Ok(true)
        }
        Commands::History => {
            let mut manager = build_manager(config)?;
            match manager.load_history().await {
                Ok(outcome) => render_history(&outcome, config.ui.show_timestamps),
                Err(e) => println!("{}", e.to_string().red()),
            }
            Ok(true)
        }
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p.clone(),
                None => prompt_password()?,
            };
            let mut manager = build_manager(config)?;
            match manager.login(username, &password).await {
                Ok(identity) => {
                    println!("{} {}", "Logged in as".green(), identity.username.bold());
                }
                Err(e) => println!("{}", e.to_string().red()),
            }
            Ok(true)
        }
        Commands::Logout => {
            let mut manager = build_manager(config)?;
            manager.logout()?;
            println!("Logged out, local identity and session cleared.");
            Ok(true)
        }
        Commands::Init => {
            println!("Initializing kbchat configuration...");
            init_config()?;
            println!("Configuration initialized successfully!");
            Ok(true)
        }
        Commands::Status => {
            show_status(config).await?;
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
    }
}

/// Print the file list outcome, one line per file
pub fn render_file_list(outcome: &FileListOutcome, show_timestamps: bool) {
    match outcome {
        FileListOutcome::LoggedOut => {
            println!("{}", "Please log in to see your files.".yellow());
        }
        FileListOutcome::Empty => {
            println!("No files uploaded yet.");
        }
        FileListOutcome::Files(files) => {
            for file in files {
                if show_timestamps {
                    println!(
                        "  • {} ({})",
                        file.filename.bold(),
                        format_timestamp(&file.upload_time)
                    );
                } else {
                    println!("  • {}", file.filename.bold());
                }
            }
        }
    }
}

/// Print history grouped by session, oldest session first
pub fn render_history(outcome: &HistoryOutcome, show_timestamps: bool) {
    match outcome {
        HistoryOutcome::Empty => {
            println!("No chat history yet.");
        }
        HistoryOutcome::Sessions(sessions) => {
            let mut ordered: Vec<_> = sessions.iter().collect();
            ordered.sort_by_key(|(_, entries)| entries.first().map(|e| e.created_at));

            for (session_id, entries) in ordered {
                println!("{} {}", "Session".dimmed(), session_id.dimmed());
                for entry in entries {
                    if show_timestamps {
                        println!(
                            "  {} {}  {}",
                            "you>".green().bold(),
                            entry.question,
                            format_timestamp(&entry.created_at).dimmed()
                        );
                    } else {
                        println!("  {} {}", "you>".green().bold(), entry.question);
                    }
                    println!("  {} {}", "bot>".cyan().bold(), entry.answer);
                }
                println!();
            }
        }
    }
}

// Server timestamps carry no offset; render them as-is
fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d %H:%M").to_string()
}

/// Show version information
pub fn show_version() {
    println!("kbchat v{}", env!("CARGO_PKG_VERSION"));
    println!("   A command-line client for the knowledge-base chatbot service");
}

/// Show server reachability, configuration, and login state
async fn show_status(config: &Config) -> Result<()> {
    println!("kbchat Status:");
    println!();

    let backend = HttpBackend::new(
        &config.server.base_url,
        Duration::from_secs(config.server.timeout_secs),
    )?;
    if backend.ping().await.unwrap_or(false) {
        println!("  [OK] Server: Reachable at {}", config.server.base_url);
    } else {
        println!("  [ERROR] Server: Not reachable at {}", config.server.base_url);
    }

    let config_path = get_config_dir()?.join("config.toml");
    if config_path.exists() {
        println!("  [OK] Configuration: {}", config_path.display());
    } else {
        println!("  [WARNING] Configuration: Not found (using defaults)");
    }

    let store = FileStateStore::open_default()?;
    match store.identity()? {
        Some(identity) => println!("  [OK] Identity: Logged in as {}", identity.username),
        None => println!("  [WARNING] Identity: Not logged in"),
    }
    match store.session_id()? {
        Some(session_id) => println!("  [OK] Chat session: {}", session_id),
        None => println!("  [WARNING] Chat session: None yet"),
    }

    println!();
    Ok(())
}

/// Read a password from stdin with a prompt on stderr
fn prompt_password() -> Result<String> {
    eprint!("password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
