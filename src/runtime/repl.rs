use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::{render_file_list, render_history};
use crate::session::SessionManager;
use crate::utils::ClientError;

/// Interactive chat loop over stdin/stdout
pub struct ChatRepl {
    manager: SessionManager,
}

impl ChatRepl {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    /// Run until EOF or /quit
    pub async fn run(&mut self) -> Result<()> {
        match self.manager.current_identity()? {
            Some(identity) => println!(
                "{} {}",
                "Chatting as".dimmed(),
                identity.username.bold()
            ),
            None => println!(
                "{}",
                "Not logged in; run `kbchat login` first to send messages.".yellow()
            ),
        }
        println!(
            "{}",
            "Type a message, or /history, /files, /quit.".dimmed()
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", "you>".green().bold());
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break; // EOF
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line {
                "/quit" | "/exit" => break,
                "/history" => {
                    match self.manager.load_history().await {
                        Ok(outcome) => render_history(&outcome, true),
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                    continue;
                }
                "/files" => {
                    match self.manager.refresh_file_list().await {
                        Ok(outcome) => render_file_list(&outcome, true),
                        Err(e) => println!("{}", e.to_string().red()),
                    }
                    continue;
                }
                _ => {}
            }

            show_thinking()?;
            let result = self.manager.send_message(line).await;
            // Dismissed on every path, success or failure
            clear_thinking()?;

            match result {
                Ok(turn) => println!("{} {}", "bot>".cyan().bold(), turn.answer),
                Err(e @ ClientError::SessionExpired) => println!("{}", e.to_string().yellow()),
                Err(e) => println!("{}", e.to_string().red()),
            }
        }
        Ok(())
    }
}

const THINKING: &str = "thinking...";

fn show_thinking() -> Result<()> {
    print!("{}", THINKING.dimmed());
    std::io::stdout().flush()?;
    Ok(())
}

fn clear_thinking() -> Result<()> {
    print!("\r{}\r", " ".repeat(THINKING.len()));
    std::io::stdout().flush()?;
    Ok(())
}
