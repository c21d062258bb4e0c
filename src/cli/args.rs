use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kbchat")]
#[command(version)]
#[command(about = "A command-line client for the knowledge-base chatbot service", long_about = None)]
pub struct Cli {
    /// Server base URL (overrides configuration)
    #[arg(short, long, env = "KBCHAT_SERVER")]
    pub server: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session (default)
    Chat,
    /// Send a single message and print the reply
    Send {
        /// The message to send
        message: String,
    },
    /// Upload a document to the knowledge base
    Upload {
        /// Path of the file to upload
        path: PathBuf,
    },
    /// List knowledge base files
    Files,
    /// Show chat history grouped by session
    History,
    /// Log in and cache the identity locally
    Login {
        #[arg(short, long)]
        username: String,
        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Clear the cached identity and session id
    Logout,
    /// Initialize configuration
    Init,
    /// Check server reachability and login state
    Status,
    /// Show version information
    Version,
}
