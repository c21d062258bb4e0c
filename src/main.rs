use anyhow::Result;
use clap::Parser;

use kbchat::{
    app::load_config,
    cli::{build_manager, handle_command, Cli, Commands},
    runtime::ChatRepl,
    utils::init_logger,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logger(cli.verbose);

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        let toml_str = std::fs::read_to_string(config_path)?;
        toml::from_str(&toml_str)?
    } else {
        load_config().unwrap_or_default()
    };

    // CLI server flag wins over every configured source
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }

    // Honor the configured color switch before anything prints
    if !config.ui.color {
        colored::control::set_override(false);
    }

    let command = cli.command.clone().unwrap_or(Commands::Chat);
    if handle_command(&command, &config).await? {
        return Ok(());
    }

    // Interactive chat
    let manager = build_manager(&config)?;
    ChatRepl::new(manager).run().await
}
