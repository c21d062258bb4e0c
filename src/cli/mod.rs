pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::{build_manager, handle_command, render_file_list, render_history};
