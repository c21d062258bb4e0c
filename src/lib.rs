pub mod api;
pub mod app;
pub mod cli;
pub mod constants;
pub mod runtime;
pub mod session;
pub mod utils;

pub use api::{ChatBackend, HttpBackend};
pub use app::{load_config, Config};
pub use runtime::ChatRepl;
pub use session::{ClientStateStore, FileStateStore, SessionManager};
pub use utils::ClientError;
