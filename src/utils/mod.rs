pub mod errors;
pub mod logger;

pub use errors::ClientError;
pub use logger::init_logger;
