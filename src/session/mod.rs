pub mod manager;
pub mod store;

pub use manager::{ChatTurn, FileListOutcome, HistoryOutcome, SessionManager, UploadOutcome};
pub use store::{ClientStateStore, FileStateStore, MemoryStateStore, StoreError};
