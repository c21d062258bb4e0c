pub mod client;
pub mod types;

pub use client::{ApiError, ChatBackend, HttpBackend};
pub use types::{
    ChatReply, ChatRequest, DocumentUpload, FileRecord, HistoryEntry, HistoryMap, LoginReply,
    LoginRequest, UserIdentity,
};

#[cfg(test)]
pub use client::MockChatBackend;
