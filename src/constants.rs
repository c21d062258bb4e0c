/// Constants module to avoid magic numbers in the codebase

// Network Configuration
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

// Timeouts
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const PING_TIMEOUT_SECS: u64 = 3;

// Upload disambiguation: how long to wait before re-reading the file list
// when an upload response was lost
pub const UPLOAD_RECHECK_DELAY_MS: u64 = 2000;

// Identity headers expected by the backend
pub const HEADER_USER_ID: &str = "X-User-Id";
pub const HEADER_USERNAME: &str = "X-Username";

// API routes
pub const CHAT_PATH: &str = "/api/chat";
pub const PING_PATH: &str = "/api/chat/ping";
pub const UPLOAD_PATH: &str = "/api/knowledge/upload";
pub const FILES_PATH: &str = "/api/knowledge/files";
pub const LOGIN_PATH: &str = "/api/auth/login";
