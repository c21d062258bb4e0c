use thiserror::Error;

use crate::session::StoreError;

/// Error taxonomy for client operations. Every variant renders as text a
/// user can act on; none of them are fatal to the session manager.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No cached identity. The operation never reached the network.
    #[error("not logged in, please log in first")]
    Unauthenticated,

    /// The server answered 401. The cached identity has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Rejected before sending.
    #[error("message is empty")]
    EmptyMessage,

    /// Another send is still in flight for this session.
    #[error("a message is already in flight, wait for the reply")]
    Busy,

    /// Any other failure status or network error. No automatic retry.
    #[error("the server could not be reached or answered with an error: {0}")]
    Transient(String),

    /// The local state file could not be read or written.
    #[error("client state storage failed: {0}")]
    Store(#[from] StoreError),
}
