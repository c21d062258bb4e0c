use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::ClientStateStore;
use crate::api::{
    ApiError, ChatBackend, ChatRequest, DocumentUpload, FileRecord, HistoryMap, UserIdentity,
};
use crate::utils::ClientError;

/// Outcome of an upload attempt. When the response is lost, the manager
/// resolves the ambiguity by re-reading the file list instead of trusting
/// a response contract the endpoint does not honor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server acknowledged the upload, or the re-check found the file
    Completed,
    /// The re-check was readable and the file is not there
    Failed(String),
    /// The re-check itself failed; ambiguous outcome, please verify
    Unconfirmed(String),
}

/// Result of a history fetch, keeping "nothing yet" distinct from failure
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    Empty,
    Sessions(HistoryMap),
}

/// Result of a file list refresh
#[derive(Debug, Clone, PartialEq)]
pub enum FileListOutcome {
    /// No cached identity; no network call was made
    LoggedOut,
    Empty,
    Files(Vec<FileRecord>),
}

/// A completed question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub session_id: String,
}

/// Owns the client side of a conversation: the persisted session id, the
/// cached identity, and the mapping of every operation's failure onto the
/// user-facing error taxonomy.
pub struct SessionManager {
    backend: Box<dyn ChatBackend>,
    store: Box<dyn ClientStateStore>,
    recheck_delay: Duration,
    in_flight: Arc<AtomicBool>,
}

/// Releases the in-flight flag on drop, so the guard is cleared on every
/// exit path including a send future dropped before completion
struct SendPermit(Arc<AtomicBool>);

impl Drop for SendPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionManager {
    pub fn new(
        backend: Box<dyn ChatBackend>,
        store: Box<dyn ClientStateStore>,
        recheck_delay: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            recheck_delay,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolve the session id, generating and persisting a fresh UUID when
    /// none is stored yet. Idempotent until the server overrides it.
    pub fn ensure_session_id(&mut self) -> Result<String, ClientError> {
        if let Some(id) = self.store.session_id()? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.store.set_session_id(&id)?;
        info!(session_id = %id, "generated new chat session id");
        Ok(id)
    }

    /// The cached identity, if any
    pub fn current_identity(&self) -> Result<Option<UserIdentity>, ClientError> {
        Ok(self.store.identity()?)
    }

    /// Exchange credentials for an identity and cache it. A previous
    /// user's session id is dropped so conversations don't cross accounts.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<UserIdentity, ClientError> {
        let identity = self
            .backend
            .login(username, password)
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;
        self.store.clear_session_id()?;
        self.store.set_identity(&identity)?;
        info!(username = %identity.username, "logged in");
        Ok(identity)
    }

    /// Clear the cached identity and session id
    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.store.clear_identity()?;
        self.store.clear_session_id()?;
        Ok(())
    }

    /// Submit a question. The input is trimmed; empty input and missing
    /// identity are rejected before any network traffic, and only one send
    /// may be in flight at a time.
    pub async fn send_message(&mut self, text: &str) -> Result<ChatTurn, ClientError> {
        let question = text.trim().to_string();
        if question.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let identity = self.require_identity()?;
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Busy);
        }
        let _permit = SendPermit(Arc::clone(&self.in_flight));

        self.send_inner(&identity, &question).await
    }

    async fn send_inner(
        &mut self,
        identity: &UserIdentity,
        question: &str,
    ) -> Result<ChatTurn, ClientError> {
        let session_id = self.ensure_session_id()?;
        let request = ChatRequest {
            question: question.to_string(),
            session_id: session_id.clone(),
        };
        debug!(%session_id, "sending chat message");

        let reply = match self.backend.send_chat(identity, &request).await {
            Ok(reply) => reply,
            Err(err) => return Err(self.expire_or_transient(err)),
        };

        // The server is authoritative over session identity once it issues
        // one; the replacement is persisted before this call returns so a
        // stale id can never reach a later send.
        let session_id = match reply.session_id {
            Some(new_id) if new_id != session_id => {
                self.store.set_session_id(&new_id)?;
                info!(session_id = %new_id, "server issued a new session id");
                new_id
            }
            Some(unchanged) => unchanged,
            None => session_id,
        };

        Ok(ChatTurn {
            question: question.to_string(),
            answer: reply.answer,
            session_id,
        })
    }

    /// Fetch the session -> messages mapping for the cached user
    pub async fn load_history(&mut self) -> Result<HistoryOutcome, ClientError> {
        let identity = self.require_identity()?;
        match self.backend.fetch_history(&identity).await {
            Ok(map) if map.is_empty() => Ok(HistoryOutcome::Empty),
            Ok(map) => Ok(HistoryOutcome::Sessions(map)),
            Err(err) => Err(self.expire_or_transient(err)),
        }
    }

    /// Upload a document. A lost response is disambiguated by re-reading
    /// the file list after a short delay. The re-check is a heuristic: a
    /// file visible under the same name may predate this upload.
    pub async fn upload_file(
        &mut self,
        document: DocumentUpload,
    ) -> Result<UploadOutcome, ClientError> {
        let identity = self.require_identity()?;
        let err = match self.backend.upload_document(&identity, &document).await {
            Ok(()) => return Ok(UploadOutcome::Completed),
            Err(ApiError::Unauthorized) => {
                return Err(self.expire_or_transient(ApiError::Unauthorized))
            }
            Err(err) => err,
        };

        warn!("upload was not acknowledged, re-checking the file list: {err}");
        tokio::time::sleep(self.recheck_delay).await;

        match self.backend.list_documents(&identity).await {
            Ok(files) if files.iter().any(|f| f.filename == document.filename) => {
                Ok(UploadOutcome::Completed)
            }
            Ok(_) => Ok(UploadOutcome::Failed(err.to_string())),
            Err(recheck_err) => Ok(UploadOutcome::Unconfirmed(format!(
                "upload failed with '{err}' and the follow-up list failed with '{recheck_err}'"
            ))),
        }
    }

    /// Fetch the current file list. Unauthenticated callers get a local
    /// placeholder outcome without any network call.
    pub async fn refresh_file_list(&mut self) -> Result<FileListOutcome, ClientError> {
        let Some(identity) = self.store.identity()? else {
            return Ok(FileListOutcome::LoggedOut);
        };
        match self.backend.list_documents(&identity).await {
            Ok(files) if files.is_empty() => Ok(FileListOutcome::Empty),
            Ok(files) => Ok(FileListOutcome::Files(files)),
            Err(err) => Err(self.expire_or_transient(err)),
        }
    }

    fn require_identity(&self) -> Result<UserIdentity, ClientError> {
        self.store.identity()?.ok_or(ClientError::Unauthenticated)
    }

    /// 401 means the server-side session is gone: drop the cached identity
    /// and report it distinctly from a transient failure
    fn expire_or_transient(&mut self, err: ApiError) -> ClientError {
        match err {
            ApiError::Unauthorized => {
                if let Err(store_err) = self.store.clear_identity() {
                    warn!("failed to clear cached identity: {store_err}");
                }
                ClientError::SessionExpired
            }
            other => ClientError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ChatReply, MockChatBackend};
    use crate::session::store::MemoryStateStore;
    use chrono::Utc;

    fn identity() -> UserIdentity {
        UserIdentity {
            user_id: "7".to_string(),
            username: "alice".to_string(),
        }
    }

    fn manager(backend: MockChatBackend, store: MemoryStateStore) -> SessionManager {
        SessionManager::new(Box::new(backend), Box::new(store), Duration::from_millis(1))
    }

    fn file_record(filename: &str) -> FileRecord {
        FileRecord {
            filename: filename.to_string(),
            upload_time: Utc::now().naive_utc(),
            user_id: 7,
        }
    }

    #[test]
    fn ensure_session_id_generates_once_and_persists() {
        let mut manager = manager(MockChatBackend::new(), MemoryStateStore::default());

        let first = manager.ensure_session_id().unwrap();
        assert!(Uuid::parse_str(&first).is_ok());

        let second = manager.ensure_session_id().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn send_trims_input_and_adopts_the_server_session_id() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_send_chat()
            .withf(|_, request| request.question == "Hello")
            .times(1)
            .returning(|_, _| {
                Ok(ChatReply {
                    answer: "Hi there".to_string(),
                    session_id: Some("abc-123".to_string()),
                })
            });
        backend
            .expect_send_chat()
            .withf(|_, request| request.session_id == "abc-123")
            .times(1)
            .returning(|_, _| {
                Ok(ChatReply {
                    answer: "Again".to_string(),
                    session_id: None,
                })
            });

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));

        let turn = manager.send_message("  Hello  ").await.unwrap();
        assert_eq!(turn.question, "Hello");
        assert_eq!(turn.answer, "Hi there");
        assert_eq!(turn.session_id, "abc-123");
        // The replacement is persisted, not just returned
        assert_eq!(manager.ensure_session_id().unwrap(), "abc-123");

        let turn = manager.send_message("again").await.unwrap();
        assert_eq!(turn.session_id, "abc-123");
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_sending() {
        // No expectations: any backend call would panic the mock
        let mut manager = manager(
            MockChatBackend::new(),
            MemoryStateStore::with_identity(identity()),
        );
        assert!(matches!(
            manager.send_message("   ").await,
            Err(ClientError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn unauthenticated_send_never_touches_the_network() {
        let mut manager = manager(MockChatBackend::new(), MemoryStateStore::default());
        assert!(matches!(
            manager.send_message("hello").await,
            Err(ClientError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn overlapping_sends_are_rejected() {
        let mut manager = manager(
            MockChatBackend::new(),
            MemoryStateStore::with_identity(identity()),
        );
        manager.in_flight.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.send_message("hello").await,
            Err(ClientError::Busy)
        ));
    }

    /// Backend whose first send never resolves; later sends answer normally
    struct StallingBackend {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChatBackend for StallingBackend {
        async fn send_chat(
            &self,
            _identity: &UserIdentity,
            _request: &ChatRequest,
        ) -> Result<ChatReply, ApiError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                futures::future::pending::<()>().await;
            }
            Ok(ChatReply {
                answer: "late".to_string(),
                session_id: None,
            })
        }

        async fn upload_document(
            &self,
            _identity: &UserIdentity,
            _document: &DocumentUpload,
        ) -> Result<(), ApiError> {
            unreachable!()
        }

        async fn list_documents(
            &self,
            _identity: &UserIdentity,
        ) -> Result<Vec<FileRecord>, ApiError> {
            unreachable!()
        }

        async fn fetch_history(&self, _identity: &UserIdentity) -> Result<HistoryMap, ApiError> {
            unreachable!()
        }

        async fn login(&self, _username: &str, _password: &str) -> Result<UserIdentity, ApiError> {
            unreachable!()
        }

        async fn ping(&self) -> Result<bool, ApiError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn dropped_send_future_releases_the_in_flight_guard() {
        use futures::FutureExt;

        let backend = StallingBackend {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let mut manager = SessionManager::new(
            Box::new(backend),
            Box::new(MemoryStateStore::with_identity(identity())),
            Duration::from_millis(1),
        );

        // First send stalls at the backend; polling once and dropping the
        // future simulates a caller abandoning it mid-flight
        assert!(manager.send_message("hello").now_or_never().is_none());

        // The guard was released on drop, so the next send goes through
        let turn = manager.send_message("hello").await.unwrap();
        assert_eq!(turn.answer, "late");
    }

    #[tokio::test]
    async fn unauthorized_send_expires_the_session_and_clears_identity() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_send_chat()
            .times(1)
            .returning(|_, _| Err(ApiError::Unauthorized));

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));

        assert!(matches!(
            manager.send_message("hello").await,
            Err(ClientError::SessionExpired)
        ));
        assert_eq!(manager.current_identity().unwrap(), None);

        // The in-flight guard is released after the failure
        assert!(matches!(
            manager.send_message("hello").await,
            Err(ClientError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn server_failure_is_reported_as_transient_not_expired() {
        let mut backend = MockChatBackend::new();
        backend.expect_send_chat().times(1).returning(|_, _| {
            Err(ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        });

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));

        assert!(matches!(
            manager.send_message("hello").await,
            Err(ClientError::Transient(_))
        ));
        // Identity survives a transient failure
        assert_eq!(manager.current_identity().unwrap(), Some(identity()));
    }

    #[tokio::test]
    async fn acknowledged_upload_is_completed() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_upload_document()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));
        let outcome = manager
            .upload_file(DocumentUpload {
                filename: "notes.txt".to_string(),
                bytes: b"hello".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Completed);
    }

    #[tokio::test]
    async fn lost_upload_confirmed_by_recheck_is_completed() {
        let mut backend = MockChatBackend::new();
        backend.expect_upload_document().times(1).returning(|_, _| {
            Err(ApiError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            })
        });
        backend
            .expect_list_documents()
            .times(1)
            .returning(|_| Ok(vec![file_record("notes.txt")]));

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));
        let outcome = manager
            .upload_file(DocumentUpload {
                filename: "notes.txt".to_string(),
                bytes: b"hello".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Completed);
    }

    #[tokio::test]
    async fn lost_upload_absent_from_recheck_is_failed() {
        let mut backend = MockChatBackend::new();
        backend.expect_upload_document().times(1).returning(|_, _| {
            Err(ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        });
        backend
            .expect_list_documents()
            .times(1)
            .returning(|_| Ok(vec![file_record("other.txt")]));

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));
        let outcome = manager
            .upload_file(DocumentUpload {
                filename: "notes.txt".to_string(),
                bytes: b"hello".to_vec(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, UploadOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn lost_upload_with_failing_recheck_is_unconfirmed_never_success() {
        let mut backend = MockChatBackend::new();
        backend.expect_upload_document().times(1).returning(|_, _| {
            Err(ApiError::Status {
                status: 0,
                body: "connection reset".to_string(),
            })
        });
        backend.expect_list_documents().times(1).returning(|_| {
            Err(ApiError::Status {
                status: 0,
                body: "connection reset".to_string(),
            })
        });

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));
        let outcome = manager
            .upload_file(DocumentUpload {
                filename: "notes.txt".to_string(),
                bytes: b"hello".to_vec(),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, UploadOutcome::Unconfirmed(_)));
    }

    #[tokio::test]
    async fn empty_history_is_reported_as_empty_not_an_error() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_fetch_history()
            .times(1)
            .returning(|_| Ok(HistoryMap::new()));

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));
        assert_eq!(manager.load_history().await.unwrap(), HistoryOutcome::Empty);
    }

    #[tokio::test]
    async fn unauthorized_history_expires_the_session() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_fetch_history()
            .times(1)
            .returning(|_| Err(ApiError::Unauthorized));

        let mut manager = manager(backend, MemoryStateStore::with_identity(identity()));
        assert!(matches!(
            manager.load_history().await,
            Err(ClientError::SessionExpired)
        ));
        assert_eq!(manager.current_identity().unwrap(), None);
    }

    #[tokio::test]
    async fn logged_out_file_list_is_local_only() {
        // No expectations: the placeholder must not hit the network
        let mut manager = manager(MockChatBackend::new(), MemoryStateStore::default());
        assert_eq!(
            manager.refresh_file_list().await.unwrap(),
            FileListOutcome::LoggedOut
        );
    }

    #[tokio::test]
    async fn login_caches_identity_and_drops_the_old_session() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_login()
            .withf(|username, password| username == "alice" && password == "secret")
            .times(1)
            .returning(|_, _| Ok(identity()));

        let mut manager = manager(backend, MemoryStateStore::default());
        let before = manager.ensure_session_id().unwrap();

        let cached = manager.login("alice", "secret").await.unwrap();
        assert_eq!(cached, identity());
        assert_eq!(manager.current_identity().unwrap(), Some(identity()));

        // A fresh session id is generated after login
        let after = manager.ensure_session_id().unwrap();
        assert!(Uuid::parse_str(&after).is_ok());
        assert_ne!(before, after);
    }
}
