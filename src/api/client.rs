use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{
    ChatReply, ChatRequest, DocumentUpload, FileRecord, HistoryMap, LoginRequest, UserIdentity,
};
use crate::constants::{
    CHAT_PATH, FILES_PATH, HEADER_USERNAME, HEADER_USER_ID, LOGIN_PATH, PING_PATH,
    PING_TIMEOUT_SECS, UPLOAD_PATH,
};

/// Errors at the HTTP boundary, before they are mapped into the
/// user-facing taxonomy by the session manager
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response body: {0}")]
    Decode(String),
}

/// Remote operations the session manager depends on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Submit a question within a session and get the answer
    async fn send_chat(
        &self,
        identity: &UserIdentity,
        request: &ChatRequest,
    ) -> Result<ChatReply, ApiError>;

    /// Upload a document to the knowledge base
    async fn upload_document(
        &self,
        identity: &UserIdentity,
        document: &DocumentUpload,
    ) -> Result<(), ApiError>;

    /// Fetch the current knowledge base file list
    async fn list_documents(&self, identity: &UserIdentity) -> Result<Vec<FileRecord>, ApiError>;

    /// Fetch the user's chat history, grouped by session
    async fn fetch_history(&self, identity: &UserIdentity) -> Result<HistoryMap, ApiError>;

    /// Exchange credentials for an identity record
    async fn login(&self, username: &str, password: &str) -> Result<UserIdentity, ApiError>;

    /// Check whether the server is reachable
    async fn ping(&self) -> Result<bool, ApiError>;
}

/// reqwest-backed implementation of [`ChatBackend`]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let base_url: String = base_url.into();
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the identity headers the backend expects on every
    /// authenticated call
    fn identified(
        &self,
        request: reqwest::RequestBuilder,
        identity: &UserIdentity,
    ) -> reqwest::RequestBuilder {
        request
            .header(HEADER_USER_ID, &identity.user_id)
            .header(HEADER_USERNAME, &identity.username)
    }
}

/// Map a non-success response to the boundary error, draining the body
/// for context
async fn error_for_status(response: reqwest::Response) -> ApiError {
    if response.status() == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::Status { status, body }
}

/// What the upload endpoint says about itself when it says anything at all
#[derive(Debug, Default, Deserialize)]
struct UploadAck {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// The upload endpoint answers 2xx with an empty or non-JSON body on some
/// success paths. An unreadable body decodes to an empty ack instead of an
/// error; the HTTP status alone decides the outcome.
fn decode_upload_ack(body: &str) -> UploadAck {
    serde_json::from_str(body).unwrap_or_default()
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn send_chat(
        &self,
        identity: &UserIdentity,
        request: &ChatRequest,
    ) -> Result<ChatReply, ApiError> {
        let response = self
            .identified(self.client.post(self.url(CHAT_PATH)), identity)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }
        response
            .json::<ChatReply>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn upload_document(
        &self,
        identity: &UserIdentity,
        document: &DocumentUpload,
    ) -> Result<(), ApiError> {
        let part = multipart::Part::bytes(document.bytes.clone())
            .file_name(document.filename.clone());
        let form = multipart::Form::new()
            .part("file", part)
            .text("userId", identity.user_id.clone());

        let response = self
            .identified(self.client.post(self.url(UPLOAD_PATH)), identity)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body = response.text().await.unwrap_or_default();
        let ack = decode_upload_ack(&body);
        if ack.success == Some(false) {
            warn!("upload endpoint answered 2xx but flagged success=false");
        }
        if let Some(message) = ack.message {
            debug!(%message, "upload acknowledged");
        }
        Ok(())
    }

    async fn list_documents(&self, identity: &UserIdentity) -> Result<Vec<FileRecord>, ApiError> {
        let response = self
            .identified(self.client.get(self.url(FILES_PATH)), identity)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }
        response
            .json::<Vec<FileRecord>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn fetch_history(&self, identity: &UserIdentity) -> Result<HistoryMap, ApiError> {
        let path = format!("/api/chats/user/{}/history", identity.user_id);
        let response = self
            .identified(self.client.get(self.url(&path)), identity)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }
        response
            .json::<HistoryMap>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn login(&self, username: &str, password: &str) -> Result<UserIdentity, ApiError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            // 401 here means bad credentials, not an expired session
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: super::types::LoginReply =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        if !reply.success {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: reply.message.unwrap_or(body),
            });
        }
        match (reply.user_id, reply.username) {
            (Some(user_id), Some(username)) => Ok(UserIdentity {
                user_id: user_id.to_string(),
                username,
            }),
            _ => Err(ApiError::Decode(
                "login reply is missing userId or username".to_string(),
            )),
        }
    }

    async fn ping(&self) -> Result<bool, ApiError> {
        // Short timeout so a down server doesn't hang the status command
        let client = Client::builder()
            .timeout(Duration::from_secs(PING_TIMEOUT_SECS))
            .build()?;
        match client.get(self.url(PING_PATH)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}
