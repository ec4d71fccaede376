//! Session producer.
//!
//! Performs the login handshake on every scheduled fire: a GET against the
//! login resource harvests the anti-forgery token from a response cookie,
//! then a POST with the credentials, that token and a fixed continuation
//! hint yields the session cookie. Success emits a `<id>.modified` event
//! carrying the fresh [`SessionToken`]; any failure is logged as a warning
//! and the next scheduled fire retries.

use crate::engine::{BoxError, EventSink, Producer};
use crate::events::{Credentials, Event, SessionToken};
use crate::http::{HttpRequest, HttpTransport, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Fixed continuation parameter sent with the login form.
const LOGIN_CONTINUE: &str = "/upload/";

/// Ways the login handshake can fail. All of them are recoverable; the
/// producer retries on its next period.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("login page set no csrf cookie")]
    MissingCsrfCookie,

    #[error("login rejected with status {0}")]
    LoginRejected(u16),

    #[error("login response set no session cookie")]
    MissingSessionCookie,
}

pub struct SessionProducer {
    id: String,
    credentials: Credentials,
    login_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl SessionProducer {
    pub fn new(
        id: impl Into<String>,
        credentials: Credentials,
        login_url: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            id: id.into(),
            credentials,
            login_url: login_url.into(),
            transport,
        }
    }

    async fn handshake(&self) -> Result<SessionToken, SessionError> {
        let login_page = self
            .transport
            .execute(HttpRequest::get(&self.login_url))
            .await?;
        let csrf_token = login_page
            .cookie("csrftoken")
            .filter(|token| !token.is_empty())
            .ok_or(SessionError::MissingCsrfCookie)?;

        let form = vec![
            ("username".to_owned(), self.credentials.username.clone()),
            ("password".to_owned(), self.credentials.password.clone()),
            ("csrfmiddlewaretoken".to_owned(), csrf_token.clone()),
            ("next".to_owned(), LOGIN_CONTINUE.to_owned()),
        ];
        let response = self
            .transport
            .execute(
                HttpRequest::post(&self.login_url)
                    .header("Cookie", format!("csrftoken={csrf_token}"))
                    .form(form),
            )
            .await?;

        // The login resource answers a bad password with an explicit 500.
        if response.status == 500 {
            return Err(SessionError::LoginRejected(response.status));
        }

        let session_id = response
            .cookie("sessionid")
            .filter(|id| !id.is_empty())
            .ok_or(SessionError::MissingSessionCookie)?;

        Ok(SessionToken {
            session_id,
            csrf_token,
        })
    }
}

#[async_trait]
impl Producer for SessionProducer {
    async fn fire(&self, sink: &EventSink) -> Result<(), BoxError> {
        match self.handshake().await {
            Ok(token) => {
                info!(producer = %self.id, "acquired refreshed session data");
                sink.publish(Event::session_modified(&self.id, token)).await;
            }
            Err(e) => {
                warn!(
                    producer = %self.id,
                    error = %e,
                    "session refresh failed, this is harmless unless the warning persists"
                );
            }
        }
        Ok(())
    }
}
