//! Transactional email notifications, sent through the rate-limited queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::MailConfig;
use crate::models::document_kind::DocumentKind;

use super::retry::TransientError;
use super::throttle::{QueueError, RateLimitedQueue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email provider throttled the request")]
    Throttled { retry_after: Option<Duration> },
    #[error("email provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("email transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl TransientError for MailError {
    fn is_transient(&self) -> bool {
        match self {
            MailError::Throttled { .. } => true,
            MailError::Provider { status, .. } => *status >= 500,
            MailError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            MailError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError>;
}

/// Resend HTTP API.
pub struct ResendTransport {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl ResendTransport {
    pub fn new(api_key: impl Into<String>, api_base: &str) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/emails", api_base.trim_end_matches('/')),
        })
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

#[async_trait]
impl EmailTransport for ResendTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MailError::Throttled {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: SendResponse = response.json().await?;
        Ok(body.id)
    }
}

/// Used when no provider key is configured.
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            "Email not sent (no provider configured)"
        );
        Ok(format!("logged-{}", Uuid::new_v4()))
    }
}

/// Facts about a freshly recorded document, for the office inbox.
#[derive(Debug, Clone)]
pub struct ReceivedNotice {
    pub token: String,
    pub kind: DocumentKind,
    pub url: String,
    pub owner_key: String,
}

#[derive(Clone)]
pub struct Notifier {
    queue: RateLimitedQueue,
    transport: Arc<dyn EmailTransport>,
    from: String,
    recipient: String,
}

impl Notifier {
    pub fn new(
        queue: RateLimitedQueue,
        transport: Arc<dyn EmailTransport>,
        from: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            transport,
            from: from.into(),
            recipient: recipient.into(),
        }
    }

    /// Must be called from within a tokio runtime: it starts the queue worker.
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let transport: Arc<dyn EmailTransport> = match &config.api_key {
            Some(key) => Arc::new(ResendTransport::new(key.clone(), &config.api_base)?),
            None => Arc::new(LogTransport),
        };
        let queue = RateLimitedQueue::spawn(config.throttle.clone());
        Ok(Self::new(queue, transport, config.from.clone(), config.notify_to.clone()))
    }

    pub async fn send(&self, email: OutgoingEmail) -> Result<String, QueueError<MailError>> {
        let transport = self.transport.clone();
        let email = Arc::new(email);
        self.queue
            .submit("email.send", move || {
                let transport = transport.clone();
                let email = email.clone();
                async move { transport.send(&email).await }
            })
            .await
    }

    pub fn document_received_email(&self, notice: &ReceivedNotice) -> OutgoingEmail {
        OutgoingEmail {
            from: self.from.clone(),
            to: vec![self.recipient.clone()],
            subject: format!("Nouveau document reçu : {}", notice.kind.label()),
            text: format!(
                "Un document a été déposé sur le dossier {}.\n\n\
                 Type : {} ({})\nRattachement : {}\nFichier : {}\n",
                notice.token,
                notice.kind.label(),
                notice.kind,
                notice.owner_key,
                notice.url
            ),
        }
    }

    pub async fn document_received(
        &self,
        notice: &ReceivedNotice,
    ) -> Result<String, QueueError<MailError>> {
        self.send(self.document_received_email(notice)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::retry::RetryPolicy;
    use crate::services::throttle::ThrottleConfig;
    use axum::http::HeaderValue;
    use axum::{
        extract::State, http::StatusCode as AxumStatus, response::IntoResponse, routing::post,
        Json, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_queue() -> RateLimitedQueue {
        RateLimitedQueue::spawn(ThrottleConfig {
            min_interval: Duration::from_millis(1),
            retry: RetryPolicy {
                max_retries: 3,
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(10),
                multiplier: 2.0,
                max_elapsed: Duration::from_secs(5),
            },
        })
    }

    #[test]
    fn retry_after_header_is_read_in_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn only_throttling_and_server_errors_are_transient() {
        assert!(MailError::Throttled { retry_after: None }.is_transient());
        assert!(MailError::Provider {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!MailError::Provider {
            status: 422,
            message: "invalid `to`".into()
        }
        .is_transient());
    }

    #[tokio::test]
    async fn received_email_names_the_kind_and_case() {
        let notifier = Notifier::new(
            fast_queue(),
            Arc::new(LogTransport),
            "noreply@etude.fr",
            "office@etude.fr",
        );
        let email = notifier.document_received_email(&ReceivedNotice {
            token: "tok-42".into(),
            kind: DocumentKind::CompanyRegistration,
            url: "https://blobs/intake/tok-42/kbis.pdf".into(),
            owner_key: "none".into(),
        });

        assert_eq!(email.to, vec!["office@etude.fr".to_string()]);
        assert!(email.subject.contains("Extrait Kbis"));
        assert!(email.text.contains("tok-42"));
        assert!(email.text.contains("KBIS"));
    }

    async fn flaky_provider(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, HeaderValue::from_static("0"));
            let body = Json(serde_json::json!({"message": "slow down"}));
            (AxumStatus::TOO_MANY_REQUESTS, headers, body).into_response()
        } else {
            Json(serde_json::json!({"id": "email_123"})).into_response()
        }
    }

    #[tokio::test]
    async fn resend_throttling_is_replayed_through_the_queue() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/emails", post(flaky_provider))
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let transport = ResendTransport::new("re_test", &format!("http://{}", addr)).unwrap();
        let notifier = Notifier::new(
            fast_queue(),
            Arc::new(transport),
            "noreply@etude.fr",
            "office@etude.fr",
        );

        let id = notifier
            .send(OutgoingEmail {
                from: "noreply@etude.fr".into(),
                to: vec!["office@etude.fr".into()],
                subject: "Test".into(),
                text: "Bonjour".into(),
            })
            .await
            .unwrap();

        assert_eq!(id, "email_123");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
