//! Upload orchestration for intake links: validate, store, then record.
//!
//! Everything that can reject an upload runs before the blob write. Once the
//! file is stored the request succeeds; recording the document row is
//! best-effort and its result is reported in [`UploadOutcome`].

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::UploadSettings;
use crate::entities::intake_link::{self, LinkStatus};
use crate::error::AppError;
use crate::models::document_kind::{DocumentKind, UnknownKind};

use super::blob::{BlobStore, PutOptions, StoredBlob};
use super::documents::{upsert_document, NewDocument, UpsertOutcome};
use super::mailer::{Notifier, ReceivedNotice};
use super::retry::{retry_transient, RetryPolicy};
use super::routing::{
    classify, resolve_with_policy, IntakeContext, OwnerKeys, PartyRoster, TargetCategory,
    UnresolvedReason,
};

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Raw upload parameters as received; parsing is part of validation.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: Option<UploadedFile>,
    pub token: Option<String>,
    pub kind: Option<String>,
    pub client_id: Option<String>,
    pub property_id: Option<String>,
    pub person_index: Option<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub url: String,
    pub pathname: String,
    pub content_type: String,
    pub content_disposition: String,
    pub size: u64,
    /// Always true in a successful response: the file is in blob storage.
    pub stored: bool,
    /// False when the document row could not be written; see `record_error`.
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
}

#[derive(Debug, Error)]
enum RecordError {
    #[error("{0}")]
    Unresolved(UnresolvedReason),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl RecordError {
    /// Text for the uploader. Database details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            RecordError::Unresolved(reason) => reason.to_string(),
            RecordError::Database(_) => "document could not be recorded".to_string(),
        }
    }
}

pub struct IntakeUploader {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
    settings: UploadSettings,
    retry: RetryPolicy,
    notifier: Option<Notifier>,
}

impl IntakeUploader {
    pub fn new(
        db: DatabaseConnection,
        blobs: Arc<dyn BlobStore>,
        settings: UploadSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            blobs,
            settings,
            retry,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Looks up the intake link behind `token` and checks it still accepts uploads.
    pub async fn open_case(&self, token: &str) -> Result<intake_link::Model, AppError> {
        let link = intake_link::Entity::find()
            .filter(intake_link::Column::Token.eq(token))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Unknown intake link".to_string()))?;

        if link.status == LinkStatus::Revoked {
            return Err(AppError::Forbidden("This intake link has been revoked".to_string()));
        }
        if link.is_expired(Utc::now().naive_utc()) {
            return Err(AppError::Forbidden("This intake link has expired".to_string()));
        }
        Ok(link)
    }

    pub async fn handle_upload(&self, request: UploadRequest) -> Result<UploadOutcome, AppError> {
        let file = request
            .file
            .filter(|f| !f.data.is_empty())
            .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

        let token = non_empty(request.token)
            .ok_or_else(|| AppError::BadRequest("Missing intake token".to_string()))?;
        let link = self.open_case(&token).await?;

        if file.data.len() > self.settings.max_file_size {
            return Err(AppError::BadRequest(format!(
                "File exceeds the maximum size of {} bytes",
                self.settings.max_file_size
            )));
        }
        if !self.settings.allows(&file.content_type) {
            return Err(AppError::BadRequest(format!(
                "File type {} is not allowed",
                file.content_type
            )));
        }

        let kind: DocumentKind = non_empty(request.kind)
            .ok_or_else(|| AppError::BadRequest("Missing document kind".to_string()))?
            .parse()
            .map_err(|e: UnknownKind| AppError::BadRequest(e.to_string()))?;
        let client_id = parse_uuid("clientId", request.client_id)?;
        let property_id = parse_uuid("propertyId", request.property_id)?;
        let person_index = non_empty(request.person_index)
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| AppError::BadRequest(format!("Invalid personIndex: {}", raw)))
            })
            .transpose()?;

        if overrides_link(client_id, link.client_id) {
            tracing::warn!(
                token = %token,
                supplied = ?client_id,
                bound = ?link.client_id,
                "clientId differs from the client bound to the intake link"
            );
        }
        if overrides_link(property_id, link.property_id) {
            tracing::warn!(
                token = %token,
                supplied = ?property_id,
                bound = ?link.property_id,
                "propertyId differs from the property bound to the intake link"
            );
        }

        let context = IntakeContext {
            token,
            intake_link_id: Some(link.id),
            client_id: client_id.or(link.client_id),
            property_id: property_id.or(link.property_id),
            person_index,
        };

        let filename = sanitize_filename(&file.filename);
        let key = storage_key(&context.token, &filename);
        let options = PutOptions {
            content_type: file.content_type.clone(),
            content_disposition: format!("inline; filename=\"{}\"", filename),
        };

        let stored = retry_transient(&self.retry, "blob.put", || {
            self.blobs.put(&key, file.data.clone(), &options)
        })
        .await?;

        let size = file.data.len() as u64;
        tracing::info!(
            token = %context.token,
            kind = %kind,
            pathname = %stored.pathname,
            size,
            "Upload stored"
        );

        let mut outcome = UploadOutcome {
            url: stored.url.clone(),
            pathname: stored.pathname.clone(),
            content_type: stored.content_type.clone(),
            content_disposition: stored.content_disposition.clone(),
            size,
            stored: true,
            recorded: false,
            record_error: None,
            document_id: None,
        };

        match self.record(&context, kind, &stored, size).await {
            Ok(upsert) => {
                outcome.recorded = true;
                outcome.document_id = Some(upsert.document.id);
                if upsert.created {
                    self.notify_received(&context, &upsert);
                }
            }
            Err(e) => {
                tracing::error!(
                    token = %context.token,
                    kind = %kind,
                    pathname = %stored.pathname,
                    error = %e,
                    "File stored but document not recorded"
                );
                outcome.record_error = Some(e.public_message());
            }
        }

        Ok(outcome)
    }

    async fn record(
        &self,
        context: &IntakeContext,
        kind: DocumentKind,
        stored: &StoredBlob,
        size: u64,
    ) -> Result<UpsertOutcome, RecordError> {
        let category = classify(kind);
        let roster = match (category, context.client_id) {
            (TargetCategory::Person | TargetCategory::Company, Some(client_id)) => {
                PartyRoster::load(&self.db, client_id).await?
            }
            _ => PartyRoster::default(),
        };

        let policy = self.settings.person_index_policy;
        let owner = match resolve_with_policy(category, context, &roster, policy) {
            Ok(owner) => Some(owner),
            Err(reason @ UnresolvedReason::PersonIndexOutOfRange { .. }) => {
                return Err(RecordError::Unresolved(reason));
            }
            Err(reason) => {
                tracing::warn!(
                    token = %context.token,
                    kind = %kind,
                    reason = %reason,
                    "No owner resolved, recording document without owner"
                );
                None
            }
        };

        let new = NewDocument {
            storage_key: stored.pathname.clone(),
            url: stored.url.clone(),
            kind,
            mime_type: stored.content_type.clone(),
            size: size as i64,
            owner: OwnerKeys::from(owner),
            intake_link_id: context.intake_link_id,
        };

        Ok(upsert_document(&self.db, new).await?)
    }

    fn notify_received(&self, context: &IntakeContext, upsert: &UpsertOutcome) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let notice = ReceivedNotice {
            token: context.token.clone(),
            kind: upsert.document.kind,
            url: upsert.document.url.clone(),
            owner_key: upsert.document.owner_key.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.document_received(&notice).await {
                tracing::warn!(
                    token = %notice.token,
                    error = %e,
                    "Failed to send document notification"
                );
            }
        });
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, AppError> {
    non_empty(value)
        .map(|raw| {
            Uuid::parse_str(&raw)
                .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", field, raw)))
        })
        .transpose()
}

/// True when the request names a different id than the one bound to the link.
fn overrides_link(supplied: Option<Uuid>, bound: Option<Uuid>) -> bool {
    matches!((supplied, bound), (Some(s), Some(b)) if s != b)
}

fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
}

fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = sanitize_segment(base)
        .trim_matches(['.', '-'])
        .chars()
        .take(100)
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

/// `intake/<token>/<unix-millis>-<random>-<filename>`.
fn storage_key(token: &str, filename: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase();
    format!(
        "intake/{}/{}-{}-{}",
        sanitize_segment(token),
        Utc::now().timestamp_millis(),
        suffix,
        filename
    )
}
