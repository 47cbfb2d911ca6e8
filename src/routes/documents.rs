use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::document;
use crate::error::AppError;
use crate::models::document_kind::DocumentKind;
use crate::pagination::{Page, PageQuery};
use crate::services::documents::list_for_link;
use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub label: String,
    pub url: String,
    pub pathname: String,
    pub mime_type: String,
    pub size: i64,
    pub person_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    /// `person:<id>`, `company:<id>`, `client:<id>`, `property:<id>` or `none`.
    pub owner: String,
    pub created_at: String,
}

impl From<document::Model> for DocumentResponse {
    fn from(doc: document::Model) -> Self {
        Self {
            id: doc.id,
            kind: doc.kind,
            label: doc.label,
            url: doc.url,
            pathname: doc.storage_key,
            mime_type: doc.mime_type,
            size: doc.size,
            person_id: doc.person_id,
            company_id: doc.company_id,
            client_id: doc.client_id,
            property_id: doc.property_id,
            owner: doc.owner_key,
            created_at: doc.created_at.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/intake/{token}/documents",
    tag = "Intake",
    params(
        ("token" = String, Path, description = "Intake link token"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Documents of the case, newest first",
            body = Page<DocumentResponse>),
        (status = 403, description = "Intake link revoked or expired"),
        (status = 404, description = "Unknown intake link")
    )
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<DocumentResponse>>, AppError> {
    let link = state.uploader.open_case(&token).await?;
    let (page, limit) = query.resolve();

    let result = list_for_link(state.uploader.db(), link.id, page, limit).await?;
    let data = result.documents.into_iter().map(DocumentResponse::from).collect();

    Ok(Json(Page::new(data, result.total_items, page, limit)))
}
