use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, Query, State,
    },
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;
use crate::services::intake::{UploadOutcome, UploadRequest, UploadedFile};
use crate::state::AppState;

/// Upload parameters may come from the query string or from text parts of the
/// form. When both are present the query string wins.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    /// Intake link token.
    pub token: Option<String>,
    /// Document kind code, e.g. `PIECE_IDENTITE` or `KBIS`.
    pub kind: Option<String>,
    pub client_id: Option<String>,
    pub property_id: Option<String>,
    /// Zero-based index into the client's persons, primary first.
    pub person_index: Option<String>,
}

fn form_slot<'a>(request: &'a mut UploadRequest, name: &str) -> Option<&'a mut Option<String>> {
    match name {
        "token" => Some(&mut request.token),
        "kind" => Some(&mut request.kind),
        "clientId" => Some(&mut request.client_id),
        "propertyId" => Some(&mut request.property_id),
        "personIndex" => Some(&mut request.person_index),
        _ => None,
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest("File exceeds the maximum upload size".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart data: {}", err.body_text()))
    }
}

async fn read_file(field: Field<'_>) -> Result<UploadedFile, AppError> {
    let filename = field.file_name().unwrap_or("document").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(multipart_error)?;

    Ok(UploadedFile {
        filename,
        content_type,
        data,
    })
}

#[utoipa::path(
    post,
    path = "/intake/upload",
    tag = "Intake",
    params(UploadParams),
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored, see `recorded`", body = UploadOutcome),
        (status = 400, description = "Missing file, parameter, or rejected file"),
        (status = 403, description = "Intake link revoked or expired"),
        (status = 404, description = "Unknown intake link"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn upload_document(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, AppError> {
    let mut request = UploadRequest {
        file: None,
        token: params.token,
        kind: params.kind,
        client_id: params.client_id,
        property_id: params.property_id,
        person_index: params.person_index,
    };

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            if request.file.is_none() {
                request.file = Some(read_file(field).await?);
            }
        } else if let Some(slot) = form_slot(&mut request, &name) {
            let value = field.text().await.map_err(multipart_error)?;
            slot.get_or_insert(value);
        }
    }

    let token = request.token.clone().unwrap_or_default();
    match state.uploader.handle_upload(request).await {
        Ok(outcome) => {
            tracing::info!(
                token = %token,
                recorded = outcome.recorded,
                "Upload | POST /intake/upload | res=200"
            );
            Ok(Json(outcome))
        }
        Err(e) => {
            tracing::info!(token = %token, error = %e, "Upload | POST /intake/upload | rejected");
            Err(e)
        }
    }
}
