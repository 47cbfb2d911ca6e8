mod documents;
mod health;
mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

/// Multipart framing overhead allowed on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        upload::upload_document,
        documents::list_documents,
    ),
    components(
        schemas(
            health::HealthResponse,
            crate::services::intake::UploadOutcome,
            documents::DocumentResponse,
            crate::models::document_kind::DocumentKind,
        )
    ),
    tags(
        (name = "General", description = "Service status"),
        (name = "Intake", description = "Document intake for lease cases")
    ),
    info(
        title = "Bail Intake API",
        version = "0.1.0",
        description = "Receives lease case documents and files them under the right party",
    )
)]
struct ApiDoc;

pub fn create_routes(state: AppState) -> Router {
    // Must exceed max_file_size so oversized files reach validation and get a 400.
    let body_limit = state
        .uploader
        .settings()
        .max_file_size
        .saturating_add(MULTIPART_OVERHEAD);

    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    let app_routes = Router::new()
        .route("/health", get(health::health))
        .route(
            "/intake/upload",
            post(upload::upload_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/intake/{token}/documents", get(documents::list_documents))
        .with_state(state);

    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
