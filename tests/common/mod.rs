#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use bail_intake::config::UploadSettings;
use bail_intake::entities::{client, company, intake_link, person, property};
use bail_intake::routes::create_routes;
use bail_intake::services::blob::MemoryBlobStore;
use bail_intake::services::intake::IntakeUploader;
use bail_intake::services::retry::RetryPolicy;
use bail_intake::state::AppState;
use chrono::{Duration as ChronoDuration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use tempfile::TempDir;
use uuid::Uuid;

/// Fresh in-memory SQLite database with every migration applied. A single
/// pooled connection keeps all queries on the same database.
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.expect("connect to sqlite");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

/// File-backed SQLite in `dir` with a pool of `connections`, for tests that
/// need writers on separate connections.
pub async fn setup_file_db(dir: &TempDir, connections: u32) -> DatabaseConnection {
    let path = dir.path().join("intake.db");
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(connections)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await.expect("connect to sqlite file");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        multiplier: 2.0,
        max_elapsed: Duration::from_secs(5),
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub db: DatabaseConnection,
    pub store: Arc<MemoryBlobStore>,
}

pub async fn setup_app() -> TestApp {
    setup_app_with(UploadSettings::default(), |uploader| uploader).await
}

pub async fn setup_app_with<F>(settings: UploadSettings, customize: F) -> TestApp
where
    F: FnOnce(IntakeUploader) -> IntakeUploader,
{
    let db = setup_db().await;
    let store = Arc::new(MemoryBlobStore::new("https://blobs.test"));
    let uploader = IntakeUploader::new(db.clone(), store.clone(), settings, fast_retry());
    let state = AppState::new(customize(uploader));

    let server = TestServer::new(create_routes(state)).expect("build test server");
    TestApp { server, db, store }
}

/// A client with its parties, as a notary office would have set it up.
pub struct Case {
    pub client: client::Model,
    pub persons: Vec<person::Model>,
    pub company: Option<company::Model>,
    pub property: property::Model,
    pub link: intake_link::Model,
}

pub async fn seed_client(db: &DatabaseConnection, profile: client::Profile) -> client::Model {
    client::ActiveModel {
        id: Set(Uuid::new_v4()),
        profile: Set(profile),
        display_name: Set("Famille Martin".to_string()),
        email: Set(Some("martin@example.fr".to_string())),
        created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .expect("insert client")
}

pub async fn seed_person(
    db: &DatabaseConnection,
    client_id: Uuid,
    first_name: &str,
    is_primary: bool,
) -> person::Model {
    person::ActiveModel {
        id: Set(Uuid::new_v4()),
        client_id: Set(client_id),
        first_name: Set(first_name.to_string()),
        last_name: Set("Martin".to_string()),
        email: Set(None),
        is_primary: Set(is_primary),
        created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .expect("insert person")
}

pub async fn seed_company(db: &DatabaseConnection, client_id: Uuid) -> company::Model {
    company::ActiveModel {
        id: Set(Uuid::new_v4()),
        client_id: Set(client_id),
        legal_name: Set("SCI Les Tilleuls".to_string()),
        siren: Set(Some("812345678".to_string())),
        created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .expect("insert company")
}

pub async fn seed_property(db: &DatabaseConnection, client_id: Option<Uuid>) -> property::Model {
    property::ActiveModel {
        id: Set(Uuid::new_v4()),
        client_id: Set(client_id),
        address: Set("12 rue des Lilas, 69003 Lyon".to_string()),
        created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .expect("insert property")
}

pub async fn seed_link(
    db: &DatabaseConnection,
    client_id: Option<Uuid>,
    property_id: Option<Uuid>,
    status: intake_link::LinkStatus,
    expires_in: Option<ChronoDuration>,
) -> intake_link::Model {
    intake_link::ActiveModel {
        id: Set(Uuid::new_v4()),
        token: Set(format!("tok-{}", Uuid::new_v4().simple())),
        client_id: Set(client_id),
        property_id: Set(property_id),
        status: Set(status),
        expires_at: Set(expires_in.map(|d| Utc::now().naive_utc() + d)),
        created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .expect("insert intake link")
}

/// Two persons (second one primary), optionally a company, one property and a
/// pending link bound to the client.
pub async fn seed_case(db: &DatabaseConnection, with_company: bool) -> Case {
    let client = seed_client(db, client::Profile::Owner).await;
    let anne = seed_person(db, client.id, "Anne", false).await;
    let paul = seed_person(db, client.id, "Paul", true).await;
    let company = if with_company {
        Some(seed_company(db, client.id).await)
    } else {
        None
    };
    let property = seed_property(db, Some(client.id)).await;
    let link = seed_link(db, Some(client.id), None, intake_link::LinkStatus::Pending, None).await;

    Case {
        client,
        persons: vec![paul, anne],
        company,
        property,
        link,
    }
}
