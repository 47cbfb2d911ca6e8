use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

use crate::entities::document;
use crate::models::document_kind::DocumentKind;

use super::routing::OwnerKeys;

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub storage_key: String,
    pub url: String,
    pub kind: DocumentKind,
    pub mime_type: String,
    pub size: i64,
    pub owner: OwnerKeys,
    pub intake_link_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub document: document::Model,
    pub created: bool,
}

/// Locator and kind, plus whichever owner keys are set. Null keys are left out
/// of the filter rather than matched as NULL.
fn natural_key(new: &NewDocument) -> Condition {
    let mut condition = Condition::all()
        .add(document::Column::StorageKey.eq(new.storage_key.as_str()))
        .add(document::Column::Kind.eq(new.kind));

    if let Some(id) = new.owner.person_id {
        condition = condition.add(document::Column::PersonId.eq(id));
    }
    if let Some(id) = new.owner.company_id {
        condition = condition.add(document::Column::CompanyId.eq(id));
    }
    if let Some(id) = new.owner.client_id {
        condition = condition.add(document::Column::ClientId.eq(id));
    }
    if let Some(id) = new.owner.property_id {
        condition = condition.add(document::Column::PropertyId.eq(id));
    }
    condition
}

async fn find_existing<C>(db: &C, new: &NewDocument) -> Result<Option<document::Model>, DbErr>
where
    C: ConnectionTrait,
{
    document::Entity::find().filter(natural_key(new)).one(db).await
}

/// Inserts the document unless a row with the same natural key exists, in which
/// case that row is returned untouched.
pub async fn upsert_document<C>(db: &C, new: NewDocument) -> Result<UpsertOutcome, DbErr>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_existing(db, &new).await? {
        tracing::debug!(
            document_id = %existing.id,
            storage_key = %existing.storage_key,
            kind = %existing.kind,
            "Document already recorded"
        );
        return Ok(UpsertOutcome {
            document: existing,
            created: false,
        });
    }

    let active = document::ActiveModel {
        id: Set(Uuid::new_v4()),
        storage_key: Set(new.storage_key.clone()),
        url: Set(new.url.clone()),
        kind: Set(new.kind),
        label: Set(new.kind.label().to_string()),
        mime_type: Set(new.mime_type.clone()),
        size: Set(new.size),
        person_id: Set(new.owner.person_id),
        company_id: Set(new.owner.company_id),
        client_id: Set(new.owner.client_id),
        property_id: Set(new.owner.property_id),
        owner_key: Set(new.owner.owner_key()),
        intake_link_id: Set(new.intake_link_id),
        created_at: Set(chrono::Utc::now().naive_utc()),
    };

    match active.insert(db).await {
        Ok(document) => {
            tracing::info!(
                document_id = %document.id,
                kind = %document.kind,
                owner = %document.owner_key,
                "Document recorded"
            );
            Ok(UpsertOutcome {
                document,
                created: true,
            })
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            // A concurrent upload inserted the same row first.
            tracing::debug!(
                storage_key = %new.storage_key,
                "Lost insert race, reading existing document"
            );
            match find_existing(db, &new).await? {
                Some(document) => Ok(UpsertOutcome {
                    document,
                    created: false,
                }),
                None => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

pub struct DocumentPage {
    pub documents: Vec<document::Model>,
    pub total_items: u64,
}

/// Documents recorded under one intake link, newest first. `page` is 1-based.
pub async fn list_for_link<C>(
    db: &C,
    intake_link_id: Uuid,
    page: u64,
    limit: u64,
) -> Result<DocumentPage, DbErr>
where
    C: ConnectionTrait,
{
    let paginator = document::Entity::find()
        .filter(document::Column::IntakeLinkId.eq(intake_link_id))
        .order_by_desc(document::Column::CreatedAt)
        .order_by_asc(document::Column::Id)
        .paginate(db, limit.max(1));

    let total_items = paginator.num_items().await?;
    let documents = paginator.fetch_page(page.saturating_sub(1)).await?;

    Ok(DocumentPage {
        documents,
        total_items,
    })
}
