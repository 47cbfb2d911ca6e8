use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document_kind::DocumentKind;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub kind: DocumentKind,
    pub label: String,
    pub mime_type: String,
    pub size: i64,
    pub person_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    /// `person:<id>`, `company:<id>`, `client:<id>`, `property:<id>` or `none`.
    /// Part of the unique (storage_key, kind, owner_key) index.
    pub owner_key: String,
    pub intake_link_id: Option<Uuid>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::intake_link::Entity",
        from = "Column::IntakeLinkId",
        to = "super::intake_link::Column::Id",
        on_delete = "SetNull"
    )]
    IntakeLink,
    #[sea_orm(
        belongs_to = "super::person::Entity",
        from = "Column::PersonId",
        to = "super::person::Column::Id",
        on_delete = "SetNull"
    )]
    Person,
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id",
        on_delete = "SetNull"
    )]
    Company,
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id",
        on_delete = "SetNull"
    )]
    Client,
    #[sea_orm(
        belongs_to = "super::property::Entity",
        from = "Column::PropertyId",
        to = "super::property::Column::Id",
        on_delete = "SetNull"
    )]
    Property,
}

impl Related<super::intake_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IntakeLink.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
