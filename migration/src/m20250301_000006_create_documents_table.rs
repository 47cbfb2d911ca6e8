use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Documents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Documents::StorageKey).string().not_null())
                    .col(ColumnDef::new(Documents::Url).string().not_null())
                    .col(ColumnDef::new(Documents::Kind).string().not_null())
                    .col(ColumnDef::new(Documents::Label).string().not_null())
                    .col(ColumnDef::new(Documents::MimeType).string().not_null())
                    .col(ColumnDef::new(Documents::Size).big_integer().not_null())
                    .col(ColumnDef::new(Documents::PersonId).uuid())
                    .col(ColumnDef::new(Documents::CompanyId).uuid())
                    .col(ColumnDef::new(Documents::ClientId).uuid())
                    .col(ColumnDef::new(Documents::PropertyId).uuid())
                    .col(ColumnDef::new(Documents::OwnerKey).string().not_null())
                    .col(ColumnDef::new(Documents::IntakeLinkId).uuid())
                    .col(ColumnDef::new(Documents::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_person_id")
                            .from(Documents::Table, Documents::PersonId)
                            .to(Persons::Table, Persons::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_company_id")
                            .from(Documents::Table, Documents::CompanyId)
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_client_id")
                            .from(Documents::Table, Documents::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_property_id")
                            .from(Documents::Table, Documents::PropertyId)
                            .to(Properties::Table, Properties::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_intake_link_id")
                            .from(Documents::Table, Documents::IntakeLinkId)
                            .to(IntakeLinks::Table, IntakeLinks::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Nullable FK columns never collide in a unique index, so the owner is
        // folded into a non-null owner_key column.
        manager
            .create_index(
                Index::create()
                    .name("uq_documents_locator_kind_owner")
                    .table(Documents::Table)
                    .col(Documents::StorageKey)
                    .col(Documents::Kind)
                    .col(Documents::OwnerKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_documents_intake_link_id")
                    .table(Documents::Table)
                    .col(Documents::IntakeLinkId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Documents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
    StorageKey,
    Url,
    Kind,
    Label,
    MimeType,
    Size,
    PersonId,
    CompanyId,
    ClientId,
    PropertyId,
    OwnerKey,
    IntakeLinkId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Persons {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Companies {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Properties {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum IntakeLinks {
    Table,
    Id,
}
