use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IntakeLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntakeLinks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IntakeLinks::Token).string().not_null().unique_key())
                    .col(ColumnDef::new(IntakeLinks::ClientId).uuid())
                    .col(ColumnDef::new(IntakeLinks::PropertyId).uuid())
                    .col(
                        ColumnDef::new(IntakeLinks::Status)
                            .string()
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(ColumnDef::new(IntakeLinks::ExpiresAt).timestamp())
                    .col(ColumnDef::new(IntakeLinks::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_intake_links_client_id")
                            .from(IntakeLinks::Table, IntakeLinks::ClientId)
                            .to(Clients::Table, Clients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_intake_links_property_id")
                            .from(IntakeLinks::Table, IntakeLinks::PropertyId)
                            .to(Properties::Table, Properties::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IntakeLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum IntakeLinks {
    Table,
    Id,
    Token,
    ClientId,
    PropertyId,
    Status,
    ExpiresAt,
    CreatedAt,
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
