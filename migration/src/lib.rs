pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_clients_table;
mod m20250301_000002_create_persons_table;
mod m20250301_000003_create_companies_table;
mod m20250301_000004_create_properties_table;
mod m20250301_000005_create_intake_links_table;
mod m20250301_000006_create_documents_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_clients_table::Migration),
            Box::new(m20250301_000002_create_persons_table::Migration),
            Box::new(m20250301_000003_create_companies_table::Migration),
            Box::new(m20250301_000004_create_properties_table::Migration),
            Box::new(m20250301_000005_create_intake_links_table::Migration),
            Box::new(m20250301_000006_create_documents_table::Migration),
        ]
    }
}
