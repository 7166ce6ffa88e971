pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_files_table;
mod m20250101_000002_create_file_usages_table;
mod m20250101_000003_create_api_keys_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_files_table::Migration),
            Box::new(m20250101_000002_create_file_usages_table::Migration),
            Box::new(m20250101_000003_create_api_keys_table::Migration),
        ]
    }
}
