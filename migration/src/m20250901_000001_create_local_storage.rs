use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum LocalStorage {
    Table,
    Key,
    Value,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Single-slot values such as the pending subscription marker live here
        manager
            .create_table(
                Table::create()
                    .table(LocalStorage::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LocalStorage::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LocalStorage::Value).text().not_null())
                    .col(
                        ColumnDef::new(LocalStorage::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LocalStorage::Table).to_owned())
            .await?;

        Ok(())
    }
}
