//! Migration to create the mentor_profiles table.
//!
//! Mentor profiles hold normalized fields extracted from raw provider
//! payloads by the linker. Profiles are updated in place across syncs so the
//! mentor id stays stable even when a provider changes its export format.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MentorProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MentorProfiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MentorProfiles::DisplayName).text().not_null())
                    .col(ColumnDef::new(MentorProfiles::Bio).text().null())
                    .col(ColumnDef::new(MentorProfiles::ImageUrl).text().null())
                    .col(ColumnDef::new(MentorProfiles::Genres).json_binary().null())
                    .col(
                        ColumnDef::new(MentorProfiles::ExternalUrls)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MentorProfiles::FollowerCount)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MentorProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MentorProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MentorProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MentorProfiles {
    Table,
    Id,
    DisplayName,
    Bio,
    ImageUrl,
    Genres,
    ExternalUrls,
    FollowerCount,
    CreatedAt,
    UpdatedAt,
}
