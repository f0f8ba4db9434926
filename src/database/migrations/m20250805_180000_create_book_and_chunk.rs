use sea_orm_migration::{
    prelude::*,
    schema::{
        boolean, integer, json_binary, string, string_null, text, timestamp, uuid, uuid_null,
    },
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Book::Table)
                    .if_not_exists()
                    .col(uuid(Book::Id).primary_key())
                    .col(string(Book::Title))
                    .col(string_null(Book::ForcedModel))
                    .col(json_binary(Book::ModelDefaults))
                    .col(boolean(Book::IsLocked).default(false))
                    .col(uuid_null(Book::LockedByJobId))
                    .col(timestamp(Book::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Chunk::Table)
                    .if_not_exists()
                    .col(uuid(Chunk::Id).primary_key())
                    .col(uuid(Chunk::BookId))
                    .col(integer(Chunk::Position))
                    .col(string_null(Chunk::Title))
                    .col(text(Chunk::Content))
                    .col(integer(Chunk::Version).default(1))
                    .col(boolean(Chunk::IsLocked).default(false))
                    .col(uuid_null(Chunk::LockedByJobId))
                    .col(timestamp(Chunk::CreatedAt))
                    .col(timestamp(Chunk::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-chunk-book_id")
                            .from(Chunk::Table, Chunk::BookId)
                            .to(Book::Table, Book::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-chunk-book_id-position")
                    .table(Chunk::Table)
                    .col(Chunk::BookId)
                    .col(Chunk::Position)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Chunk::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Book::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Book {
    Table,
    Id,
    Title,
    ForcedModel,
    ModelDefaults,
    IsLocked,
    LockedByJobId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Chunk {
    Table,
    Id,
    BookId,
    Position,
    Title,
    Content,
    Version,
    IsLocked,
    LockedByJobId,
    CreatedAt,
    UpdatedAt,
}
