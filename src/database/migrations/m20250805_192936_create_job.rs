use sea_orm_migration::{
    prelude::*,
    schema::{
        json_binary, json_binary_null, string, string_len, text, text_null, timestamp,
        timestamp_null, uuid, uuid_null,
    },
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // States are stored as plain strings so the schema works on SQLite as well as Postgres
        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(uuid(Job::Id).primary_key())
                    .col(uuid(Job::BookId))
                    .col(uuid_null(Job::ChunkId))
                    .col(string(Job::JobType))
                    .col(json_binary(Job::Parameters))
                    .col(string_len(Job::State, 16).default("waiting"))
                    .col(json_binary_null(Job::Result))
                    .col(text_null(Job::ErrorMessage))
                    .col(timestamp(Job::CreatedAt))
                    .col(timestamp_null(Job::StartedAt))
                    .col(timestamp_null(Job::CompletedAt))
                    .to_owned(),
            )
            .await?;

        // The poller scans waiting jobs oldest first
        manager
            .create_index(
                Index::create()
                    .name("idx-job-state-created_at")
                    .table(Job::Table)
                    .col(Job::State)
                    .col(Job::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job-book_id")
                    .table(Job::Table)
                    .col(Job::BookId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobLog::Table)
                    .if_not_exists()
                    .col(uuid(JobLog::Id).primary_key())
                    .col(uuid(JobLog::JobId))
                    .col(string_len(JobLog::Level, 8))
                    .col(text(JobLog::Message))
                    .col(timestamp(JobLog::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-job_log-job_id")
                            .from(JobLog::Table, JobLog::JobId)
                            .to(Job::Table, Job::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job_log-job_id-created_at")
                    .table(JobLog::Table)
                    .col(JobLog::JobId)
                    .col(JobLog::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobLog::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Job {
    Table,
    Id,
    BookId,
    ChunkId,
    JobType,
    Parameters,
    State,
    Result,
    ErrorMessage,
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum JobLog {
    Table,
    Id,
    JobId,
    Level,
    Message,
    CreatedAt,
}
