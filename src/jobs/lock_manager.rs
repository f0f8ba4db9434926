//! Exclusive locks on books and chunks held by running jobs.
//!
//! This is the only code that writes `is_locked` / `locked_by_job_id`. Every operation runs on
//! a caller-supplied connection, normally the transaction that also moves the job between
//! states, so a job's lock and its state always change together.

use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    database::models::{book, chunk},
    jobs::job_target::{JobTarget, LockableEntity},
};

/// Proof that a job holds the lock on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHandle {
    entity: LockableEntity,
    job_id: Uuid,
}

impl LockHandle {
    /// Handle for a lock a job may have taken in an earlier process, used to clean up after
    /// a crash. Releasing it is a no-op if the job doesn't actually hold the lock.
    pub(crate) const fn assumed(target: JobTarget, job_id: Uuid) -> Self {
        Self {
            entity: target.entity(),
            job_id,
        }
    }

    pub const fn entity(&self) -> LockableEntity {
        self.entity
    }

    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquisition {
    Acquired(LockHandle),
    /// Another job holds the entity, or the book/chunk it sits under.
    AlreadyLocked,
    /// The book or chunk doesn't exist (any more).
    TargetMissing,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LockManager;

impl LockManager {
    pub const fn new() -> Self {
        Self
    }

    /// Locks the target entity for `job_id` if neither it nor a related entity is locked.
    ///
    /// A chunk can't be locked while its book is, and a book can't be locked while any of its
    /// chunks are. Only the target's own flag is set.
    pub async fn acquire<C: ConnectionTrait>(
        &self,
        conn: &C,
        target: JobTarget,
        job_id: Uuid,
    ) -> Result<LockAcquisition, DbErr> {
        let Some(book) = book::Entity::find_by_id(target.book_id).one(conn).await? else {
            return Ok(LockAcquisition::TargetMissing);
        };

        let acquired = match target.chunk_id {
            Some(chunk_id) => {
                let chunk_exists = chunk::Entity::find_by_id(chunk_id)
                    .filter(chunk::Column::BookId.eq(book.id))
                    .count(conn)
                    .await?
                    > 0;
                if !chunk_exists {
                    return Ok(LockAcquisition::TargetMissing);
                }
                if book.is_locked {
                    debug!("🔒 chunk {chunk_id} unavailable: book {} is locked", book.id);
                    return Ok(LockAcquisition::AlreadyLocked);
                }

                chunk::Entity::update_many()
                    .col_expr(chunk::Column::IsLocked, Expr::value(true))
                    .col_expr(chunk::Column::LockedByJobId, Expr::value(job_id))
                    .filter(chunk::Column::Id.eq(chunk_id))
                    .filter(chunk::Column::IsLocked.eq(false))
                    .exec(conn)
                    .await?
                    .rows_affected
                    == 1
            }
            None => {
                let locked_chunks = chunk::Entity::find()
                    .filter(chunk::Column::BookId.eq(book.id))
                    .filter(chunk::Column::IsLocked.eq(true))
                    .count(conn)
                    .await?;
                if locked_chunks > 0 {
                    debug!(
                        "🔒 book {} unavailable: {locked_chunks} chunk(s) locked",
                        book.id
                    );
                    return Ok(LockAcquisition::AlreadyLocked);
                }

                book::Entity::update_many()
                    .col_expr(book::Column::IsLocked, Expr::value(true))
                    .col_expr(book::Column::LockedByJobId, Expr::value(job_id))
                    .filter(book::Column::Id.eq(book.id))
                    .filter(book::Column::IsLocked.eq(false))
                    .exec(conn)
                    .await?
                    .rows_affected
                    == 1
            }
        };

        if acquired {
            debug!("🔒 {} locked by job {}", target.entity(), job_id);
            Ok(LockAcquisition::Acquired(LockHandle {
                entity: target.entity(),
                job_id,
            }))
        } else {
            Ok(LockAcquisition::AlreadyLocked)
        }
    }

    /// Clears the lock if `handle`'s job holds it. Returns whether anything was released.
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        handle: &LockHandle,
    ) -> Result<bool, DbErr> {
        let no_holder: Option<Uuid> = None;

        let rows_affected = match handle.entity {
            LockableEntity::Book(book_id) => {
                book::Entity::update_many()
                    .col_expr(book::Column::IsLocked, Expr::value(false))
                    .col_expr(book::Column::LockedByJobId, Expr::value(no_holder))
                    .filter(book::Column::Id.eq(book_id))
                    .filter(book::Column::LockedByJobId.eq(handle.job_id))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
            LockableEntity::Chunk(chunk_id) => {
                chunk::Entity::update_many()
                    .col_expr(chunk::Column::IsLocked, Expr::value(false))
                    .col_expr(chunk::Column::LockedByJobId, Expr::value(no_holder))
                    .filter(chunk::Column::Id.eq(chunk_id))
                    .filter(chunk::Column::LockedByJobId.eq(handle.job_id))
                    .exec(conn)
                    .await?
                    .rows_affected
            }
        };

        if rows_affected == 0 {
            warn!(
                "🔓 {} was not held by job {} when releasing",
                handle.entity, handle.job_id
            );
            return Ok(false);
        }

        debug!("🔓 {} released by job {}", handle.entity, handle.job_id);
        Ok(true)
    }

    /// The job currently holding `entity`, if any.
    pub async fn holder<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity: LockableEntity,
    ) -> Result<Option<Uuid>, DbErr> {
        let holder = match entity {
            LockableEntity::Book(book_id) => book::Entity::find_by_id(book_id)
                .one(conn)
                .await?
                .and_then(|book| book.locked_by_job_id),
            LockableEntity::Chunk(chunk_id) => chunk::Entity::find_by_id(chunk_id)
                .one(conn)
                .await?
                .and_then(|chunk| chunk.locked_by_job_id),
        };

        Ok(holder)
    }
}
