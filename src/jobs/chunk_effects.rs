use chrono::NaiveDateTime;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{database::models::chunk, jobs::job_target::LockableEntity};

/// A chunk write staged by a handler, applied only if the job succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEffect {
    /// Append a new chunk at the end of the book.
    Create {
        chunk_id: Uuid,
        book_id: Uuid,
        title: Option<String>,
        content: String,
    },
    /// Replace a chunk's content and bump its version.
    ReplaceContent {
        chunk_id: Uuid,
        book_id: Uuid,
        content: String,
    },
}

impl ChunkEffect {
    /// Whether holding `held` allows this write. A book lock covers every chunk of the book;
    /// a chunk lock covers only that chunk's content.
    pub fn is_covered_by(&self, held: LockableEntity) -> bool {
        match (self, held) {
            (
                Self::Create { book_id, .. } | Self::ReplaceContent { book_id, .. },
                LockableEntity::Book(locked),
            ) => *book_id == locked,
            (Self::ReplaceContent { chunk_id, .. }, LockableEntity::Chunk(locked)) => {
                *chunk_id == locked
            }
            (Self::Create { .. }, LockableEntity::Chunk(_)) => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Create { book_id, .. } => format!("a new chunk in book {book_id}"),
            Self::ReplaceContent { chunk_id, .. } => format!("chunk {chunk_id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("Chunk {0} no longer exists")]
    ChunkMissing(Uuid),
    #[error("Writing {write} needs a lock the job doesn't hold")]
    NotLocked { write: String },
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Applies staged effects in order on `conn`, normally the finalization transaction.
///
/// Every effect must fall under `held`, the entity the job has locked. Nothing is applied if
/// one doesn't.
pub async fn apply_effects<C: ConnectionTrait>(
    conn: &C,
    held: Option<LockableEntity>,
    effects: &[ChunkEffect],
    now: NaiveDateTime,
) -> Result<(), EffectError> {
    if let Some(outside) = effects
        .iter()
        .find(|effect| !held.is_some_and(|held| effect.is_covered_by(held)))
    {
        return Err(EffectError::NotLocked {
            write: outside.describe(),
        });
    }

    for effect in effects {
        match effect {
            ChunkEffect::Create {
                chunk_id,
                book_id,
                title,
                content,
            } => {
                let position = next_position(conn, *book_id).await?;

                chunk::ActiveModel {
                    id: Set(*chunk_id),
                    book_id: Set(*book_id),
                    position: Set(position),
                    title: Set(title.clone()),
                    content: Set(content.clone()),
                    version: Set(1),
                    is_locked: Set(false),
                    locked_by_job_id: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(conn)
                .await?;
            }
            ChunkEffect::ReplaceContent {
                chunk_id,
                book_id,
                content,
            } => {
                let updated = chunk::Entity::update_many()
                    .col_expr(chunk::Column::Content, Expr::value(content.clone()))
                    .col_expr(
                        chunk::Column::Version,
                        Expr::col(chunk::Column::Version).add(1),
                    )
                    .col_expr(chunk::Column::UpdatedAt, Expr::value(now))
                    .filter(chunk::Column::Id.eq(*chunk_id))
                    .filter(chunk::Column::BookId.eq(*book_id))
                    .exec(conn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(EffectError::ChunkMissing(*chunk_id));
                }
            }
        }
    }

    Ok(())
}

pub(crate) async fn next_position<C: ConnectionTrait>(
    conn: &C,
    book_id: Uuid,
) -> Result<i32, DbErr> {
    let last = chunk::Entity::find()
        .filter(chunk::Column::BookId.eq(book_id))
        .order_by_desc(chunk::Column::Position)
        .one(conn)
        .await?;

    Ok(last.map_or(0, |chunk| chunk.position + 1))
}
