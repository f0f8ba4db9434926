use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The book, and optionally one of its chunks, a job operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobTarget {
    pub book_id: Uuid,
    pub chunk_id: Option<Uuid>,
}

impl JobTarget {
    pub const fn book(book_id: Uuid) -> Self {
        Self {
            book_id,
            chunk_id: None,
        }
    }

    pub const fn chunk(book_id: Uuid, chunk_id: Uuid) -> Self {
        Self {
            book_id,
            chunk_id: Some(chunk_id),
        }
    }

    /// The entity whose lock flag a running job on this target holds.
    pub const fn entity(&self) -> LockableEntity {
        match self.chunk_id {
            Some(chunk_id) => LockableEntity::Chunk(chunk_id),
            None => LockableEntity::Book(self.book_id),
        }
    }
}

impl Display for JobTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.chunk_id {
            Some(chunk_id) => write!(f, "book {} / chunk {}", self.book_id, chunk_id),
            None => write!(f, "book {}", self.book_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockableEntity {
    Book(Uuid),
    Chunk(Uuid),
}

impl Display for LockableEntity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book(id) => write!(f, "book:{id}"),
            Self::Chunk(id) => write!(f, "chunk:{id}"),
        }
    }
}
