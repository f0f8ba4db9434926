//! Books and their chunks, outside of job execution.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    database::models::{book, chunk},
    jobs::chunk_effects::next_position,
    model_catalog::ModelCategory,
};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Book {0} not found")]
    BookNotFound(Uuid),
    #[error(transparent)]
    Database(#[from] DbErr),
}

#[derive(Debug, Clone, Default)]
pub struct NewBook {
    pub title: String,
    pub forced_model: Option<String>,
    pub model_defaults: Vec<(ModelCategory, String)>,
}

impl NewBook {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Library {
    db: DatabaseConnection,
}

impl Library {
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_book(&self, new_book: NewBook) -> Result<book::Model, LibraryError> {
        let model_defaults: serde_json::Map<String, serde_json::Value> = new_book
            .model_defaults
            .into_iter()
            .map(|(category, model)| (category.to_string(), serde_json::Value::String(model)))
            .collect();

        let book = book::ActiveModel {
            id: Set(Uuid::now_v7()),
            title: Set(new_book.title),
            forced_model: Set(new_book.forced_model),
            model_defaults: Set(serde_json::Value::Object(model_defaults)),
            is_locked: Set(false),
            locked_by_job_id: Set(None),
            created_at: Set(chrono::Utc::now().naive_utc()),
        }
        .insert(&self.db)
        .await?;

        info!("📚 Created book \"{}\" ({})", book.title, book.id);
        Ok(book)
    }

    pub async fn get_book(&self, book_id: Uuid) -> Result<book::Model, LibraryError> {
        book::Entity::find_by_id(book_id)
            .one(&self.db)
            .await?
            .ok_or(LibraryError::BookNotFound(book_id))
    }

    pub async fn list_books(&self) -> Result<Vec<book::Model>, LibraryError> {
        Ok(book::Entity::find()
            .order_by_asc(book::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Appends a chunk to the end of a book.
    pub async fn append_chunk(
        &self,
        book_id: Uuid,
        title: Option<String>,
        content: impl Into<String>,
    ) -> Result<chunk::Model, LibraryError> {
        let book = self.get_book(book_id).await?;
        let now = chrono::Utc::now().naive_utc();

        let chunk = chunk::ActiveModel {
            id: Set(Uuid::now_v7()),
            book_id: Set(book.id),
            position: Set(next_position(&self.db, book.id).await?),
            title: Set(title),
            content: Set(content.into()),
            version: Set(1),
            is_locked: Set(false),
            locked_by_job_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;

        Ok(chunk)
    }

    pub async fn get_chunk(&self, chunk_id: Uuid) -> Result<Option<chunk::Model>, LibraryError> {
        Ok(chunk::Entity::find_by_id(chunk_id).one(&self.db).await?)
    }

    /// Chunks of a book in reading order.
    pub async fn list_chunks(&self, book_id: Uuid) -> Result<Vec<chunk::Model>, LibraryError> {
        Ok(chunk::Entity::find()
            .filter(chunk::Column::BookId.eq(book_id))
            .order_by_asc(chunk::Column::Position)
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::setup_test::setup_test;

    #[tokio::test]
    async fn chunks_are_appended_in_order() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;

        let first = test
            .library
            .append_chunk(book.id, Some("Prologue".to_string()), "Arrakis.")
            .await
            .unwrap();
        let second = test
            .library
            .append_chunk(book.id, None, "Caladan.")
            .await
            .unwrap();

        assert_eq!((first.position, second.position), (0, 1));
        assert_eq!(first.version, 1);
        assert!(!first.is_locked);
        assert_eq!(
            test.library.list_chunks(book.id).await.unwrap(),
            [first, second]
        );
    }

    #[tokio::test]
    async fn book_stores_model_preferences() {
        let test = setup_test().await;

        let book = test
            .library
            .create_book(NewBook {
                title: "Emma".to_string(),
                forced_model: None,
                model_defaults: vec![(ModelCategory::Writing, "claude-sonnet".to_string())],
            })
            .await
            .unwrap();

        let preferences = test.library.get_book(book.id).await.unwrap().model_preferences();
        assert_eq!(
            preferences.defaults.get(&ModelCategory::Writing).map(String::as_str),
            Some("claude-sonnet")
        );
        assert_eq!(preferences.forced_model, None);
    }

    #[tokio::test]
    async fn appending_to_missing_book_fails() {
        let test = setup_test().await;

        assert!(matches!(
            test.library.append_chunk(Uuid::now_v7(), None, "Nowhere.").await,
            Err(LibraryError::BookNotFound(_))
        ));
    }
}
