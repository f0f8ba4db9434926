//! `SeaORM` Entity for books

use std::collections::HashMap;

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::model_catalog::{ModelCategory, ModelPreferences};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "book")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    /// Model every job on this book must use, whatever the job asks for.
    pub forced_model: Option<String>,
    /// Default model per category, e.g. `{"writing": "gpt-4o"}`.
    #[sea_orm(column_type = "JsonBinary")]
    pub model_defaults: Json,
    /// Only ever written by the lock manager.
    pub is_locked: bool,
    pub locked_by_job_id: Option<Uuid>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunk,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunk.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Model preferences stored on the book. Unknown categories in `model_defaults` are ignored.
    #[must_use]
    pub fn model_preferences(&self) -> ModelPreferences {
        let defaults = self
            .model_defaults
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(category, model)| {
                        let category = category.parse::<ModelCategory>().ok()?;
                        Some((category, model.as_str()?.to_string()))
                    })
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();

        ModelPreferences {
            forced_model: self.forced_model.clone(),
            defaults,
        }
    }
}
