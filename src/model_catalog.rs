//! Catalog of generation models and the rules for picking one for a job.

use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

/// What a job needs a model to be good at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelCategory {
    Writing,
    Editing,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub categories: Vec<ModelCategory>,
    /// Relative output quality, higher is better.
    pub quality: u8,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

impl ModelSpec {
    fn serves(&self, category: ModelCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Constraints a job type puts on model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRequirements {
    pub category: ModelCategory,
}

/// Model preferences configured on a book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelPreferences {
    pub forced_model: Option<String>,
    pub defaults: HashMap<ModelCategory, String>,
}

/// Which rule produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SelectionSource {
    ForcedOverride,
    JobOverride,
    BookDefault,
    CatalogBest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model_id: String,
    pub source: SelectionSource,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelSelectionError {
    #[error("No model in the catalog serves the '{0}' category")]
    NoModelForCategory(ModelCategory),
}

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelSpec>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    pub const fn new(models: Vec<ModelSpec>) -> Self {
        Self { models }
    }

    /// Catalog used when the configuration does not provide one.
    pub fn builtin() -> Self {
        let spec = |id: &str, categories: &[ModelCategory], quality, cost| ModelSpec {
            id: id.to_string(),
            categories: categories.to_vec(),
            quality,
            cost_per_1k_tokens: cost,
        };

        Self::new(vec![
            spec(
                "gpt-4o",
                &[ModelCategory::Writing, ModelCategory::Editing, ModelCategory::Review],
                90,
                0.01,
            ),
            spec(
                "gpt-4o-mini",
                &[ModelCategory::Writing, ModelCategory::Editing, ModelCategory::Review],
                70,
                0.0006,
            ),
            spec(
                "claude-sonnet",
                &[ModelCategory::Writing, ModelCategory::Editing],
                92,
                0.015,
            ),
            spec("llama-3.1-8b", &[ModelCategory::Review], 50, 0.0),
        ])
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|model| model.id == model_id)
    }

    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Highest quality model serving `category`, cheaper first on ties.
    pub fn best_for(&self, category: ModelCategory) -> Option<&ModelSpec> {
        self.models
            .iter()
            .filter(|model| model.serves(category))
            .max_by(|a, b| {
                a.quality.cmp(&b.quality).then_with(|| {
                    b.cost_per_1k_tokens
                        .partial_cmp(&a.cost_per_1k_tokens)
                        .unwrap_or(Ordering::Equal)
                })
            })
    }

    /// Picks the model for a job.
    ///
    /// Priority, highest first: the book's forced model, the job's explicit choice, the book's
    /// default for the required category, then the best catalog model for that category.
    /// Candidates the catalog doesn't know, or that don't serve the category, are skipped.
    pub fn select_model(
        &self,
        requirements: ModelRequirements,
        preferences: &ModelPreferences,
        job_override: Option<&str>,
    ) -> Result<ModelSelection, ModelSelectionError> {
        let category = requirements.category;
        let candidates = [
            (
                preferences.forced_model.as_deref(),
                SelectionSource::ForcedOverride,
            ),
            (job_override, SelectionSource::JobOverride),
            (
                preferences.defaults.get(&category).map(String::as_str),
                SelectionSource::BookDefault,
            ),
        ];

        for (candidate, source) in candidates {
            let Some(model_id) = candidate else {
                continue;
            };

            match self.get(model_id) {
                Some(model) if model.serves(category) => {
                    return Ok(ModelSelection {
                        model_id: model.id.clone(),
                        source,
                    });
                }
                Some(_) => {
                    debug!("Skipping {source} model '{model_id}': does not serve {category}");
                }
                None => {
                    debug!("Skipping {source} model '{model_id}': not in catalog");
                }
            }
        }

        self.best_for(category)
            .map(|model| ModelSelection {
                model_id: model.id.clone(),
                source: SelectionSource::CatalogBest,
            })
            .ok_or(ModelSelectionError::NoModelForCategory(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRITING: ModelRequirements = ModelRequirements {
        category: ModelCategory::Writing,
    };

    fn preferences(forced: Option<&str>, writing_default: Option<&str>) -> ModelPreferences {
        ModelPreferences {
            forced_model: forced.map(str::to_string),
            defaults: writing_default
                .map(|model| HashMap::from([(ModelCategory::Writing, model.to_string())]))
                .unwrap_or_default(),
        }
    }

    #[test]
    fn forced_override_beats_everything() {
        let selection = ModelCatalog::builtin()
            .select_model(
                WRITING,
                &preferences(Some("gpt-4o-mini"), Some("gpt-4o")),
                Some("claude-sonnet"),
            )
            .unwrap();

        assert_eq!(selection.model_id, "gpt-4o-mini");
        assert_eq!(selection.source, SelectionSource::ForcedOverride);
    }

    #[test]
    fn job_override_beats_book_default() {
        let selection = ModelCatalog::builtin()
            .select_model(WRITING, &preferences(None, Some("gpt-4o")), Some("gpt-4o-mini"))
            .unwrap();

        assert_eq!(selection.model_id, "gpt-4o-mini");
        assert_eq!(selection.source, SelectionSource::JobOverride);
    }

    #[test]
    fn book_default_used_without_overrides() {
        let selection = ModelCatalog::builtin()
            .select_model(WRITING, &preferences(None, Some("gpt-4o")), None)
            .unwrap();

        assert_eq!(selection.model_id, "gpt-4o");
        assert_eq!(selection.source, SelectionSource::BookDefault);
    }

    #[test]
    fn falls_back_to_best_model_for_category() {
        let selection = ModelCatalog::builtin()
            .select_model(WRITING, &ModelPreferences::default(), None)
            .unwrap();

        assert_eq!(selection.model_id, "claude-sonnet");
        assert_eq!(selection.source, SelectionSource::CatalogBest);
    }

    #[test]
    fn skips_invalid_candidates() {
        // llama only reviews, and "mystery" is unknown
        let selection = ModelCatalog::builtin()
            .select_model(
                WRITING,
                &preferences(Some("llama-3.1-8b"), Some("mystery")),
                Some("mystery"),
            )
            .unwrap();

        assert_eq!(selection.source, SelectionSource::CatalogBest);
    }

    #[test]
    fn ties_prefer_cheaper_model() {
        let catalog = ModelCatalog::new(vec![
            ModelSpec {
                id: "pricey".to_string(),
                categories: vec![ModelCategory::Review],
                quality: 80,
                cost_per_1k_tokens: 0.02,
            },
            ModelSpec {
                id: "thrifty".to_string(),
                categories: vec![ModelCategory::Review],
                quality: 80,
                cost_per_1k_tokens: 0.001,
            },
        ]);

        assert_eq!(
            catalog.best_for(ModelCategory::Review).map(|m| m.id.as_str()),
            Some("thrifty")
        );
    }

    #[test]
    fn empty_category_is_an_error() {
        let catalog = ModelCatalog::new(Vec::new());

        assert_eq!(
            catalog.select_model(WRITING, &ModelPreferences::default(), None),
            Err(ModelSelectionError::NoModelForCategory(ModelCategory::Writing))
        );
    }
}
