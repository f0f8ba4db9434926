use std::sync::Arc;

use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

use crate::{
    app::App,
    boot::read_config,
    config::Config,
    database::{
        migrations::Migrator,
        models::{book, chunk, job, job_state::JobState},
        setup_database,
    },
    environment::Environment,
    generation::{Generator, MockGenerator},
    job_queue::{JobQueue, NewJob},
    jobs::{JobContext, JobProcessor, JobRegistry, JobTarget, LockManager},
    library::{Library, NewBook},
    model_catalog::ModelCatalog,
};

static TRACING_INITIALIZED: std::sync::Once = std::sync::Once::new();

/// Initialize tracing for tests
fn init_tracing() {
    TRACING_INITIALIZED.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .init();
    });
}

/// Sets up an isolated test environment.
///
/// The test configuration points at an in-memory SQLite database, so every call gets its own
/// freshly migrated database that disappears when the returned `TestUtils` is dropped. The
/// generator is always the mock one, whatever the configuration says.
///
/// # Panics
///
/// Panics if the configuration can't be read or the database can't be set up.
pub async fn setup_test() -> TestUtils {
    init_tracing();

    debug!("Setting up test");

    let environment = Environment::Test;
    let config = read_config(&environment).expect("Failed to read test configuration");
    let db = setup_database::<Migrator>(&config.database)
        .await
        .expect("Failed to set up the test database");

    TestUtils {
        job_queue: JobQueue::new(db.clone()),
        library: Library::new(db.clone()),
        generator: Generator::mock(),
        model_catalog: Arc::new(ModelCatalog::builtin()),
        db,
        config,
        environment,
    }
}

/// A handler context outside of any processor or database, for calling handlers directly.
pub fn context_for_tests(job_type: &str) -> JobContext {
    let book = book::Model {
        id: Uuid::now_v7(),
        title: "Test book".to_string(),
        forced_model: None,
        model_defaults: serde_json::json!({}),
        is_locked: false,
        locked_by_job_id: None,
        created_at: chrono::Utc::now().naive_utc(),
    };

    JobContext::new(
        Uuid::now_v7(),
        job_type,
        book,
        None,
        Generator::mock(),
        Arc::new(ModelCatalog::builtin()),
    )
}

/// Database access and fixtures for tests.
///
/// Fields can be changed before calling [`TestUtils::processor`], e.g. to tighten
/// `config.jobs` for a single test.
pub struct TestUtils {
    pub db: DatabaseConnection,
    pub config: Config,
    pub environment: Environment,
    pub job_queue: JobQueue,
    pub library: Library,
    pub generator: Generator,
    pub model_catalog: Arc<ModelCatalog>,
}

impl TestUtils {
    pub fn app(&self) -> App {
        App {
            config: self.config.clone(),
            environment: self.environment,
            db: self.db.clone(),
            job_queue: self.job_queue.clone(),
            library: self.library.clone(),
            generator: self.generator.clone(),
            model_catalog: Arc::clone(&self.model_catalog),
        }
    }

    /// A processor over the test database running the given handlers.
    pub fn processor(&self, registry: JobRegistry) -> JobProcessor {
        JobProcessor::new(&self.app(), registry, LockManager::new())
    }

    /// Polls until nothing more can start and every started job has been finalized.
    pub async fn run_until_idle(&self, processor: &JobProcessor) {
        loop {
            let report = processor.poll_once().await.expect("Poll cycle failed");
            processor.wait_for_in_flight().await;
            if report.is_idle() {
                break;
            }
        }
    }

    /// The scripted generator every handler in this test talks to.
    pub fn mock_generator(&self) -> &MockGenerator {
        self.generator
            .as_mock()
            .expect("Mock generator should be used in tests")
    }

    pub async fn create_book(&self, title: &str) -> book::Model {
        self.library
            .create_book(NewBook::titled(title))
            .await
            .expect("Failed to create book")
    }

    pub async fn create_chunk(&self, book_id: Uuid, content: &str) -> chunk::Model {
        self.library
            .append_chunk(book_id, None, content)
            .await
            .expect("Failed to create chunk")
    }

    pub async fn enqueue(
        &self,
        job_type: &str,
        book_id: Uuid,
        chunk_id: Option<Uuid>,
        parameters: serde_json::Value,
    ) -> job::Model {
        self.job_queue
            .create_job(NewJob::new(
                job_type,
                JobTarget { book_id, chunk_id },
                parameters,
            ))
            .await
            .expect("Failed to create job")
    }

    pub async fn book(&self, book_id: Uuid) -> book::Model {
        book::Entity::find_by_id(book_id)
            .one(&self.db)
            .await
            .expect("Failed to load book")
            .expect("Book should exist")
    }

    pub async fn chunk(&self, chunk_id: Uuid) -> chunk::Model {
        chunk::Entity::find_by_id(chunk_id)
            .one(&self.db)
            .await
            .expect("Failed to load chunk")
            .expect("Chunk should exist")
    }

    pub async fn chunks(&self, book_id: Uuid) -> Vec<chunk::Model> {
        self.library
            .list_chunks(book_id)
            .await
            .expect("Failed to list chunks")
    }

    pub async fn job(&self, job_id: Uuid) -> job::Model {
        self.job_queue
            .get_job(job_id)
            .await
            .expect("Job should exist")
    }

    pub async fn delete_chunk(&self, chunk_id: Uuid) {
        chunk::Entity::delete_by_id(chunk_id)
            .exec(&self.db)
            .await
            .expect("Failed to delete chunk");
    }

    /// Forces a job into a terminal state, as if it had run.
    pub async fn set_state(&self, job_id: Uuid, state: JobState) {
        let now = chrono::Utc::now().naive_utc();
        job::Entity::update_many()
            .col_expr(job::Column::State, Expr::value(state))
            .col_expr(job::Column::StartedAt, Expr::value(now))
            .col_expr(job::Column::CompletedAt, Expr::value(now))
            .filter(job::Column::Id.eq(job_id))
            .exec(&self.db)
            .await
            .expect("Failed to update job state");
    }
}
