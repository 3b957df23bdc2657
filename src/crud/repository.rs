//! Data Access: a generic repository over one resource type.
//!
//! Reads pass straight through to the engine. Every mutation runs inside a
//! transaction, either one it opens itself or the one it was scoped to by
//! [`Repository::run_in_transaction`].

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error};

use crate::engine::{Criteria, EngineClient, EngineError, FindManyArgs, ModelDelegate, Resource};
use crate::error::{AppError, AppResult};

pub struct Repository<R: Resource, C: EngineClient> {
    client: Arc<C>,
    model: Arc<dyn ModelDelegate<R, C>>,
    conn: Arc<C::Conn>,
    in_transaction: bool,
}

impl<R: Resource, C: EngineClient> Clone for Repository<R, C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            model: Arc::clone(&self.model),
            conn: Arc::clone(&self.conn),
            in_transaction: self.in_transaction,
        }
    }
}

impl<R: Resource, C: EngineClient> Repository<R, C> {
    /// Binds a resource's model delegate to an engine client.
    pub fn new<M>(client: Arc<C>, model: M) -> Self
    where
        M: ModelDelegate<R, C> + 'static,
    {
        let conn = Arc::new(client.connection());
        Self {
            client,
            model: Arc::new(model),
            conn,
            in_transaction: false,
        }
    }

    /// Whether this instance runs on an open transaction.
    pub fn is_transactional(&self) -> bool {
        self.in_transaction
    }

    // == Reads ==
    pub async fn find_all(&self, args: &FindManyArgs) -> AppResult<Vec<R>> {
        self.model
            .find_many(&self.conn, args)
            .await
            .map_err(|err| self.fail("findAll", err))
    }

    pub async fn find_one(&self, criteria: &Criteria) -> AppResult<Option<R>> {
        self.model
            .find_unique(&self.conn, criteria)
            .await
            .map_err(|err| self.fail("findOne", err))
    }

    // == Writes ==
    pub async fn create(&self, data: &R::Create) -> AppResult<R> {
        self.run_in_transaction(|repo| async move {
            repo.model
                .create(&repo.conn, data)
                .await
                .map_err(|err| repo.fail("create", err))
        })
        .await
    }

    pub async fn update(&self, criteria: &Criteria, data: &R::Update) -> AppResult<R> {
        self.run_in_transaction(|repo| async move {
            repo.model
                .update(&repo.conn, criteria, data)
                .await
                .map_err(|err| repo.fail("update", err))
        })
        .await
    }

    pub async fn destroy(&self, criteria: &Criteria) -> AppResult<()> {
        self.run_in_transaction(|repo| async move {
            repo.model
                .delete(&repo.conn, criteria)
                .await
                .map(|_| ())
                .map_err(|err| repo.fail("destroy", err))
        })
        .await
    }

    // == Transactions ==
    /// Runs `f` with a transaction-scoped repository.
    ///
    /// Commits when `f` succeeds and rolls back when it fails, returning
    /// `f`'s error. Called on an instance that is already transactional,
    /// `f` joins the open transaction instead of starting another.
    pub async fn run_in_transaction<T, F, Fut>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(Self) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        if self.in_transaction {
            return f(self.clone()).await;
        }

        let conn = Arc::new(
            self.client
                .begin()
                .await
                .map_err(|err| self.fail("begin", err))?,
        );
        let scoped = Self {
            client: Arc::clone(&self.client),
            model: Arc::clone(&self.model),
            conn: Arc::clone(&conn),
            in_transaction: true,
        };

        match f(scoped).await {
            Ok(value) => {
                if let Err(err) = self.client.commit(&conn).await {
                    self.rollback_quietly(&conn).await;
                    return Err(self.fail("commit", err));
                }
                debug!(resource = R::NAME, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                self.rollback_quietly(&conn).await;
                Err(err)
            }
        }
    }

    async fn rollback_quietly(&self, conn: &C::Conn) {
        match self.client.rollback(conn).await {
            Ok(()) => debug!(resource = R::NAME, "Transaction rolled back"),
            Err(err) => error!(
                resource = R::NAME,
                error = %err,
                "Failed to roll back transaction"
            ),
        }
    }

    fn fail(&self, operation: &'static str, err: EngineError) -> AppError {
        error!(
            resource = R::NAME,
            operation,
            error = %err,
            "Data access operation failed"
        );
        AppError::Engine(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{KnownErrorCode, MemoryEngine};
    use serde::{Deserialize, Serialize};
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        id: String,
        label: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct NewTag {
        label: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TagPatch {
        label: String,
    }

    impl Resource for Tag {
        type Create = NewTag;
        type Update = TagPatch;
        const NAME: &'static str = "tags";

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn repository() -> (MemoryEngine, Repository<Tag, MemoryEngine>) {
        let engine = MemoryEngine::with_unique(&[("tags", "label")]);
        let repo = Repository::new(Arc::new(engine.clone()), engine.model::<Tag>());
        (engine, repo)
    }

    fn new_tag(label: &str) -> NewTag {
        NewTag {
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let (_engine, repo) = repository();

        let created = assert_ok!(repo.create(&new_tag("rust")).await);
        let found = assert_ok!(repo.find_one(&Criteria::id(&created.id)).await);

        assert_eq!(found, Some(created));
        assert_eq!(repo.find_all(&FindManyArgs::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_errors_propagate_unchanged() {
        let (_engine, repo) = repository();
        repo.create(&new_tag("rust")).await.unwrap();

        let err = repo.create(&new_tag("rust")).await.unwrap_err();
        match err {
            AppError::Engine(EngineError::Known(known)) => {
                assert_eq!(known.code, KnownErrorCode::UniqueViolation);
                assert_eq!(known.target.as_deref(), Some("label"));
            }
            other => panic!("expected engine error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_and_destroy_missing_record() {
        let (_engine, repo) = repository();
        let patch = TagPatch {
            label: "x".to_string(),
        };

        let update = repo.update(&Criteria::id("404"), &patch).await.unwrap_err();
        assert!(matches!(
            update,
            AppError::Engine(EngineError::Known(ref k)) if k.code == KnownErrorCode::RecordNotFound
        ));

        let destroy = assert_err!(repo.destroy(&Criteria::id("404")).await);
        assert!(matches!(destroy, AppError::Engine(_)));
    }

    #[tokio::test]
    async fn test_run_in_transaction_commits_all_steps() {
        let (engine, repo) = repository();

        let labels = repo
            .run_in_transaction(|tx| async move {
                assert!(tx.is_transactional());
                let a = tx.create(&new_tag("a")).await?;
                let b = tx.create(&new_tag("b")).await?;
                Ok(vec![a.label, b.label])
            })
            .await
            .unwrap();

        assert_eq!(labels, vec!["a", "b"]);
        assert_eq!(engine.count("tags").await, 2);
        assert!(!repo.is_transactional());
    }

    #[tokio::test]
    async fn test_run_in_transaction_rolls_back_on_error() {
        let (engine, repo) = repository();

        let result: AppResult<()> = repo
            .run_in_transaction(|tx| async move {
                tx.create(&new_tag("a")).await?;
                Err(AppError::internal("abort"))
            })
            .await;

        assert!(matches!(result, Err(AppError::Internal(ref m)) if m == "abort"));
        assert_eq!(engine.count("tags").await, 0);

        // The writer lock was released by the rollback
        repo.create(&new_tag("after")).await.unwrap();
        assert_eq!(engine.count("tags").await, 1);
    }

    #[tokio::test]
    async fn test_failed_step_rolls_back_earlier_steps() {
        let (engine, repo) = repository();

        let result = repo
            .run_in_transaction(|tx| async move {
                tx.create(&new_tag("dup")).await?;
                tx.create(&new_tag("dup")).await
            })
            .await;

        assert!(matches!(result, Err(AppError::Engine(_))));
        assert_eq!(engine.count("tags").await, 0);
    }

    #[tokio::test]
    async fn test_nested_transaction_reuses_handle() {
        let (engine, repo) = repository();

        repo.run_in_transaction(|outer| async move {
            outer
                .run_in_transaction(|inner| async move {
                    assert!(inner.is_transactional());
                    inner.create(&new_tag("nested")).await
                })
                .await
        })
        .await
        .unwrap();

        assert_eq!(engine.count("tags").await, 1);
    }
}
