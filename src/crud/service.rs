//! Business Rule: a generic service wrapping the repository with hooks.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::crud::hooks::{NoHooks, ResourceHooks};
use crate::crud::repository::Repository;
use crate::engine::{Criteria, EngineClient, FindManyArgs, Resource};
use crate::error::{AppError, AppResult};

// == Crud Service ==
/// Operations the controller needs from a resource's business layer.
#[async_trait]
pub trait CrudService<R: Resource>: Send + Sync {
    async fn get_all(&self, args: &FindManyArgs) -> AppResult<Vec<R>>;

    async fn get_single(&self, id: &str) -> AppResult<Option<R>>;

    async fn create(&self, data: R::Create) -> AppResult<R>;

    async fn update(&self, id: &str, data: R::Update) -> AppResult<R>;

    async fn destroy(&self, id: &str) -> AppResult<()>;

    /// Marks a record deleted without removing it.
    async fn soft_delete(&self, _id: &str) -> AppResult<R> {
        Err(AppError::not_implemented("Soft delete"))
    }
}

// == Service ==
pub struct Service<R: Resource, C: EngineClient> {
    repository: Repository<R, C>,
    hooks: Arc<dyn ResourceHooks<R>>,
}

impl<R: Resource, C: EngineClient> Service<R, C> {
    pub fn new(repository: Repository<R, C>) -> Self {
        Self::with_hooks(repository, NoHooks)
    }

    pub fn with_hooks<H>(repository: Repository<R, C>, hooks: H) -> Self
    where
        H: ResourceHooks<R> + 'static,
    {
        Self {
            repository,
            hooks: Arc::new(hooks),
        }
    }

    pub fn repository(&self) -> &Repository<R, C> {
        &self.repository
    }

    /// Logs a failed `after_*` hook. The mutation it observed stays committed.
    fn observe(&self, hook: &'static str, id: &str, result: AppResult<()>) {
        if let Err(err) = result {
            warn!(resource = R::NAME, hook, id, error = %err, "Post-mutation hook failed");
        }
    }
}

#[async_trait]
impl<R: Resource, C: EngineClient> CrudService<R> for Service<R, C> {
    async fn get_all(&self, args: &FindManyArgs) -> AppResult<Vec<R>> {
        self.repository.find_all(args).await
    }

    async fn get_single(&self, id: &str) -> AppResult<Option<R>> {
        self.repository.find_one(&Criteria::id(id)).await
    }

    async fn create(&self, data: R::Create) -> AppResult<R> {
        let data = self.hooks.before_create(data).await?;

        let record = self
            .repository
            .run_in_transaction(move |repo| async move { repo.create(&data).await })
            .await?;

        self.observe("afterCreate", &record.id(), self.hooks.after_create(&record).await);
        Ok(record)
    }

    async fn update(&self, id: &str, data: R::Update) -> AppResult<R> {
        let data = self.hooks.before_update(id, data).await?;
        let criteria = Criteria::id(id);

        let record = self
            .repository
            .run_in_transaction(move |repo| async move { repo.update(&criteria, &data).await })
            .await?;

        self.observe("afterUpdate", id, self.hooks.after_update(&record).await);
        Ok(record)
    }

    async fn destroy(&self, id: &str) -> AppResult<()> {
        self.hooks.before_destroy(id).await?;
        let criteria = Criteria::id(id);

        self.repository
            .run_in_transaction(move |repo| async move { repo.destroy(&criteria).await })
            .await?;

        self.observe("afterDestroy", id, self.hooks.after_destroy(id).await);
        Ok(())
    }

    /// Applies the resource's soft-delete patch, running the destroy hooks
    /// around it.
    async fn soft_delete(&self, id: &str) -> AppResult<R> {
        let Some(patch) = R::soft_delete_patch() else {
            return Err(AppError::not_implemented("Soft delete"));
        };

        self.hooks.before_destroy(id).await?;
        let criteria = Criteria::id(id);

        let record = self
            .repository
            .run_in_transaction(move |repo| async move { repo.update(&criteria, &patch).await })
            .await?;

        self.observe("afterDestroy", id, self.hooks.after_destroy(id).await);
        Ok(record)
    }
}
