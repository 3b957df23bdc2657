//! Per-resource lifecycle hooks run by the service around each mutation.

use async_trait::async_trait;

use crate::engine::Resource;
use crate::error::AppResult;

/// Domain rules for one resource.
///
/// `before_*` hooks may rewrite the payload or reject the operation before
/// the engine is touched. `after_*` hooks observe a committed mutation;
/// their failures are logged by the service and never undo the write.
#[async_trait]
pub trait ResourceHooks<R: Resource>: Send + Sync {
    async fn before_create(&self, data: R::Create) -> AppResult<R::Create> {
        Ok(data)
    }

    async fn after_create(&self, _record: &R) -> AppResult<()> {
        Ok(())
    }

    async fn before_update(&self, _id: &str, data: R::Update) -> AppResult<R::Update> {
        Ok(data)
    }

    async fn after_update(&self, _record: &R) -> AppResult<()> {
        Ok(())
    }

    async fn before_destroy(&self, _id: &str) -> AppResult<()> {
        Ok(())
    }

    async fn after_destroy(&self, _id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Identity hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

#[async_trait]
impl<R: Resource> ResourceHooks<R> for NoHooks {}
