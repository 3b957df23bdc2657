//! Request Orchestration: a generic controller with read-through caching.
//!
//! Collection reads are cached under `all:<resource>:<query hash>` and
//! single reads under `single:<resource>:<id>`. Writes never repopulate the
//! cache, they evict: every collection key of the resource plus the single
//! key of the touched record, and only after the write succeeded.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::SharedCache;
use crate::crud::query::{parse_query, query_hash, NormalizedQuery};
use crate::crud::service::CrudService;
use crate::engine::{Resource, ID_FIELD};
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, Meta};

/// Default lifetime of cached reads, in seconds
pub const DEFAULT_RESOURCE_TTL: u64 = 300;

// == Options ==
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Path parameter holding the record identifier
    pub id_param: String,
    pub cache_ttl: u64,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            id_param: ID_FIELD.to_string(),
            cache_ttl: DEFAULT_RESOURCE_TTL,
        }
    }
}

// == Resource Controller ==
pub struct ResourceController<R: Resource> {
    service: Arc<dyn CrudService<R>>,
    cache: SharedCache,
    resource_name: String,
    options: ControllerOptions,
    /// Bumped on every eviction, always under the cache write lock
    generation: Arc<AtomicU64>,
}

impl<R: Resource> ResourceController<R> {
    pub fn new(service: Arc<dyn CrudService<R>>, cache: SharedCache) -> Self {
        Self::with_options(service, cache, ControllerOptions::default())
    }

    pub fn with_options(
        service: Arc<dyn CrudService<R>>,
        cache: SharedCache,
        options: ControllerOptions,
    ) -> Self {
        Self {
            service,
            cache,
            resource_name: R::NAME.to_string(),
            options,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn id_param(&self) -> &str {
        &self.options.id_param
    }

    // == Cache Keys ==
    pub fn collection_prefix(&self) -> String {
        format!("all:{}:", self.resource_name)
    }

    pub fn collection_key(&self, query: &NormalizedQuery) -> String {
        format!("{}{}", self.collection_prefix(), query_hash(&query.args))
    }

    pub fn single_key(&self, id: &str) -> String {
        format!("single:{}:{}", self.resource_name, id)
    }

    // == Reads ==
    /// Lists records matching the query parameters.
    ///
    /// Empty results are never cached.
    pub async fn get_all(
        &self,
        params: &HashMap<String, String>,
    ) -> AppResult<ApiResponse<Value>> {
        let query = parse_query(params)?;
        let key = self.collection_key(&query);

        let seen = match self.lookup(&key).await {
            Ok(cached) => return Ok(page_response(cached, &query)),
            Err(seen) => seen,
        };

        let items = self.service.get_all(&query.args).await?;
        let data = encode(&items)?;

        if !items.is_empty() {
            self.fill(key, data.clone(), seen).await;
        }

        Ok(page_response(data, &query))
    }

    pub async fn get_single(
        &self,
        params: &HashMap<String, String>,
    ) -> AppResult<ApiResponse<Value>> {
        let id = self.require_id(params)?;
        let key = self.single_key(id);

        let seen = match self.lookup(&key).await {
            Ok(cached) => return Ok(ApiResponse::success(200, Some(cached))),
            Err(seen) => seen,
        };

        let record = self
            .service
            .get_single(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} not found", self.resource_name)))?;
        let data = encode(&record)?;

        self.fill(key, data.clone(), seen).await;

        Ok(ApiResponse::success(200, Some(data)))
    }

    // == Writes ==
    pub async fn create(&self, body: Value) -> AppResult<ApiResponse<Value>> {
        let data: R::Create = decode(body)?;
        let record = self
            .mutate(None, move |service| async move { service.create(data).await })
            .await?;

        Ok(ApiResponse::success(201, Some(encode(&record)?)))
    }

    pub async fn update(
        &self,
        params: &HashMap<String, String>,
        body: Value,
    ) -> AppResult<ApiResponse<Value>> {
        let id = self.require_id(params)?.to_string();
        let data: R::Update = decode(body)?;
        let record = self
            .mutate(Some(id.clone()), move |service| async move {
                service.update(&id, data).await
            })
            .await?;

        Ok(ApiResponse::success(200, Some(encode(&record)?)))
    }

    pub async fn destroy(
        &self,
        params: &HashMap<String, String>,
    ) -> AppResult<ApiResponse<Value>> {
        let id = self.require_id(params)?.to_string();
        self.mutate(Some(id.clone()), move |service| async move {
            service.destroy(&id).await
        })
        .await?;

        Ok(ApiResponse::success(204, None))
    }

    /// Responds 204 like `destroy`; the patched record is not echoed back.
    pub async fn soft_delete(
        &self,
        params: &HashMap<String, String>,
    ) -> AppResult<ApiResponse<Value>> {
        let id = self.require_id(params)?.to_string();
        self.mutate(Some(id.clone()), move |service| async move {
            service.soft_delete(&id).await
        })
        .await?;

        Ok(ApiResponse::success(204, None))
    }

    // == Helpers ==
    fn require_id<'a>(&self, params: &'a HashMap<String, String>) -> AppResult<&'a str> {
        params
            .get(&self.options.id_param)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::not_found("Missing ID parameter"))
    }

    /// Reads `key`, or returns the eviction generation seen at the miss.
    async fn lookup(&self, key: &str) -> Result<Value, u64> {
        let mut cache = self.cache.write().await;
        match cache.get(key) {
            Some(cached) => Ok(cached),
            None => Err(self.generation.load(Ordering::SeqCst)),
        }
    }

    /// Caches a fetched read unless a write evicted this resource since
    /// the miss, in which case `data` may predate that write.
    async fn fill(&self, key: String, data: Value, seen: u64) {
        let mut cache = self.cache.write().await;
        if self.generation.load(Ordering::SeqCst) != seen {
            debug!(resource = %self.resource_name, key = %key, "Skipped caching stale read");
            return;
        }
        cache.set(key, data, Some(self.options.cache_ttl));
    }

    /// Runs a write and the eviction that follows it on a spawned task.
    ///
    /// Dropping the caller's future (client disconnect, timeout) cannot
    /// separate a committed write from its eviction: the task runs both to
    /// completion on its own.
    async fn mutate<T, F, Fut>(&self, id: Option<String>, op: F) -> AppResult<T>
    where
        F: FnOnce(Arc<dyn CrudService<R>>) -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let pending = op(Arc::clone(&self.service));
        let eviction = Eviction {
            cache: self.cache.clone(),
            generation: Arc::clone(&self.generation),
            resource: self.resource_name.clone(),
            prefix: self.collection_prefix(),
            single: id.map(|id| self.single_key(&id)),
        };

        tokio::spawn(async move {
            let result = pending.await;
            if result.is_ok() {
                eviction.run().await;
            }
            result
        })
        .await
        .map_err(|err| AppError::internal(format!("Write task failed: {}", err)))?
    }
}

// == Eviction ==
/// Keys to drop once a write succeeded.
struct Eviction {
    cache: SharedCache,
    generation: Arc<AtomicU64>,
    resource: String,
    prefix: String,
    single: Option<String>,
}

impl Eviction {
    /// Evicts every collection key and, if set, the single key, in one
    /// critical section.
    async fn run(self) {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        let collections = cache.delete_all_matching_prefix(&self.prefix);
        let single = self.single.map_or(0, |key| cache.del(&[key]));

        debug!(
            resource = %self.resource,
            collections,
            single,
            "Invalidated cached reads"
        );
    }
}

fn page_response(data: Value, query: &NormalizedQuery) -> ApiResponse<Value> {
    let total = data.as_array().map_or(0, |items| items.len() as u64);
    ApiResponse::success(200, Some(data)).with_meta(Meta {
        page: query.page,
        limit: query.limit,
        total,
    })
}

fn encode<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| AppError::internal(format!("Failed to encode response: {}", err)))
}

fn decode<T: DeserializeOwned>(body: Value) -> AppResult<T> {
    serde_json::from_value(body).map_err(|err| AppError::validation("body", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::crud::{Repository, Service};
    use crate::engine::{FindManyArgs, MemoryEngine};
    use async_trait::async_trait;
    use serde::Deserialize;
    use crate::crud::ResourceHooks;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        id: String,
        title: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct NewBook {
        title: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct BookPatch {
        title: String,
    }

    impl Resource for Book {
        type Create = NewBook;
        type Update = BookPatch;
        const NAME: &'static str = "books";

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    /// Counts reads reaching the service.
    struct Counting {
        inner: Service<Book, MemoryEngine>,
        all_reads: AtomicUsize,
        single_reads: AtomicUsize,
    }

    #[async_trait]
    impl CrudService<Book> for Counting {
        async fn get_all(&self, args: &FindManyArgs) -> AppResult<Vec<Book>> {
            self.all_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_all(args).await
        }

        async fn get_single(&self, id: &str) -> AppResult<Option<Book>> {
            self.single_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_single(id).await
        }

        async fn create(&self, data: NewBook) -> AppResult<Book> {
            self.inner.create(data).await
        }

        async fn update(&self, id: &str, data: BookPatch) -> AppResult<Book> {
            self.inner.update(id, data).await
        }

        async fn destroy(&self, id: &str) -> AppResult<()> {
            self.inner.destroy(id).await
        }
    }

    /// Holds every single read after it fetched, until released.
    struct Stalled {
        inner: Service<Book, MemoryEngine>,
        fetched: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CrudService<Book> for Stalled {
        async fn get_all(&self, args: &FindManyArgs) -> AppResult<Vec<Book>> {
            self.inner.get_all(args).await
        }

        async fn get_single(&self, id: &str) -> AppResult<Option<Book>> {
            let record = self.inner.get_single(id).await;
            self.fetched.notify_one();
            self.release.notified().await;
            record
        }

        async fn create(&self, data: NewBook) -> AppResult<Book> {
            self.inner.create(data).await
        }

        async fn update(&self, id: &str, data: BookPatch) -> AppResult<Book> {
            self.inner.update(id, data).await
        }

        async fn destroy(&self, id: &str) -> AppResult<()> {
            self.inner.destroy(id).await
        }
    }

    struct SlowAfterUpdate;

    #[async_trait]
    impl ResourceHooks<Book> for SlowAfterUpdate {
        async fn after_update(&self, _record: &Book) -> AppResult<()> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    fn book_service() -> Service<Book, MemoryEngine> {
        let engine = MemoryEngine::new();
        Service::new(Repository::new(Arc::new(engine.clone()), engine.model::<Book>()))
    }

    fn setup() -> (Arc<Counting>, SharedCache, ResourceController<Book>) {
        let engine = MemoryEngine::new();
        let repository = Repository::new(Arc::new(engine.clone()), engine.model::<Book>());
        let counting = Arc::new(Counting {
            inner: Service::new(repository),
            all_reads: AtomicUsize::new(0),
            single_reads: AtomicUsize::new(0),
        });
        let cache = CacheStore::new(300).shared();
        let controller = ResourceController::new(counting.clone(), cache.clone());
        (counting, cache, controller)
    }

    fn id_params(id: &str) -> HashMap<String, String> {
        HashMap::from([("id".to_string(), id.to_string())])
    }

    async fn create_book(controller: &ResourceController<Book>, title: &str) -> String {
        let resp = controller.create(json!({"title": title})).await.unwrap();
        assert_eq!(resp.status_code, 201);
        resp.data.unwrap()["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_collection_read_through_and_invalidation() {
        let (counting, _cache, controller) = setup();
        for title in ["a", "b", "c"] {
            create_book(&controller, title).await;
        }

        let first = controller.get_all(&HashMap::new()).await.unwrap();
        let second = controller.get_all(&HashMap::new()).await.unwrap();
        assert_eq!(counting.all_reads.load(Ordering::SeqCst), 1);
        assert_eq!(first.data, second.data);
        assert_eq!(second.meta.unwrap().total, 3);

        create_book(&controller, "d").await;

        let third = controller.get_all(&HashMap::new()).await.unwrap();
        assert_eq!(counting.all_reads.load(Ordering::SeqCst), 2);
        assert_eq!(third.data.unwrap().as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_empty_collection_is_not_cached() {
        let (counting, cache, controller) = setup();

        let resp = controller.get_all(&HashMap::new()).await.unwrap();
        assert_eq!(resp.data, Some(json!([])));
        controller.get_all(&HashMap::new()).await.unwrap();

        assert_eq!(counting.all_reads.load(Ordering::SeqCst), 2);
        assert!(cache.read().await.keys().is_empty());
    }

    #[tokio::test]
    async fn test_single_read_caches_record() {
        let (counting, cache, controller) = setup();
        let id = create_book(&controller, "a").await;

        controller.get_single(&id_params(&id)).await.unwrap();
        let resp = controller.get_single(&id_params(&id)).await.unwrap();

        assert_eq!(counting.single_reads.load(Ordering::SeqCst), 1);
        assert_eq!(resp.data.unwrap()["title"], json!("a"));
        assert!(cache
            .read()
            .await
            .keys()
            .contains(&format!("single:books:{}", id)));
    }

    #[tokio::test]
    async fn test_single_read_errors_are_not_found() {
        let (_counting, _cache, controller) = setup();

        let missing_param = controller.get_single(&HashMap::new()).await.unwrap_err();
        assert!(matches!(
            missing_param,
            AppError::Domain { status: 404, ref message } if message == "Missing ID parameter"
        ));

        let absent = controller.get_single(&id_params("999")).await.unwrap_err();
        assert!(matches!(
            absent,
            AppError::Domain { status: 404, ref message } if message == "books not found"
        ));
    }

    #[tokio::test]
    async fn test_update_evicts_single_and_collections() {
        let (counting, cache, controller) = setup();
        let id = create_book(&controller, "a").await;
        let other = create_book(&controller, "b").await;

        controller.get_all(&HashMap::new()).await.unwrap();
        controller.get_single(&id_params(&id)).await.unwrap();
        controller.get_single(&id_params(&other)).await.unwrap();

        let resp = controller
            .update(&id_params(&id), json!({"title": "a2"}))
            .await
            .unwrap();
        assert_eq!(resp.status_code, 200);

        let keys = cache.read().await.keys();
        assert_eq!(keys, vec![format!("single:books:{}", other)]);

        let fresh = controller.get_single(&id_params(&id)).await.unwrap();
        assert_eq!(fresh.data.unwrap()["title"], json!("a2"));
        assert_eq!(counting.single_reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_destroy_responds_no_content() {
        let (_counting, cache, controller) = setup();
        let id = create_book(&controller, "a").await;
        controller.get_single(&id_params(&id)).await.unwrap();

        let resp = controller.destroy(&id_params(&id)).await.unwrap();

        assert_eq!(resp.status_code, 204);
        assert!(resp.data.is_none());
        assert!(cache.read().await.keys().is_empty());
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_cache() {
        let (_counting, cache, controller) = setup();
        create_book(&controller, "a").await;
        controller.get_all(&HashMap::new()).await.unwrap();

        let err = controller
            .update(&id_params("999"), json!({"title": "x"}))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Engine(_)));
        assert_eq!(cache.read().await.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_body_is_validation_error() {
        let (_counting, _cache, controller) = setup();

        let err = controller.create(json!({"name": 1})).await.unwrap_err();
        match err {
            AppError::Validation(issues) => assert_eq!(issues[0].path, "body"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_soft_delete_without_support_is_not_implemented() {
        let (_counting, _cache, controller) = setup();
        let id = create_book(&controller, "a").await;

        let err = controller.soft_delete(&id_params(&id)).await.unwrap_err();
        assert!(matches!(err, AppError::Domain { status: 501, .. }));
    }

    #[tokio::test]
    async fn test_dropped_update_still_evicts() {
        let engine = MemoryEngine::new();
        let repository = Repository::new(Arc::new(engine.clone()), engine.model::<Book>());
        let service = Service::with_hooks(repository, SlowAfterUpdate);
        let cache = CacheStore::new(300).shared();
        let controller = ResourceController::new(Arc::new(service), cache.clone());
        let id = create_book(&controller, "old").await;
        controller.get_single(&id_params(&id)).await.unwrap();

        let params = id_params(&id);
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            controller.update(&params, json!({"title": "new"})),
        )
        .await;
        assert!(outcome.is_err(), "update should outlive the timeout");

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(cache.read().await.keys().is_empty());
        let resp = controller.get_single(&id_params(&id)).await.unwrap();
        assert_eq!(resp.data.unwrap()["title"], json!("new"));
    }

    #[tokio::test]
    async fn test_read_racing_a_write_is_not_cached() {
        let stalled = Arc::new(Stalled {
            inner: book_service(),
            fetched: Notify::new(),
            release: Notify::new(),
        });
        let cache = CacheStore::new(300).shared();
        let controller = Arc::new(ResourceController::new(stalled.clone(), cache.clone()));
        let id = create_book(&controller, "old").await;

        let reader = {
            let controller = Arc::clone(&controller);
            let id = id.clone();
            tokio::spawn(async move { controller.get_single(&id_params(&id)).await })
        };

        stalled.fetched.notified().await;
        controller
            .update(&id_params(&id), json!({"title": "new"}))
            .await
            .unwrap();
        stalled.release.notify_one();

        let stale = reader.await.unwrap().unwrap();
        assert_eq!(stale.data.unwrap()["title"], json!("old"));
        assert!(cache.read().await.keys().is_empty());

        // The next read waits on a fresh release
        stalled.release.notify_one();
        let fresh = controller.get_single(&id_params(&id)).await.unwrap();
        assert_eq!(fresh.data.unwrap()["title"], json!("new"));
    }

    #[tokio::test]
    async fn test_custom_id_param() {
        let engine = MemoryEngine::new();
        let repository = Repository::new(Arc::new(engine.clone()), engine.model::<Book>());
        let controller = ResourceController::with_options(
            Arc::new(Service::new(repository)),
            CacheStore::new(300).shared(),
            ControllerOptions {
                id_param: "bookId".to_string(),
                cache_ttl: 60,
            },
        );
        let id = create_book(&controller, "a").await;

        let params = HashMap::from([("bookId".to_string(), id)]);
        assert!(controller.get_single(&params).await.is_ok());
        assert_eq!(controller.id_param(), "bookId");
    }
}
