//! 参考数据缓存
//!
//! Orchestrates "load reference data for session X". Decides freshness from
//! three conditions (same session, age under the TTL, non-empty critical
//! partitions) and refetches from the backend otherwise. Raw payloads are
//! written verbatim to the `raw_data` partition before being split per
//! model, normalized and stored; cache metadata is committed only after all
//! writes for the requested scope succeeded.
//!
//! Network failures bubble to the caller unchanged: a stale read is an
//! acceptable fallback here, so retries belong to the caller, unlike order
//! sync where data must not be lost.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::context::CoreContext;
use crate::core::error::CoreResult;
use crate::records::{Record, RecordSet, normalize};
use crate::store::StoreError;
use crate::store::schema::{PARTITION_METADATA, PARTITION_RAW_DATA, REFERENCE_MODELS};
use crate::util::now_millis;

/// Cache lifetime: data older than this is stale
pub const CACHE_TTL_MS: i64 = 900_000; // 15 minutes

/// Partitions that must be non-empty for the cache to count as fresh,
/// regardless of age
pub const CRITICAL_MODELS: &[&str] = &["products", "categories", "partners"];

/// Key holding the whole RecordSet blob inside a model partition
pub const RECORD_SET_KEY: &str = "__recordset__";

/// Key holding the full remote response inside `raw_data`
pub const RAW_LAST_LOAD_KEY: &str = "last_load";

const CACHE_METADATA_KEY: &str = "cache_metadata";

/// 缓存元数据 - 每个本地数据库一份
///
/// Absence means "never loaded".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub session_id: i64,
    pub loaded_at: i64,
}

/// 参考数据缓存
pub struct DataCache {
    ctx: Arc<CoreContext>,
}

impl DataCache {
    pub fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    // ========== Freshness ==========

    /// Whether the cached data is recent and complete enough to skip a
    /// remote refetch for this session. All three conditions must hold:
    /// same session, age under [`CACHE_TTL_MS`], and every critical
    /// partition non-empty.
    pub fn is_fresh(&self, session_id: i64) -> CoreResult<bool> {
        let Some(meta) = self.metadata()? else {
            return Ok(false);
        };
        if meta.session_id != session_id {
            return Ok(false);
        }
        if now_millis() - meta.loaded_at >= CACHE_TTL_MS {
            return Ok(false);
        }
        for model in CRITICAL_MODELS {
            if self.record_set(model).is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stored cache metadata, `None` when never loaded
    pub fn metadata(&self) -> CoreResult<Option<CacheMetadata>> {
        match self.ctx.store.get(PARTITION_METADATA, CACHE_METADATA_KEY) {
            Ok(Some(blob)) => Ok(Some(serde_json::from_slice(&blob)?)),
            Ok(None) | Err(StoreError::PartitionMissing(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ========== Loading ==========

    /// Load reference data for a session.
    ///
    /// Serves from the local store when fresh (unless `force` is set or a
    /// `specific_model` is requested); otherwise fetches from the backend,
    /// normalizes and stores per model. `specific_model` runs the same
    /// pipeline scoped to one model and leaves the cache metadata untouched
    /// unless that model is the only one in the catalog.
    pub async fn load(
        &self,
        session_id: i64,
        force: bool,
        specific_model: Option<&str>,
    ) -> CoreResult<BTreeMap<String, RecordSet>> {
        if !force && specific_model.is_none() && self.is_fresh(session_id)? {
            tracing::debug!(session_id, "cache fresh, serving local data");
            return Ok(self.cached_sets());
        }

        let models: Vec<&str> = match specific_model {
            Some(model) => vec![model],
            None => REFERENCE_MODELS.to_vec(),
        };
        tracing::info!(
            session_id,
            models = models.len(),
            "fetching reference data from backend"
        );

        let payload = self
            .ctx
            .rpc
            .call("pos", "load_data", json!([session_id]), json!({ "models": &models }))
            .await?;
        if !payload.is_object() {
            tracing::warn!(session_id, "backend returned a non-object data payload");
        }

        // Verbatim copy first, for operator inspection
        self.ctx.store.put(
            PARTITION_RAW_DATA,
            RAW_LAST_LOAD_KEY,
            &serde_json::to_vec(&payload)?,
        )?;

        let mut result = BTreeMap::new();
        for model in &models {
            let raw = payload.get(*model).cloned().unwrap_or(Value::Null);
            self.ctx
                .store
                .put(PARTITION_RAW_DATA, model, &serde_json::to_vec(&raw)?)?;

            let set = normalize(model, &raw);
            self.ctx
                .store
                .put(model, RECORD_SET_KEY, &serde_json::to_vec(&set)?)?;
            result.insert(model.to_string(), set);
        }

        // Metadata moves only once the full scope landed
        let full_scope = specific_model.is_none() || REFERENCE_MODELS.len() == 1;
        if full_scope {
            let meta = CacheMetadata {
                session_id,
                loaded_at: now_millis(),
            };
            self.ctx.store.put(
                PARTITION_METADATA,
                CACHE_METADATA_KEY,
                &serde_json::to_vec(&meta)?,
            )?;
        }

        Ok(result)
    }

    // ========== Typed Accessors ==========
    // Read one partition; missing partitions and malformed blobs degrade to
    // an empty set, these never fail.

    /// RecordSet for one model, empty when absent
    pub fn record_set(&self, model: &str) -> RecordSet {
        match self.ctx.store.get(model, RECORD_SET_KEY) {
            Ok(Some(blob)) => match serde_json::from_slice(&blob) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(model, error = %e, "stored record set unreadable, serving empty");
                    RecordSet::empty(model)
                }
            },
            Ok(None) => RecordSet::empty(model),
            Err(StoreError::PartitionMissing(_)) => RecordSet::empty(model),
            Err(e) => {
                tracing::warn!(model, error = %e, "record set read failed, serving empty");
                RecordSet::empty(model)
            }
        }
    }

    pub fn products(&self) -> Vec<Record> {
        self.record_set("products").records
    }

    pub fn categories(&self) -> Vec<Record> {
        self.record_set("categories").records
    }

    pub fn partners(&self) -> Vec<Record> {
        self.record_set("partners").records
    }

    pub fn taxes(&self) -> Vec<Record> {
        self.record_set("taxes").records
    }

    pub fn payment_methods(&self) -> Vec<Record> {
        self.record_set("payment_methods").records
    }

    /// Last verbatim payload stored for a model (or [`RAW_LAST_LOAD_KEY`]
    /// for the whole response), for operator inspection
    pub fn raw_payload(&self, key: &str) -> Option<Value> {
        match self.ctx.store.get(PARTITION_RAW_DATA, key) {
            Ok(Some(blob)) => serde_json::from_slice(&blob).ok(),
            _ => None,
        }
    }

    fn cached_sets(&self) -> BTreeMap<String, RecordSet> {
        REFERENCE_MODELS
            .iter()
            .map(|model| (model.to_string(), self.record_set(model)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::error::CoreError;
    use crate::rpc::mock::MockTransport;
    use crate::store::schema::SchemaManager;

    fn backend_payload() -> Value {
        json!({
            "products": [{"id": 1, "name": "espresso"}, {"id": 2, "name": "latte"}],
            "categories": {"data": [{"id": 10, "name": "drinks"}], "fields": {"name": {"type": "char"}}},
            "partners": [{"id": 100}],
            "taxes": [{"id": 21, "amount": 21.0}],
            "payment_methods": [{"id": 5, "name": "cash"}],
            "sessions": [],
            "users": [{"id": 7}],
            "config": [{"id": 1}],
        })
    }

    fn cache_with(mock: MockTransport) -> (DataCache, Arc<CoreContext>, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let ctx = CoreContext::with_parts(
            Config::with_overrides("http://localhost:0", "test"),
            SchemaManager::ensure_in_memory().unwrap(),
            mock.clone(),
        );
        (DataCache::new(ctx.clone()), ctx, mock)
    }

    fn set_metadata(ctx: &CoreContext, session_id: i64, loaded_at: i64) {
        let meta = CacheMetadata { session_id, loaded_at };
        ctx.store
            .put(PARTITION_METADATA, CACHE_METADATA_KEY, &serde_json::to_vec(&meta).unwrap())
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_fetches_normalizes_and_stores() {
        let (cache, _ctx, _mock) = cache_with(MockTransport::with_fallback(backend_payload()));

        let sets = cache.load(42, false, None).await.unwrap();
        assert_eq!(sets["products"].record_ids(), vec![1, 2]);
        assert_eq!(sets["categories"].record_ids(), vec![10]);
        assert!(sets["categories"].field_meta.contains_key("name"));
        assert!(sets["sessions"].is_empty());

        // Accessors read what load stored
        assert_eq!(cache.products().len(), 2);
        assert_eq!(cache.payment_methods().len(), 1);

        // Raw payload kept verbatim for inspection
        let raw = cache.raw_payload(RAW_LAST_LOAD_KEY).unwrap();
        assert_eq!(raw["products"][0]["name"], "espresso");
        assert_eq!(cache.raw_payload("categories").unwrap()["data"][0]["id"], 10);

        // Metadata committed for this session
        let meta = cache.metadata().unwrap().unwrap();
        assert_eq!(meta.session_id, 42);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_the_network() {
        let (cache, _ctx, mock) = cache_with(MockTransport::with_fallback(backend_payload()));

        cache.load(42, false, None).await.unwrap();
        assert_eq!(mock.call_count(), 1);

        // Fresh: same session, recent, critical partitions populated
        let sets = cache.load(42, false, None).await.unwrap();
        assert_eq!(sets["products"].record_ids(), vec![1, 2]);
        assert_eq!(mock.call_count(), 1);

        // Force always refetches
        cache.load(42, true, None).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_freshness_boundary() {
        let (cache, ctx, _mock) = cache_with(MockTransport::with_fallback(backend_payload()));
        cache.load(42, false, None).await.unwrap();

        set_metadata(&ctx, 42, now_millis() - (CACHE_TTL_MS - 1));
        assert!(cache.is_fresh(42).unwrap());

        set_metadata(&ctx, 42, now_millis() - (CACHE_TTL_MS + 1));
        assert!(!cache.is_fresh(42).unwrap());
    }

    #[tokio::test]
    async fn test_session_identity_and_critical_stores() {
        let (cache, ctx, _mock) = cache_with(MockTransport::with_fallback(backend_payload()));
        cache.load(42, false, None).await.unwrap();
        assert!(cache.is_fresh(42).unwrap());

        // A different session is stale no matter the age
        assert!(!cache.is_fresh(43).unwrap());

        // An empty critical partition is stale no matter the age
        ctx.store.delete("partners", None).unwrap();
        assert!(!cache.is_fresh(42).unwrap());
    }

    #[tokio::test]
    async fn test_never_loaded_is_stale() {
        let (cache, _ctx, _mock) = cache_with(MockTransport::new());
        assert!(!cache.is_fresh(42).unwrap());
    }

    #[tokio::test]
    async fn test_specific_model_does_not_touch_metadata() {
        let (cache, ctx, _mock) = cache_with(MockTransport::with_fallback(backend_payload()));
        cache.load(42, false, None).await.unwrap();
        let before = cache.metadata().unwrap().unwrap();

        set_metadata(&ctx, before.session_id, before.loaded_at - 10);
        let sets = cache.load(99, false, Some("taxes")).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets["taxes"].record_ids(), vec![21]);

        let after = cache.metadata().unwrap().unwrap();
        assert_eq!(after.session_id, 42);
        assert_eq!(after.loaded_at, before.loaded_at - 10);
    }

    #[tokio::test]
    async fn test_malformed_model_payload_degrades_to_empty() {
        let mock = MockTransport::with_fallback(json!({
            "products": {"data": "not an array"},
            "categories": [{"id": 1}],
        }));
        let (cache, _ctx, _mock) = cache_with(mock);

        let sets = cache.load(42, false, None).await.unwrap();
        assert!(sets["products"].is_empty());
        assert_eq!(sets["categories"].record_ids(), vec![1]);
        // Models absent from the response come back empty too
        assert!(sets["taxes"].is_empty());
    }

    #[tokio::test]
    async fn test_network_failure_bubbles_unchanged() {
        let mock = MockTransport::new();
        mock.push_err(crate::rpc::RpcError::Transport("connection refused".into()));
        let (cache, _ctx, _mock) = cache_with(mock);

        let err = cache.load(42, false, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Rpc(crate::rpc::RpcError::Transport(_))));
        // Nothing was committed
        assert!(cache.metadata().unwrap().is_none());
    }

    #[test]
    fn test_accessors_never_fail_on_missing_partition() {
        let store = crate::store::Store::open_in_memory().unwrap();
        let ctx = CoreContext::with_parts(
            Config::with_overrides("http://localhost:0", "test"),
            store,
            Arc::new(MockTransport::new()),
        );
        let cache = DataCache::new(ctx);
        assert!(cache.products().is_empty());
        assert!(cache.record_set("categories").is_empty());
        assert!(cache.raw_payload(RAW_LAST_LOAD_KEY).is_none());
    }
}
