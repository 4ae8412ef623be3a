//! Process-scoped tool catalog cache.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use super::client::BackendClient;
use super::types::ToolCatalog;
use crate::errors::SessionResult;

/// Tool catalog fetched once and shared by every session that holds the cache.
///
/// Failed fetches are not cached. Concurrent loads wait on a single fetch.
#[derive(Debug, Default)]
pub struct ToolCatalogCache {
    catalog: ArcSwapOption<ToolCatalog>,
    load_lock: Mutex<()>,
}

impl ToolCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached catalog, if loaded.
    pub fn get(&self) -> Option<Arc<ToolCatalog>> {
        self.catalog.load_full()
    }

    /// Return the cached catalog or fetch it from the backend.
    pub async fn get_or_load(&self, client: &BackendClient) -> SessionResult<Arc<ToolCatalog>> {
        if let Some(catalog) = self.get() {
            return Ok(catalog);
        }

        let _guard = self.load_lock.lock().await;
        if let Some(catalog) = self.get() {
            return Ok(catalog);
        }

        let catalog = Arc::new(client.fetch_tools().await?);
        self.catalog.store(Some(catalog.clone()));
        Ok(catalog)
    }

    /// Seed the cache with a known catalog.
    pub fn insert(&self, catalog: ToolCatalog) {
        self.catalog.store(Some(Arc::new(catalog)));
    }

    /// Drop the cached catalog so the next session refetches it.
    pub fn reset(&self) {
        self.catalog.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_catalog_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tools": [{"name": "compare_devices"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let cache = Arc::new(ToolCatalogCache::new());

        let (a, b) = tokio::join!(cache.get_or_load(&client), cache.get_or_load(&client));
        assert_eq!(a.unwrap().tools.len(), 1);
        assert_eq!(b.unwrap().tool_choice, "auto");
        cache.get_or_load(&client).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tools": []})))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri()).unwrap();
        let cache = ToolCatalogCache::new();
        assert!(cache.get_or_load(&client).await.is_err());
        assert!(cache.get().is_none());
        assert!(cache.get_or_load(&client).await.is_ok());
        assert!(cache.get().is_some());
    }

    #[test]
    fn test_reset_clears_catalog() {
        let cache = ToolCatalogCache::new();
        cache.insert(ToolCatalog::default());
        assert!(cache.get().is_some());
        cache.reset();
        assert!(cache.get().is_none());
    }
}
