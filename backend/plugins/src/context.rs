//! The shared context handed to every lifecycle call.
//!
//! Built once by the embedding application, before bootstrap. Router,
//! database and cache are external collaborators; the runtime only passes
//! them through and closes the last two at shutdown.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;
use hostforge_config::ConfigProvider;
use hostforge_core::EventBus;
use tracing::{debug, warn};

use crate::services::ServiceRegistry;

/// Opaque router handle. Plugins downcast it to the concrete router type the
/// host application uses.
pub type RouterHandle = Arc<dyn Any + Send + Sync>;

/// Minimal database contract the runtime needs.
pub trait Database: Send + Sync {
    fn close(&self) -> Result<()>;
}

/// Minimal cache client contract the runtime needs.
pub trait CacheClient: Send + Sync {
    fn close(&self) -> Result<()>;
}

pub struct AppContext {
    router: Option<RouterHandle>,
    database: Option<Arc<dyn Database>>,
    cache: Option<Arc<dyn CacheClient>>,
    services: Arc<ServiceRegistry>,
    config: ConfigProvider,
    bus: EventBus,
}

impl AppContext {
    pub fn builder(bus: EventBus) -> AppContextBuilder {
        AppContextBuilder {
            router: None,
            database: None,
            cache: None,
            services: None,
            config: ConfigProvider::default(),
            bus,
        }
    }

    pub fn router(&self) -> Option<&RouterHandle> {
        self.router.as_ref()
    }

    /// Downcast the router handle to the host's concrete router type.
    pub fn router_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.router.as_ref().and_then(|r| r.downcast_ref::<T>())
    }

    pub fn database(&self) -> Option<&Arc<dyn Database>> {
        self.database.as_ref()
    }

    pub fn cache(&self) -> Option<&Arc<dyn CacheClient>> {
        self.cache.as_ref()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Root provider over every plugin's configuration block.
    pub fn config(&self) -> &ConfigProvider {
        &self.config
    }

    /// Provider scoped to `plugin`'s block; disabled and empty when absent.
    pub fn plugin_config(&self, plugin: &str) -> ConfigProvider {
        self.config.scoped(plugin)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Close database then cache. Both are attempted; failures are collected.
    pub(crate) fn close_resources(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(db) = &self.database {
            match db.close() {
                Ok(()) => debug!("Database handle closed"),
                Err(e) => {
                    warn!(error = %e, "Failed to close database handle");
                    failures.push(format!("database: {e:#}"));
                }
            }
        }
        if let Some(cache) = &self.cache {
            match cache.close() {
                Ok(()) => debug!("Cache handle closed"),
                Err(e) => {
                    warn!(error = %e, "Failed to close cache handle");
                    failures.push(format!("cache: {e:#}"));
                }
            }
        }
        failures
    }
}

pub struct AppContextBuilder {
    router: Option<RouterHandle>,
    database: Option<Arc<dyn Database>>,
    cache: Option<Arc<dyn CacheClient>>,
    services: Option<Arc<ServiceRegistry>>,
    config: ConfigProvider,
    bus: EventBus,
}

impl AppContextBuilder {
    pub fn router<R: Any + Send + Sync>(mut self, router: Arc<R>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing registry instead of starting with an empty one.
    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn config(mut self, config: ConfigProvider) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> AppContext {
        AppContext {
            router: self.router,
            database: self.database,
            cache: self.cache,
            services: self.services.unwrap_or_default(),
            config: self.config,
            bus: self.bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Routes;

    struct FlakyDb {
        closed: AtomicBool,
    }

    impl Database for FlakyDb {
        fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            anyhow::bail!("connection reset")
        }
    }

    struct Cache {
        closed: AtomicBool,
    }

    impl CacheClient for Cache {
        fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_router_downcast() {
        let ctx = AppContext::builder(EventBus::new())
            .router(Arc::new(Routes::default()))
            .build();
        assert!(ctx.router_as::<Routes>().is_some());
        assert!(ctx.router_as::<String>().is_none());
    }

    #[tokio::test]
    async fn test_plugin_config_is_scoped() {
        let root = ConfigProvider::from_value(&serde_json::json!({
            "audit": {"retentionDays": 30}
        }));
        let ctx = AppContext::builder(EventBus::new()).config(root).build();
        assert_eq!(ctx.plugin_config("audit").get_int("retentionDays", 0), 30);
        assert!(!ctx.plugin_config("users").is_enabled());
    }

    #[tokio::test]
    async fn test_close_resources_attempts_all() {
        let db = Arc::new(FlakyDb {
            closed: AtomicBool::new(false),
        });
        let cache = Arc::new(Cache {
            closed: AtomicBool::new(false),
        });
        let ctx = AppContext::builder(EventBus::new())
            .database(db.clone())
            .cache(cache.clone())
            .build();

        let failures = ctx.close_resources();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("connection reset"));
        assert!(db.closed.load(Ordering::SeqCst));
        assert!(cache.closed.load(Ordering::SeqCst));
    }
}
