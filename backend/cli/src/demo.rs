//! Built-in plugins shipped with the `hostforge` binary.
//!
//! `audit` records user events and exposes its trail as the `audit.service`
//! service. `users` depends on it and owns the `/users` routes. `metrics` is
//! optional; `failOnStart: true` in its config block makes it fail on enable,
//! which leaves the rest of the runtime up.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hostforge_core::{Event, EventBus, EventHandler, Subscription};
use hostforge_plugins::{
    AppContext, Disabler, EventSubscriber, HealthChecker, Installer, MiddlewareRegistrar, Model,
    ModelProvider, Plugin, PluginOptions, RouteRegistrar, RouterHandle, Uninstaller,
};
use tracing::{debug, info};

use crate::router::RouteTable;

pub const AUDIT_SERVICE: &str = "audit.service";
pub const USER_CREATED: &str = "user.created";
pub const USER_DELETED: &str = "user.deleted";

/// Every topic the built-in plugins publish or consume.
pub const TOPICS: [&str; 2] = [USER_CREATED, USER_DELETED];

pub fn builtin_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(AuditPlugin::new()),
        Arc::new(UsersPlugin),
        Arc::new(MetricsPlugin),
    ]
}

/// Persistence model declared by `audit`.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub topic: String,
    pub source: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append-only trail of observed events, shared through the service registry.
#[derive(Default)]
pub struct AuditTrail {
    records: Mutex<Vec<AuditRecord>>,
    retention: Mutex<usize>,
}

impl AuditTrail {
    fn set_retention(&self, max_records: usize) {
        *self.retention.lock().unwrap_or_else(PoisonError::into_inner) = max_records;
    }

    pub fn record(&self, event: &Event) {
        let max = *self.retention.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push(AuditRecord {
            topic: event.name.clone(),
            source: event.source.clone(),
            at: event.timestamp.unwrap_or_else(Utc::now),
        });
        if max > 0 && records.len() > max {
            let excess = records.len() - max;
            records.drain(..excess);
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl EventHandler for AuditTrail {
    fn name(&self) -> &str {
        "audit-trail"
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        self.record(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct AuditPlugin {
    trail: Arc<AuditTrail>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AuditPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for AuditPlugin {
    fn name(&self) -> &str {
        "audit"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn enable(&self, ctx: &AppContext) -> Result<()> {
        let config = ctx.plugin_config(self.name());
        let max_records = config.get_int("maxRecords", 10_000).max(0) as usize;
        self.trail.set_retention(max_records);
        ctx.services()
            .register_arc(AUDIT_SERVICE, Arc::clone(&self.trail))
            .context("publish audit trail")?;
        info!(max_records, "Audit trail ready");
        Ok(())
    }

    fn options(&self) -> PluginOptions {
        PluginOptions::required("Records user events")
    }

    fn as_installer(&self) -> Option<&dyn Installer> {
        Some(self)
    }

    fn as_model_provider(&self) -> Option<&dyn ModelProvider> {
        Some(self)
    }

    fn as_event_subscriber(&self) -> Option<&dyn EventSubscriber> {
        Some(self)
    }

    fn as_disabler(&self) -> Option<&dyn Disabler> {
        Some(self)
    }

    fn as_health_checker(&self) -> Option<&dyn HealthChecker> {
        Some(self)
    }
}

#[async_trait]
impl Installer for AuditPlugin {
    async fn install(&self, _ctx: &AppContext) -> Result<()> {
        debug!("Audit storage prepared");
        Ok(())
    }
}

impl ModelProvider for AuditPlugin {
    fn models(&self) -> Vec<Model> {
        vec![Arc::new(AuditRecord {
            topic: String::new(),
            source: None,
            at: Utc::now(),
        })]
    }
}

impl EventSubscriber for AuditPlugin {
    fn subscribe_events(&self, bus: &EventBus) {
        let handler: Arc<dyn EventHandler> = self.trail.clone();
        let mut subs = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        for topic in TOPICS {
            subs.push(bus.subscribe(topic, Arc::clone(&handler)));
        }
    }
}

#[async_trait]
impl Disabler for AuditPlugin {
    async fn disable(&self, _ctx: &AppContext) -> Result<()> {
        for sub in self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            sub.unsubscribe();
        }
        info!(records = self.trail.records().len(), "Audit trail closed");
        Ok(())
    }
}

#[async_trait]
impl HealthChecker for AuditPlugin {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

pub struct UsersPlugin;

#[async_trait]
impl Plugin for UsersPlugin {
    fn name(&self) -> &str {
        "users"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["audit".to_string()]
    }

    async fn enable(&self, ctx: &AppContext) -> Result<()> {
        let trail = ctx.services().resolve::<AuditTrail>(AUDIT_SERVICE)?;
        debug!(records = trail.records().len(), "Users plugin wired to audit trail");
        Ok(())
    }

    fn options(&self) -> PluginOptions {
        PluginOptions::required("User accounts API")
    }

    fn as_route_registrar(&self) -> Option<&dyn RouteRegistrar> {
        Some(self)
    }

    fn as_middleware_registrar(&self) -> Option<&dyn MiddlewareRegistrar> {
        Some(self)
    }

    fn as_uninstaller(&self) -> Option<&dyn Uninstaller> {
        Some(self)
    }
}

impl RouteRegistrar for UsersPlugin {
    fn register_routes(&self, router: &RouterHandle) {
        if let Some(table) = router.downcast_ref::<RouteTable>() {
            table.route("GET", "/users", self.name());
            table.route("POST", "/users", self.name());
            table.route("DELETE", "/users/:id", self.name());
        }
    }
}

impl MiddlewareRegistrar for UsersPlugin {
    fn register_middlewares(&self, router: &RouterHandle) {
        if let Some(table) = router.downcast_ref::<RouteTable>() {
            table.middleware("users.request-id");
        }
    }
}

#[async_trait]
impl Uninstaller for UsersPlugin {
    async fn uninstall(&self, _ctx: &AppContext) -> Result<()> {
        info!("User tables dropped");
        Ok(())
    }
}

pub struct MetricsPlugin;

#[async_trait]
impl Plugin for MetricsPlugin {
    fn name(&self) -> &str {
        "metrics"
    }

    fn version(&self) -> &str {
        "0.3.0"
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn enable(&self, ctx: &AppContext) -> Result<()> {
        let config = ctx.plugin_config(self.name());
        if config.get_bool("failOnStart", false) {
            anyhow::bail!("metrics exporter refused to start (failOnStart is set)");
        }
        let endpoint = config.get_string("endpoint", "/metrics");
        info!(%endpoint, "Metrics exporter ready");
        Ok(())
    }

    fn options(&self) -> PluginOptions {
        PluginOptions::optional("Prometheus-style metrics exporter")
    }

    fn as_health_checker(&self) -> Option<&dyn HealthChecker> {
        Some(self)
    }
}

#[async_trait]
impl HealthChecker for MetricsPlugin {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
