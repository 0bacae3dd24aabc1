//! Lifecycle orchestrator.
//!
//! Bootstrap walks the resolved boot order once per phase; shutdown closes
//! the event bus, disables plugins in exact reverse boot order and then
//! closes the context's external resources. Plugin calls never run in
//! parallel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use hostforge_config::RuntimeConfig;
use hostforge_core::{CancelScope, Event};
use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::error::{LifecycleError, RegistrationError, RuntimeError};
use crate::health::HealthReport;
use crate::lifecycle::{Model, Plugin, PluginState};
use crate::registry::PluginRegistry;
use crate::resolver::DependencyResolver;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Upper bound on the reverse disable walk.
    pub shutdown_timeout: Duration,
}

impl RuntimeOptions {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Bootstrap phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Install,
    CollectModels,
    Enable,
    Routes,
    Middlewares,
    SubscribeEvents,
    HealthChecks,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Install,
        Phase::CollectModels,
        Phase::Enable,
        Phase::Routes,
        Phase::Middlewares,
        Phase::SubscribeEvents,
        Phase::HealthChecks,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Install => "install",
            Phase::CollectModels => "collect_models",
            Phase::Enable => "enable",
            Phase::Routes => "routes",
            Phase::Middlewares => "middlewares",
            Phase::SubscribeEvents => "subscribe_events",
            Phase::HealthChecks => "health_checks",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Idle,
    Running,
    Stopped,
}

pub struct Runtime {
    registry: PluginRegistry,
    ctx: Arc<AppContext>,
    options: RuntimeOptions,
    status: Mutex<Status>,
    boot_order: RwLock<Vec<String>>,
    models: RwLock<BTreeMap<String, Vec<Model>>>,
    health_checks: RwLock<Vec<String>>,
}

impl Runtime {
    pub fn new(ctx: impl Into<Arc<AppContext>>) -> Self {
        Self::with_options(ctx, RuntimeOptions::default())
    }

    pub fn with_options(ctx: impl Into<Arc<AppContext>>, options: RuntimeOptions) -> Self {
        Self {
            registry: PluginRegistry::new(),
            ctx: ctx.into(),
            options,
            status: Mutex::new(Status::Idle),
            boot_order: RwLock::default(),
            models: RwLock::default(),
            health_checks: RwLock::default(),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Add a plugin. Only allowed before bootstrap starts.
    ///
    /// The status lock is held across the insert, so a plugin is either seen
    /// by a concurrent bootstrap or rejected.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistrationError> {
        let status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        match *status {
            Status::Idle => self.registry.register(plugin),
            Status::Running => Err(RegistrationError::AlreadyBootstrapped(
                plugin.name().to_string(),
            )),
            Status::Stopped => Err(RegistrationError::Stopped(plugin.name().to_string())),
        }
    }

    /// The order bootstrap would use, without touching any plugin.
    pub fn resolve_order(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(DependencyResolver::resolve(&self.registry.descriptors())?)
    }

    /// Run every bootstrap phase over the resolved boot order.
    ///
    /// A required plugin's failure aborts immediately and leaves the plugins
    /// already started running; call [`shutdown`](Self::shutdown) to unwind.
    pub async fn bootstrap(&self, scope: &CancelScope) -> Result<(), RuntimeError> {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if *status != Status::Idle {
                return Err(RuntimeError::AlreadyBootstrapped);
            }
            *status = Status::Running;
        }

        let order = match self.resolve_order() {
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "Plugin dependency resolution failed");
                *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Status::Idle;
                return Err(e);
            }
        };
        info!(plugins = order.len(), order = ?order, "Bootstrapping plugins");
        *self.boot_order.write().unwrap_or_else(PoisonError::into_inner) = order.clone();

        for phase in Phase::ALL {
            if let Some(reason) = scope.reason() {
                warn!(%phase, %reason, "Bootstrap cancelled");
                return Err(RuntimeError::Cancelled {
                    stage: format!("bootstrap before phase '{phase}'"),
                    reason: reason.to_string(),
                });
            }
            debug!(%phase, "Running bootstrap phase");
            match phase {
                Phase::Install => self.install_all(&order).await?,
                Phase::CollectModels => self.collect_models(&order),
                Phase::Enable => self.enable_all(&order).await?,
                Phase::Routes => self.register_routes(&order),
                Phase::Middlewares => self.register_middlewares(&order),
                Phase::SubscribeEvents => self.subscribe_events(&order),
                Phase::HealthChecks => self.register_health_checks(&order),
            }
        }

        let states = self.registry.states();
        let enabled = states.values().filter(|s| **s == PluginState::Enabled).count();
        let failed = states.values().filter(|s| **s == PluginState::Failed).count();
        info!(enabled, failed, "Bootstrap complete");
        Ok(())
    }

    /// Record a lifecycle failure; only required plugins abort bootstrap.
    fn handle_failure(&self, plugin: &dyn Plugin, err: LifecycleError) -> Result<(), RuntimeError> {
        self.registry.mark_failed(err.plugin(), err.to_string());
        if plugin.options().optional {
            warn!(plugin = %err.plugin(), error = %err, "Optional plugin failed, continuing");
            Ok(())
        } else {
            error!(plugin = %err.plugin(), error = %err, "Required plugin failed");
            Err(err.into())
        }
    }

    /// Plugins in boot order that are currently in `state`.
    fn plugins_in(&self, order: &[String], state: PluginState) -> Vec<(String, Arc<dyn Plugin>)> {
        order
            .iter()
            .filter(|name| self.registry.state(name) == Some(state))
            .filter_map(|name| self.registry.get(name).map(|p| (name.clone(), p)))
            .collect()
    }

    async fn install_all(&self, order: &[String]) -> Result<(), RuntimeError> {
        for (name, plugin) in self.plugins_in(order, PluginState::Registered) {
            let outcome = match plugin.as_installer() {
                Some(installer) => installer.install(&self.ctx).await,
                None => Ok(()),
            };
            match outcome {
                Ok(()) => {
                    self.registry.transition(&name, PluginState::Installed);
                }
                Err(e) => self.handle_failure(
                    plugin.as_ref(),
                    LifecycleError::Install {
                        plugin: name,
                        reason: format!("{e:#}"),
                    },
                )?,
            }
        }
        Ok(())
    }

    fn collect_models(&self, order: &[String]) {
        let mut collected = BTreeMap::new();
        for (name, plugin) in self.plugins_in(order, PluginState::Installed) {
            if let Some(provider) = plugin.as_model_provider() {
                let models = provider.models();
                debug!(plugin = %name, count = models.len(), "Collected plugin models");
                collected.insert(name, models);
            }
        }
        *self.models.write().unwrap_or_else(PoisonError::into_inner) = collected;
    }

    async fn enable_all(&self, order: &[String]) -> Result<(), RuntimeError> {
        for (name, plugin) in self.plugins_in(order, PluginState::Installed) {
            let failed_dependency = plugin
                .dependencies()
                .into_iter()
                .find(|dep| self.registry.state(dep) == Some(PluginState::Failed));
            if let Some(dependency) = failed_dependency {
                self.handle_failure(
                    plugin.as_ref(),
                    LifecycleError::DependencyFailed {
                        plugin: name,
                        dependency,
                    },
                )?;
                continue;
            }

            match plugin.enable(&self.ctx).await {
                Ok(()) => {
                    self.registry.transition(&name, PluginState::Enabled);
                    info!(plugin = %name, version = plugin.version(), "Plugin enabled");
                }
                Err(e) => self.handle_failure(
                    plugin.as_ref(),
                    LifecycleError::Enable {
                        plugin: name,
                        reason: format!("{e:#}"),
                    },
                )?,
            }
        }
        Ok(())
    }

    fn register_routes(&self, order: &[String]) {
        let Some(router) = self.ctx.router() else {
            debug!("No router configured, skipping route registration");
            return;
        };
        for (name, plugin) in self.plugins_in(order, PluginState::Enabled) {
            if let Some(registrar) = plugin.as_route_registrar() {
                registrar.register_routes(router);
                debug!(plugin = %name, "Routes registered");
            }
        }
    }

    fn register_middlewares(&self, order: &[String]) {
        let Some(router) = self.ctx.router() else {
            return;
        };
        for (name, plugin) in self.plugins_in(order, PluginState::Enabled) {
            if let Some(registrar) = plugin.as_middleware_registrar() {
                registrar.register_middlewares(router);
                debug!(plugin = %name, "Middlewares registered");
            }
        }
    }

    fn subscribe_events(&self, order: &[String]) {
        for (name, plugin) in self.plugins_in(order, PluginState::Enabled) {
            if let Some(subscriber) = plugin.as_event_subscriber() {
                subscriber.subscribe_events(self.ctx.bus());
                debug!(plugin = %name, "Event handlers subscribed");
            }
        }
    }

    fn register_health_checks(&self, order: &[String]) {
        let checks: Vec<String> = self
            .plugins_in(order, PluginState::Enabled)
            .into_iter()
            .filter(|(_, plugin)| plugin.as_health_checker().is_some())
            .map(|(name, _)| name)
            .collect();
        debug!(count = checks.len(), "Health checks registered");
        *self.health_checks.write().unwrap_or_else(PoisonError::into_inner) = checks;
    }

    /// Stop the runtime. Safe to call more than once; later calls are no-ops.
    ///
    /// The bus is drained first so no handler observes a disabled plugin.
    /// The reverse disable walk is bounded only by the shutdown timeout: a
    /// cancelled `scope` does not skip it. Every plugin that was `Enabled`
    /// ends up `Disabled`, and database and cache handles are closed even
    /// when the walk times out.
    pub async fn shutdown(&self, scope: &CancelScope) -> Result<(), RuntimeError> {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if *status == Status::Stopped {
                debug!("Runtime already stopped");
                return Ok(());
            }
            *status = Status::Stopped;
        }
        if let Some(reason) = scope.reason() {
            warn!(%reason, "Shutdown scope already done, disabling plugins anyway");
        }
        info!("Shutting down plugin runtime");

        self.ctx.bus().close().await;

        let order = self.boot_order();
        let limit = self.options.shutdown_timeout;
        let walk = tokio::time::timeout(limit, self.disable_in_reverse(&order))
            .await
            .map_err(|_| {
                error!(timeout = ?limit, "Plugin shutdown timed out");
                RuntimeError::ShutdownTimeout(limit)
            });

        let skipped = self.force_disable_remaining(&order);
        if !skipped.is_empty() {
            warn!(plugins = ?skipped, "Marked plugins disabled without calling disable");
        }

        let failures = self.ctx.close_resources();
        walk?;
        if !failures.is_empty() {
            return Err(RuntimeError::ResourceClose(failures.join("; ")));
        }
        info!("Plugin runtime stopped");
        Ok(())
    }

    async fn disable_in_reverse(&self, order: &[String]) {
        for name in order.iter().rev() {
            if self.registry.state(name) != Some(PluginState::Enabled) {
                continue;
            }
            let Some(plugin) = self.registry.get(name) else {
                continue;
            };
            if let Some(disabler) = plugin.as_disabler() {
                if let Err(e) = disabler.disable(&self.ctx).await {
                    warn!(plugin = %name, error = %format!("{e:#}"), "Plugin disable failed");
                }
            }
            self.registry.transition(name, PluginState::Disabled);
            info!(plugin = %name, "Plugin disabled");
        }
    }

    /// Mark plugins the walk never reached as `Disabled`, in reverse boot
    /// order, and return their names.
    fn force_disable_remaining(&self, order: &[String]) -> Vec<String> {
        order
            .iter()
            .rev()
            .filter(|name| self.registry.state(name) == Some(PluginState::Enabled))
            .filter(|name| self.registry.transition(name, PluginState::Disabled))
            .cloned()
            .collect()
    }

    /// Run a plugin's uninstall hook. The plugin must not be enabled.
    pub async fn uninstall(&self, name: &str) -> Result<(), LifecycleError> {
        let plugin = self
            .registry
            .get(name)
            .ok_or_else(|| LifecycleError::NotFound(name.to_string()))?;
        if self.registry.state(name) == Some(PluginState::Enabled) {
            return Err(LifecycleError::StillEnabled(name.to_string()));
        }
        if let Some(uninstaller) = plugin.as_uninstaller() {
            uninstaller
                .uninstall(&self.ctx)
                .await
                .map_err(|e| LifecycleError::Uninstall {
                    plugin: name.to_string(),
                    reason: format!("{e:#}"),
                })?;
            info!(plugin = %name, "Plugin uninstalled");
        }
        Ok(())
    }

    pub async fn publish(&self, scope: &CancelScope, event: Event) -> Result<(), RuntimeError> {
        Ok(self.ctx.bus().publish(scope, event).await?)
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.registry.state(name)
    }

    /// Last failure recorded for `name`, if it ended up `Failed`.
    pub fn plugin_error(&self, name: &str) -> Option<String> {
        self.registry.last_error(name)
    }

    pub fn list_plugins(&self) -> BTreeMap<String, PluginState> {
        self.registry.states()
    }

    /// Empty until bootstrap has resolved the order.
    pub fn boot_order(&self) -> Vec<String> {
        self.boot_order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Models declared by plugins, keyed by plugin name.
    pub fn models(&self) -> BTreeMap<String, Vec<Model>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Poll every registered health check in boot order. Plugins that are no
    /// longer enabled report unhealthy without being called.
    pub async fn health(&self) -> HealthReport {
        let checks = self
            .health_checks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut report = HealthReport::new();
        for name in checks {
            match self.registry.state(&name) {
                Some(PluginState::Enabled) => {}
                Some(state) => {
                    report.record(name, Err(anyhow::anyhow!("plugin is {state}")), Duration::ZERO);
                    continue;
                }
                None => continue,
            }
            let Some(plugin) = self.registry.get(&name) else {
                continue;
            };
            let Some(checker) = plugin.as_health_checker() else {
                continue;
            };
            let started = Instant::now();
            let outcome = checker.health_check().await;
            if let Err(e) = &outcome {
                warn!(plugin = %name, error = %e, "Health check failed");
            }
            report.record(name, outcome, started.elapsed());
        }
        report
    }
}
