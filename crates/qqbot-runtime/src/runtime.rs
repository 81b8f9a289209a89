//! Runtime orchestration.
//!
//! [`QQBotRuntime`] wires the pieces together: it logs the bot in through
//! the gateway, builds the dispatcher from the registered plugins, starts
//! the webhook server and the pending-interaction sweeper, then waits for a
//! shutdown signal.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use qqbot_runtime::QQBotRuntime;
//!
//! // Auto-loads qqbot.toml / qqbot.yaml from the current directory
//! let runtime = QQBotRuntime::new();
//! runtime.register_plugin(&ECHO)?;
//! runtime.run().await?;
//!
//! // Custom configuration
//! let runtime = QQBotRuntime::builder()
//!     .config_file("config/production.toml")
//!     .profile("production")
//!     .build()?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use qqbot_core::{BoxedArchive, BoxedGateway, FileArchive, MemoryArchive};
use qqbot_framework::{
    Dispatcher, HandlerDescriptor, HandlerRegistry, PendingStore, PluginDescriptor,
};
use qqbot_transport::{GatewayClient, ServerHandle, WebhookServer};

use crate::bot::QQBot;
use crate::config::{ArchiveBackend, ConfigLoader, ConfigResult, QQBotConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::processor::EventProcessor;

/// The QQ bot runtime.
///
/// Plugins are registered before [`QQBotRuntime::run`]; the running bot
/// dispatches against a snapshot taken at start.
pub struct QQBotRuntime {
    config: QQBotConfig,
    registry: Mutex<HandlerRegistry>,
    archive: Option<BoxedArchive>,
    running: AtomicBool,
}

impl QQBotRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Falls back to the defaults if no configuration can be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            QQBotConfig::default()
        });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration and initializes logging.
    pub fn from_config(config: &QQBotConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            registry: Mutex::new(HandlerRegistry::new()),
            archive: None,
            running: AtomicBool::new(false),
        }
    }

    /// Uses `archive` instead of the one named by `archive.backend`.
    pub fn with_archive(mut self, archive: BoxedArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &QQBotConfig {
        &self.config
    }

    /// Registers every handler of `plugin`.
    ///
    /// Fails on a handler name already taken within the same kind.
    pub fn register_plugin(&self, plugin: &PluginDescriptor) -> RuntimeResult<usize> {
        Ok(self.registry.lock().register_plugin(plugin)?)
    }

    /// Registers several plugins in order.
    pub fn register_plugins(&self, plugins: &[PluginDescriptor]) -> RuntimeResult<usize> {
        plugins
            .iter()
            .try_fold(0, |total, plugin| Ok(total + self.register_plugin(plugin)?))
    }

    /// Registers a single handler.
    pub fn register_handler(&self, descriptor: HandlerDescriptor) -> RuntimeResult<()> {
        self.registry.lock().register(descriptor)?;
        Ok(())
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns whether the runtime is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Validates the configuration, then starts the bot against the
    /// configured gateway.
    pub async fn start(&self) -> RuntimeResult<RunningBot> {
        validate_config(&self.config)?;

        let gateway = &self.config.gateway;
        let client = GatewayClient::with_timeout(&gateway.url, gateway.timeout())?
            .access_token(gateway.access_token.clone())
            .retry(gateway.retry.to_policy());
        self.start_with(Arc::new(client)).await
    }

    /// Starts the bot against an explicit gateway.
    ///
    /// Logs in, freezes the handler registry, then binds the webhook
    /// listener. The configuration is used as is, so port `0` binds an
    /// ephemeral port.
    pub async fn start_with(&self, gateway: BoxedGateway) -> RuntimeResult<RunningBot> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }

        match self.launch(gateway).await {
            Ok(running) => Ok(running),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn launch(&self, gateway: BoxedGateway) -> RuntimeResult<RunningBot> {
        info!(gateway = %self.config.gateway.url, "Starting QQ bot runtime");

        let identity = QQBot::login(&gateway).await?;
        let archive = self.open_archive(identity.user_id)?;
        let bot = Arc::new(QQBot::logged_in(identity, gateway, archive).await);

        let registry = self.registry.lock().clone();
        if registry.is_empty() {
            warn!("No handlers registered, every message will go unmatched");
        }
        let dispatch = &self.config.dispatch;
        let pending = Arc::new(PendingStore::with_default_ttl(dispatch.selection_ttl()));
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::clone(&pending));

        let processor = Arc::new(EventProcessor::new(bot.clone(), dispatcher));

        let cancel = CancellationToken::new();
        let sweeper = dispatch
            .sweep_interval()
            .map(|every| spawn_sweeper(Arc::clone(&pending), every, cancel.clone()));

        let server = &self.config.server;
        let server = match WebhookServer::listen(
            &server.bind_addr(),
            &server.path,
            processor.clone(),
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                cancel.cancel();
                return Err(e.into());
            }
        };

        info!(
            addr = %server.local_addr(),
            self_id = bot.identity().user_id,
            "QQ bot runtime started"
        );

        Ok(RunningBot {
            bot,
            processor,
            server,
            cancel,
            sweeper,
        })
    }

    /// The archive for account `self_id`: the one given to
    /// [`QQBotRuntime::with_archive`], else the configured backend.
    fn open_archive(&self, self_id: i64) -> RuntimeResult<BoxedArchive> {
        if let Some(archive) = &self.archive {
            return Ok(Arc::clone(archive));
        }

        let config = &self.config.archive;
        let archive: BoxedArchive = match config.backend {
            ArchiveBackend::File => Arc::new(FileArchive::for_account(&config.path, self_id)?),
            ArchiveBackend::Memory => {
                warn!("Using an in-memory archive, messages are lost on restart");
                Arc::new(MemoryArchive::new())
            }
        };
        Ok(archive)
    }

    /// Runs the runtime until a shutdown signal is received.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs the runtime until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        info!("QQ bot is now running. Press Ctrl+C to stop.");

        shutdown.await;

        running.stop().await;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for QQBotRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QQBotRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QQBotRuntime")
            .field("handlers", &self.handler_count())
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn_sweeper(
    pending: Arc<PendingStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = pending.sweep_expired();
                    if removed > 0 {
                        debug!(removed, remaining = pending.len(), "Swept expired interactions");
                    }
                }
            }
        }
    })
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
            }
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RunningBot
// =============================================================================

/// A started bot: the webhook server plus its background tasks.
pub struct RunningBot {
    bot: Arc<QQBot>,
    processor: Arc<EventProcessor>,
    server: ServerHandle,
    cancel: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl RunningBot {
    /// The logged-in bot.
    pub fn bot(&self) -> &Arc<QQBot> {
        &self.bot
    }

    /// The event processor behind the webhook.
    pub fn processor(&self) -> &Arc<EventProcessor> {
        &self.processor
    }

    /// The address the webhook server is bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr()
    }

    /// Stops the webhook server and the sweeper.
    pub async fn stop(self) {
        info!("Stopping QQ bot runtime");
        self.server.shutdown().await;
        self.cancel.cancel();
        if let Some(sweeper) = self.sweeper
            && let Err(e) = sweeper.await
        {
            warn!(error = %e, "Sweeper task panicked");
        }
        info!("QQ bot runtime stopped");
    }
}

impl std::fmt::Debug for RunningBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningBot")
            .field("bot", &self.bot)
            .field("server", &self.server)
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`QQBotRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: QQBotConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> ConfigResult<QQBotRuntime> {
        let config = self.config_loader.load()?;
        Ok(QQBotRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
