//! TCP scoring server lifecycle.
//!
//! `start` loads every model, binds the listener and spawns the accept loop.
//! Each accepted connection gets its own task; at most `max_connections`
//! run at once and further clients wait in the listen backlog.
//!
//! `stop` closes the listener immediately, then waits up to
//! `shutdown_grace_ms` for in-flight connections before aborting the rest.

use crate::config::{AppConfig, ScoringConfig, ServerConfig};
use crate::error::ServerError;
use crate::handler::{ConnectionHandler, HandlerLimits};
use crate::metrics::{MetricsReporter, ServerMetrics};
use crate::models::{EnsembleScorer, ModelLoader, ModelRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept, so a persistent error (e.g. out of file
/// descriptors) does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A server ready to bind: registry loaded, scorer configured
pub struct ScoringServer {
    config: ServerConfig,
    scorer: Arc<EnsembleScorer>,
    metrics: Arc<ServerMetrics>,
}

impl ScoringServer {
    /// Wrap an already built registry
    pub fn new(registry: ModelRegistry, scoring: ScoringConfig, config: ServerConfig) -> Self {
        if scoring.pass_score as usize > registry.len() {
            warn!(
                pass_score = scoring.pass_score,
                models = registry.len(),
                "Pass score exceeds model count, no request can pass"
            );
        }

        Self {
            config,
            scorer: Arc::new(EnsembleScorer::new(Arc::new(registry), scoring)),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    /// Load every configured model, then bind and serve.
    ///
    /// Any artifact failure aborts startup before the socket is opened.
    pub async fn start(config: &AppConfig) -> Result<ServerHandle, ServerError> {
        config.validate()?;
        let registry = ModelLoader::new().load_all(&config.models)?;
        Self::new(registry, config.scoring, config.server.clone())
            .bind()
            .await
    }

    /// Bind the configured address and spawn the accept loop
    pub async fn bind(self) -> Result<ServerHandle, ServerError> {
        let addr = self.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if self.config.metrics_interval_secs > 0 {
            let reporter = MetricsReporter::new(self.metrics.clone(), self.config.metrics_interval_secs);
            tokio::spawn(reporter.run(shutdown_rx.clone()));
        }

        let handler = ConnectionHandler::new(
            self.scorer.clone(),
            self.metrics.clone(),
            HandlerLimits::from(&self.config),
        );
        let accept_loop = AcceptLoop {
            listener,
            handler,
            metrics: self.metrics.clone(),
            slots: Arc::new(Semaphore::new(self.config.max_connections)),
            grace: self.config.shutdown_grace(),
        };

        info!(
            addr = %local_addr,
            models = ?self.scorer.registry().names(),
            pass_score = self.scorer.pass_score(),
            anomaly_threshold = self.scorer.anomaly_threshold(),
            max_connections = self.config.max_connections,
            "Scoring server listening"
        );

        let accept_task = tokio::spawn(accept_loop.run(shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            accept_task,
            metrics: self.metrics,
        })
    }
}

/// Control handle for a running server. Dropping it also stops the server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    metrics: Arc<ServerMetrics>,
}

impl ServerHandle {
    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Stop accepting, drain in-flight connections within the grace period
    pub async fn stop(self) {
        info!(addr = %self.local_addr, "Stopping scoring server");
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.accept_task.await {
            error!(error = %e, "Accept loop terminated abnormally");
        }

        self.metrics.print_summary();
        info!("Scoring server stopped");
    }
}

struct AcceptLoop {
    listener: TcpListener,
    handler: ConnectionHandler,
    metrics: Arc<ServerMetrics>,
    slots: Arc<Semaphore>,
    grace: Duration,
}

impl AcceptLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            listener,
            handler,
            metrics,
            slots,
            grace,
        } = self;
        let mut connections = JoinSet::new();

        loop {
            reap(&mut connections);

            // Acquire a slot before accepting (limits concurrent connections)
            let permit = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            metrics.record_connection();
            debug!(peer = %peer, active = connections.len() + 1, "Connection accepted");

            let handler = handler.clone();
            connections.spawn(async move {
                handler.handle(stream, peer).await;
                // Release the slot when done
                drop(permit);
            });
        }

        // Release the listening socket before draining
        drop(listener);

        let in_flight = connections.len();
        if in_flight > 0 {
            info!(in_flight = in_flight, grace_ms = grace.as_millis(), "Waiting for in-flight connections");
        }

        let drain = async {
            while let Some(result) = connections.join_next().await {
                log_panic(result);
            }
        };
        if timeout(grace, drain).await.is_err() {
            warn!(
                aborted = connections.len(),
                "Grace period expired, aborting remaining connections"
            );
            connections.shutdown().await;
        }
    }
}

/// Collect finished connection tasks without waiting
fn reap(connections: &mut JoinSet<()>) {
    while let Some(result) = connections.try_join_next() {
        log_panic(result);
    }
}

fn log_panic(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Connection task panicked");
        }
    }
}
