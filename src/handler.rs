//! Per-connection protocol: one request, one verdict, close.

use crate::config::ServerConfig;
use crate::error::{HandlerError, RequestDecodeError};
use crate::metrics::ServerMetrics;
use crate::models::{EnsembleScorer, ScoreOutcome};
use crate::types::FeatureRecord;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Limits applied to every connection
#[derive(Debug, Clone, Copy)]
pub struct HandlerLimits {
    pub max_request_bytes: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl From<&ServerConfig> for HandlerLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_request_bytes: config.max_request_bytes,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for HandlerLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Bridges one connection to one scorer invocation
#[derive(Clone)]
pub struct ConnectionHandler {
    scorer: Arc<EnsembleScorer>,
    metrics: Arc<ServerMetrics>,
    limits: HandlerLimits,
}

impl ConnectionHandler {
    pub fn new(scorer: Arc<EnsembleScorer>, metrics: Arc<ServerMetrics>, limits: HandlerLimits) -> Self {
        Self {
            scorer,
            metrics,
            limits,
        }
    }

    /// Serve a connection to completion. Failures are logged and counted,
    /// never propagated: they only ever close this connection.
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let start = Instant::now();

        match self.serve(&mut stream).await {
            Ok(outcome) => {
                let elapsed = start.elapsed();
                let names = self.scorer.registry().names();
                self.metrics.record_verdict(
                    &outcome,
                    names.len(),
                    &names[..outcome.models_evaluated],
                    elapsed,
                );
                debug!(
                    peer = %peer,
                    passed = outcome.verdict.passed,
                    score = outcome.verdict.score,
                    models_evaluated = outcome.models_evaluated,
                    processing_time_us = elapsed.as_micros(),
                    "Verdict sent"
                );
            }
            Err(e) => {
                self.metrics.record_failure(&e);
                match &e {
                    HandlerError::Prediction(_) | HandlerError::Task(_) => {
                        error!(peer = %peer, kind = e.kind(), error = %e, "Scoring failed, closing connection")
                    }
                    _ => warn!(peer = %peer, kind = e.kind(), error = %e, "Request rejected, closing connection"),
                }
            }
        }
    }

    /// Read, decode, score and answer one request
    pub async fn serve<S>(&self, stream: &mut S) -> Result<ScoreOutcome, HandlerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.read_request(stream).await?;
        let record = FeatureRecord::decode(&request)?;

        let scorer = self.scorer.clone();
        let outcome = tokio::task::spawn_blocking(move || scorer.score(&record))
            .await
            .map_err(|e| HandlerError::Task(e.to_string()))??;

        let response = outcome.verdict.encode();
        timeout(self.limits.write_timeout, async {
            stream.write_all(response.as_bytes()).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| HandlerError::Timeout("write"))??;

        Ok(outcome)
    }

    /// Single bounded read. The buffer has one spare byte so a request
    /// longer than the limit is detected instead of silently truncated.
    async fn read_request<S>(&self, stream: &mut S) -> Result<Vec<u8>, HandlerError>
    where
        S: AsyncRead + Unpin,
    {
        let limit = self.limits.max_request_bytes;
        let mut buf = vec![0u8; limit + 1];

        let n = timeout(self.limits.read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| HandlerError::Timeout("read"))??;

        if n == 0 {
            return Err(RequestDecodeError::Empty.into());
        }
        if n > limit {
            return Err(RequestDecodeError::Oversized { limit }.into());
        }

        buf.truncate(n);
        Ok(buf)
    }
}
