//! Test Scoring Client
//!
//! Generates credit-card style records (Time, V1..V28, Amount), sends each one
//! to the scoring server over its own connection and tallies the verdicts.
//! With a records file, each non-blank line of the file is sent as-is instead.
//!
//! Usage: test-client [addr] [count] [fraud_rate] [concurrency] [records_file]

use anyhow::Context;
use ensemble_scoring_server::Verdict;
use futures::future::join_all;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

/// Number of PCA components in the record
const COMPONENTS: usize = 28;

/// Record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
    elapsed_secs: f64,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            elapsed_secs: 0.0,
        }
    }

    /// Components close to the training distribution
    fn generate_legitimate(&mut self) -> Value {
        let components: Vec<f64> = (0..COMPONENTS).map(|_| self.rng.gen_range(-1.5..1.5)).collect();
        let amount = self.rng.gen_range(1.0..250.0);
        self.record(components, amount)
    }

    /// Components far outside the training distribution
    fn generate_suspicious(&mut self) -> Value {
        let components: Vec<f64> = (0..COMPONENTS)
            .map(|_| {
                let magnitude = self.rng.gen_range(4.0..15.0);
                if self.rng.gen_bool(0.5) {
                    magnitude
                } else {
                    -magnitude
                }
            })
            .collect();
        let amount = self.rng.gen_range(500.0..5000.0);
        self.record(components, amount)
    }

    /// One row in column orientation: `{"Time": {"0": ...}, "V1": {"0": ...}, ...}`
    fn record(&mut self, components: Vec<f64>, amount: f64) -> Value {
        self.elapsed_secs += self.rng.gen_range(0.0..30.0);

        let mut row = Map::new();
        row.insert("Time".into(), json!({ "0": self.elapsed_secs.round() }));
        for (i, value) in components.into_iter().enumerate() {
            // Four decimals keeps the request well under the server's read limit
            let value = (value * 1e4).round() / 1e4;
            row.insert(format!("V{}", i + 1), json!({ "0": value }));
        }
        row.insert("Amount".into(), json!({ "0": (amount * 100.0).round() / 100.0 }));
        Value::Object(row)
    }
}

/// Fraction of suspicious records to generate; must be a probability
fn parse_fraud_rate(arg: Option<&str>) -> anyhow::Result<f64> {
    let Some(arg) = arg else {
        return Ok(0.1);
    };
    let rate: f64 = arg
        .parse()
        .with_context(|| format!("fraud_rate '{}' is not a number", arg))?;
    anyhow::ensure!(
        (0.0..=1.0).contains(&rate),
        "fraud_rate must be between 0 and 1, got {}",
        rate
    );
    Ok(rate)
}

/// One request per non-blank line, bytes untouched
fn records_from_lines(text: &str) -> Vec<Vec<u8>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.as_bytes().to_vec())
        .collect()
}

/// Send one request and read the verdict
async fn score(addr: &str, payload: Vec<u8>) -> anyhow::Result<Option<Verdict>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&payload).await?;

    let mut response = String::new();
    timeout(Duration::from_secs(10), stream.read_to_string(&mut response)).await??;

    Ok(Verdict::parse(&response))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Scoring Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).map(|s| s.as_str()).unwrap_or("127.0.0.1:1234");
    let count: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate = parse_fraud_rate(args.get(3).map(|s| s.as_str()))?;
    let concurrency: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(8).max(1);
    let records_file = args.get(5);

    info!(
        addr = %addr,
        count = count,
        fraud_rate = fraud_rate,
        concurrency = concurrency,
        records_file = ?records_file,
        "Configuration loaded"
    );

    let mut payloads = Vec::with_capacity(count);
    let mut suspicious_sent = 0;
    match records_file {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read records file {}", path))?;
            payloads = records_from_lines(&text);
            info!(path = %path, records = payloads.len(), "Records loaded from file");
        }
        None => {
            let mut generator = RecordGenerator::new();
            let mut rng = rand::thread_rng();
            for _ in 0..count {
                let record = if rng.gen_bool(fraud_rate) {
                    suspicious_sent += 1;
                    generator.generate_suspicious()
                } else {
                    generator.generate_legitimate()
                };
                payloads.push(serde_json::to_vec(&record)?);
            }
        }
    }
    let count = payloads.len();

    if let Some(first) = payloads.first() {
        info!(bytes = first.len(), "Sample request size");
    }

    let start = Instant::now();
    let mut passed = 0;
    let mut failed = 0;
    let mut errors = 0;

    for (batch_index, batch) in payloads.chunks(concurrency).enumerate() {
        let results = join_all(batch.iter().cloned().map(|payload| score(addr, payload))).await;

        for result in results {
            match result {
                Ok(Some(verdict)) if verdict.passed => passed += 1,
                Ok(Some(_)) => failed += 1,
                Ok(None) => {
                    warn!("Server closed the connection without a verdict");
                    errors += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Request failed");
                    errors += 1;
                }
            }
        }

        let sent = ((batch_index + 1) * concurrency).min(count);
        if sent % 100 < concurrency || sent == count {
            info!("Scored {}/{} records", sent, count);
        }
    }

    let elapsed = start.elapsed();
    info!(
        passed = passed,
        failed = failed,
        errors = errors,
        suspicious_sent = suspicious_sent,
        elapsed_ms = elapsed.as_millis(),
        throughput = format!("{:.1} req/s", count as f64 / elapsed.as_secs_f64().max(1e-9)),
        "Completed"
    );

    Ok(())
}
