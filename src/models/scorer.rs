//! Ensemble vote scoring with early exit

use crate::config::ScoringConfig;
use crate::error::PredictionError;
use crate::models::predictor::vote;
use crate::models::registry::ModelRegistry;
use crate::types::{FeatureRecord, Verdict};
use std::sync::Arc;
use tracing::trace;

/// Verdict plus how much of the registry was needed to reach it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub verdict: Verdict,
    /// Number of models evaluated, in registration order
    pub models_evaluated: usize,
}

/// Runs registered models in order and sums their votes.
///
/// Evaluation stops as soon as the running score reaches the pass score.
/// Votes are 0 or 1 and only ever added, so stopping early cannot change
/// the verdict.
#[derive(Debug, Clone)]
pub struct EnsembleScorer {
    registry: Arc<ModelRegistry>,
    config: ScoringConfig,
}

impl EnsembleScorer {
    pub fn new(registry: Arc<ModelRegistry>, config: ScoringConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn pass_score(&self) -> u32 {
        self.config.pass_score
    }

    pub fn anomaly_threshold(&self) -> f64 {
        self.config.anomaly_threshold
    }

    /// Score a record, stopping once the outcome is decided
    pub fn score(&self, record: &FeatureRecord) -> Result<ScoreOutcome, PredictionError> {
        self.evaluate(record, true)
    }

    /// Score a record with every model, without early exit
    pub fn score_exhaustive(&self, record: &FeatureRecord) -> Result<ScoreOutcome, PredictionError> {
        self.evaluate(record, false)
    }

    fn evaluate(&self, record: &FeatureRecord, early_exit: bool) -> Result<ScoreOutcome, PredictionError> {
        let pass_score = self.config.pass_score;
        let mut score = 0u32;
        let mut models_evaluated = 0usize;

        for entry in self.registry.iter() {
            let result = entry.predictor.predict(record)?;
            let model_vote = vote(&entry.name, entry.kind, result, self.config.anomaly_threshold)?;
            score += model_vote;
            models_evaluated += 1;

            trace!(
                model = %entry.name,
                kind = %entry.kind,
                result = ?result,
                vote = model_vote,
                score = score,
                "Model evaluated"
            );

            if early_exit && score >= pass_score {
                break;
            }
        }

        Ok(ScoreOutcome {
            verdict: Verdict::new(score >= pass_score, score),
            models_evaluated,
        })
    }
}
