//! Scorer Model
//!
//! Learned probability-of-match function over combined candidate+offer
//! feature vectors, with explicit readiness gating, weight snapshots and a
//! neutral-score fallback policy: inference never blocks a recommendation
//! request, it degrades to 0.5 tagged as a fallback.

pub mod network;

use crate::config::ModelConfig;
use crate::models::{ApplicationStatus, CandidateProfile, MlScoreSource, Offer, TrainingApplication};
use crate::services::encoder::FeatureEncoder;
use ndarray::{Array1, Array2};
use network::{FeedForwardNetwork, NetworkSnapshot, TrainingOutcome};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Neutral score served whenever the model cannot produce a real prediction.
pub const NEUTRAL_SCORE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not initialized")]
    NotReady,

    #[error("Model input mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Training already in progress")]
    TrainingInProgress,

    #[error("Snapshot save failed: {0}")]
    SnapshotSave(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Training failed: {0}")]
    Training(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// A match probability plus its provenance. The numeric value follows the
/// same contract for both sources; the tag exists for diagnostics only.
#[derive(Debug, Clone, Copy)]
pub struct MlScore {
    pub value: f32,
    pub source: MlScoreSource,
}

impl MlScore {
    fn fallback() -> Self {
        Self {
            value: NEUTRAL_SCORE,
            source: MlScoreSource::Fallback,
        }
    }
}

/// Summary of a training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub examples: usize,
    pub skipped: usize,
    pub outcome: TrainingOutcome,
}

/// Match-probability model over the encoder's combined vector contract.
///
/// Readiness is explicit: `initialize` must run before `predict` returns real
/// scores; an uninitialized model serves tagged neutral fallbacks instead of
/// paying a surprise init cost on the first request. Training builds a new
/// network and swaps it in atomically, so concurrent readers never observe a
/// half-updated weight set.
pub struct RecommenderModel {
    encoder: Arc<FeatureEncoder>,
    config: ModelConfig,
    network: RwLock<Option<Arc<FeedForwardNetwork>>>,
    train_lock: Mutex<()>,
}

impl RecommenderModel {
    pub fn new(encoder: Arc<FeatureEncoder>, config: ModelConfig) -> Self {
        Self {
            encoder,
            config,
            network: RwLock::new(None),
            train_lock: Mutex::new(()),
        }
    }

    pub fn encoder(&self) -> &Arc<FeatureEncoder> {
        &self.encoder
    }

    pub fn is_ready(&self) -> bool {
        self.network
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Build the network, loading persisted weights when a compatible
    /// snapshot exists. An absent or incompatible snapshot falls back to
    /// random initialization; it is never an error.
    pub fn initialize(&self) -> Result<()> {
        let width = self.encoder.combined_width();
        let network = match self.load_snapshot(width) {
            Some(restored) => {
                info!(input_width = width, "Loaded model weights from snapshot");
                restored
            }
            None => {
                info!(input_width = width, "No usable snapshot, using random initialization");
                FeedForwardNetwork::new(width, self.config.hidden_units, self.config.hidden_units_2)
            }
        };

        let mut guard = self
            .network
            .write()
            .map_err(|_| ModelError::Inference("model lock poisoned".to_string()))?;
        *guard = Some(Arc::new(network));
        Ok(())
    }

    /// Candidate half of the combined vector, reused across every offer in a
    /// recommendation pass.
    pub fn embed(&self, candidate: &CandidateProfile) -> Vec<f32> {
        self.encoder
            .encode_candidate(candidate)
            .to_padded_vector(self.encoder.contract_slots())
    }

    /// Match probability for one offer. Never fails: any internal error is
    /// logged and converted to the neutral fallback score.
    pub fn predict(&self, candidate_embedding: &[f32], offer: &Offer) -> MlScore {
        match self.try_predict(candidate_embedding, offer) {
            Ok(value) => MlScore {
                value,
                source: MlScoreSource::Model,
            },
            Err(e) => {
                error!(
                    offer_id = %offer.id,
                    error = %e,
                    ml_score_source = "fallback",
                    "Falling back to neutral score"
                );
                MlScore::fallback()
            }
        }
    }

    /// Batched variant used by listing annotation: one forward pass over the
    /// whole offer set instead of per-offer inference. Follows the same
    /// fallback policy, per batch.
    pub fn predict_batch(&self, candidate_embedding: &[f32], offers: &[Offer]) -> Vec<MlScore> {
        if offers.is_empty() {
            return Vec::new();
        }
        match self.try_predict_batch(candidate_embedding, offers) {
            Ok(scores) => scores,
            Err(e) => {
                error!(
                    offer_count = offers.len(),
                    error = %e,
                    ml_score_source = "fallback",
                    "Batch inference failed, serving neutral scores"
                );
                vec![MlScore::fallback(); offers.len()]
            }
        }
    }

    fn try_predict(&self, candidate_embedding: &[f32], offer: &Offer) -> Result<f32> {
        let network = self.current_network()?;
        let input = self
            .encoder
            .combined_vector(candidate_embedding, &self.encoder.encode_offer(offer));
        if input.len() != network.input_width() {
            return Err(ModelError::ShapeMismatch {
                expected: network.input_width(),
                actual: input.len(),
            });
        }

        let score = network.predict_one(&input);
        if !score.is_finite() {
            return Err(ModelError::Inference("non-finite score".to_string()));
        }
        Ok(score)
    }

    fn try_predict_batch(&self, candidate_embedding: &[f32], offers: &[Offer]) -> Result<Vec<MlScore>> {
        let network = self.current_network()?;
        let width = network.input_width();

        let mut flat = Vec::with_capacity(offers.len() * width);
        for offer in offers {
            let input = self
                .encoder
                .combined_vector(candidate_embedding, &self.encoder.encode_offer(offer));
            if input.len() != width {
                return Err(ModelError::ShapeMismatch {
                    expected: width,
                    actual: input.len(),
                });
            }
            flat.extend_from_slice(&input);
        }

        let matrix = Array2::from_shape_vec((offers.len(), width), flat)
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        let raw = network.predict(&matrix);

        Ok(offers
            .iter()
            .zip(raw.iter())
            .map(|(offer, &value)| {
                if value.is_finite() {
                    MlScore {
                        value,
                        source: MlScoreSource::Model,
                    }
                } else {
                    error!(
                        offer_id = %offer.id,
                        ml_score_source = "fallback",
                        "Non-finite model output, serving neutral score"
                    );
                    MlScore::fallback()
                }
            })
            .collect())
    }

    /// Retrain from historical application outcomes. Single-flight: a second
    /// trigger while training runs is rejected. On success the snapshot is
    /// persisted first, then the served network is swapped atomically; on any
    /// failure the previously-ready model keeps serving.
    pub fn train(&self, applications: &[TrainingApplication]) -> Result<TrainingReport> {
        let _guard = self
            .train_lock
            .try_lock()
            .map_err(|_| ModelError::TrainingInProgress)?;

        let width = self.encoder.combined_width();
        let mut rows: Vec<f32> = Vec::new();
        let mut labels: Vec<f32> = Vec::new();
        let mut skipped = 0usize;

        for application in applications {
            let (candidate, offer) = match (&application.candidate, &application.offer) {
                (Some(candidate), Some(offer)) => (candidate, offer),
                _ => {
                    warn!(
                        application_id = %application.id,
                        "Skipping training row with missing relation"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let half = self
                .encoder
                .encode_candidate(candidate)
                .to_padded_vector(self.encoder.contract_slots());
            let input = self
                .encoder
                .combined_vector(&half, &self.encoder.encode_offer(offer));
            rows.extend_from_slice(&input);
            labels.push(if application.status == ApplicationStatus::Accepted {
                1.0
            } else {
                0.0
            });
        }

        let examples = labels.len();
        if examples == 0 {
            info!(skipped, "No usable training data, skipping training");
            return Ok(TrainingReport {
                examples: 0,
                skipped,
                outcome: TrainingOutcome::default(),
            });
        }

        info!(examples, skipped, input_width = width, "Training recommender model");

        let x = Array2::from_shape_vec((examples, width), rows)
            .map_err(|e| ModelError::Training(e.to_string()))?;
        let y = Array1::from_vec(labels);

        // Continue from the served weights when compatible, otherwise start
        // fresh (the vocabulary may have changed since the last init).
        let mut network = match self.current_network() {
            Ok(current) if current.input_width() == width => (*current).clone(),
            _ => FeedForwardNetwork::new(width, self.config.hidden_units, self.config.hidden_units_2),
        };

        let outcome = network.fit(&x, &y, &self.config);
        info!(
            epochs_run = outcome.epochs_run,
            train_loss = outcome.train_loss,
            val_loss = outcome.val_loss,
            train_accuracy = outcome.train_accuracy,
            val_accuracy = outcome.val_accuracy,
            stopped_early = outcome.stopped_early,
            "Training complete"
        );

        self.save_snapshot(&network)?;

        let mut guard = self
            .network
            .write()
            .map_err(|_| ModelError::Training("model lock poisoned".to_string()))?;
        *guard = Some(Arc::new(network));

        Ok(TrainingReport {
            examples,
            skipped,
            outcome,
        })
    }

    fn current_network(&self) -> Result<Arc<FeedForwardNetwork>> {
        self.network
            .read()
            .map_err(|_| ModelError::Inference("model lock poisoned".to_string()))?
            .as_ref()
            .cloned()
            .ok_or(ModelError::NotReady)
    }

    fn load_snapshot(&self, expected_width: usize) -> Option<FeedForwardNetwork> {
        let path = Path::new(&self.config.weights_path);
        if !path.exists() {
            return None;
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read weight snapshot");
                return None;
            }
        };

        let snapshot: NetworkSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt weight snapshot, ignoring");
                return None;
            }
        };

        if snapshot.input_width != expected_width {
            warn!(
                snapshot_width = snapshot.input_width,
                expected_width,
                "Snapshot was trained against a different vocabulary, ignoring"
            );
            return None;
        }

        match FeedForwardNetwork::from_snapshot(&snapshot) {
            Ok(network) => Some(network),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid weight snapshot, ignoring");
                None
            }
        }
    }

    fn save_snapshot(&self, network: &FeedForwardNetwork) -> Result<()> {
        let serialized = serde_json::to_string(&network.to_snapshot())
            .map_err(|e| ModelError::SnapshotSave(e.to_string()))?;
        fs::write(&self.config.weights_path, serialized)
            .map_err(|e| ModelError::SnapshotSave(e.to_string()))?;
        debug!(path = %self.config.weights_path, "Model weights persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;
    use uuid::Uuid;

    fn encoder() -> Arc<FeatureEncoder> {
        let catalog = vec!["python".to_string(), "sql".to_string(), "aws".to_string()];
        Arc::new(FeatureEncoder::new(&catalog, &EncoderConfig::default()))
    }

    fn candidate(skills: &[&str]) -> CandidateProfile {
        CandidateProfile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            city: Some("Boston".to_string()),
            expected_salary: Some(80_000.0),
        }
    }

    fn offer(skills: &[&str]) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            title: "Role".to_string(),
            company_name: "Acme".to_string(),
            company_city: Some("Boston".to_string()),
            salary_min: Some(60_000.0),
            salary_max: Some(90_000.0),
            currency: Some("USD".to_string()),
            required_skills: skills.iter().map(|s| s.to_string()).collect(),
            contract_types: vec!["full-time".to_string()],
            modality: vec!["remote".to_string()],
        }
    }

    fn training_row(skills: &[&str], status: ApplicationStatus) -> TrainingApplication {
        TrainingApplication {
            id: Uuid::new_v4(),
            candidate: Some(candidate(skills)),
            offer: Some(offer(&["python", "sql"])),
            status,
        }
    }

    fn model_with_path(path: &str) -> RecommenderModel {
        let config = ModelConfig {
            weights_path: path.to_string(),
            epochs: 5,
            batch_size: 4,
            ..ModelConfig::default()
        };
        RecommenderModel::new(encoder(), config)
    }

    #[test]
    fn test_uninitialized_model_serves_fallback() {
        let model = model_with_path("does-not-exist.json");
        let c = candidate(&["python"]);
        let embedding = model.embed(&c);

        let score = model.predict(&embedding, &offer(&["python"]));
        assert_eq!(score.value, NEUTRAL_SCORE);
        assert_eq!(score.source, MlScoreSource::Fallback);
        assert!(!model.is_ready());
    }

    #[test]
    fn test_initialized_model_predicts_probabilities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let model = model_with_path(path.to_str().unwrap());
        model.initialize().unwrap();

        let embedding = model.embed(&candidate(&["python", "sql"]));
        let score = model.predict(&embedding, &offer(&["python", "sql"]));

        assert_eq!(score.source, MlScoreSource::Model);
        assert!(score.value > 0.0 && score.value < 1.0);
    }

    #[test]
    fn test_predict_batch_matches_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let model = model_with_path(path.to_str().unwrap());
        model.initialize().unwrap();

        let embedding = model.embed(&candidate(&["python"]));
        let offers = vec![offer(&["python"]), offer(&["sql"]), offer(&[])];
        let scores = model.predict_batch(&embedding, &offers);

        assert_eq!(scores.len(), 3);
        for score in scores {
            assert_eq!(score.source, MlScoreSource::Model);
            assert!(score.value > 0.0 && score.value < 1.0);
        }
    }

    #[test]
    fn test_training_without_data_is_a_noop() {
        let model = model_with_path("unused.json");
        let report = model.train(&[]).unwrap();
        assert_eq!(report.examples, 0);
        assert!(!model.is_ready());
    }

    #[test]
    fn test_training_skips_rows_with_missing_relations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let model = model_with_path(path.to_str().unwrap());

        let mut broken = training_row(&["python"], ApplicationStatus::Accepted);
        broken.offer = None;

        let corpus = vec![
            training_row(&["python", "sql"], ApplicationStatus::Accepted),
            training_row(&[], ApplicationStatus::Rejected),
            broken,
        ];

        let report = model.train(&corpus).unwrap();
        assert_eq!(report.examples, 2);
        assert_eq!(report.skipped, 1);
        assert!(model.is_ready());
        assert!(path.exists());
    }

    #[test]
    fn test_trained_snapshot_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");

        let corpus = vec![
            training_row(&["python", "sql"], ApplicationStatus::Accepted),
            training_row(&[], ApplicationStatus::Rejected),
            training_row(&["aws"], ApplicationStatus::Pending),
            training_row(&["python"], ApplicationStatus::Accepted),
        ];

        let trained = model_with_path(path.to_str().unwrap());
        trained.train(&corpus).unwrap();

        let embedding = trained.embed(&candidate(&["python", "sql"]));
        let reference = trained.predict(&embedding, &offer(&["python", "sql"]));

        // A fresh instance pointed at the same snapshot serves identical scores.
        let reloaded = model_with_path(path.to_str().unwrap());
        reloaded.initialize().unwrap();
        let replayed = reloaded.predict(&embedding, &offer(&["python", "sql"]));

        assert_eq!(replayed.source, MlScoreSource::Model);
        assert!((reference.value - replayed.value).abs() < 1e-6);
    }

    #[test]
    fn test_training_is_single_flight() {
        let model = model_with_path("unused.json");
        let _held = model.train_lock.try_lock().unwrap();

        let result = model.train(&[]);
        assert!(matches!(result, Err(ModelError::TrainingInProgress)));
    }
}
