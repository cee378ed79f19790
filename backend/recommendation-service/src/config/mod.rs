use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub encoder: EncoderConfig,
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// Salary normalization cap; salaries above this saturate at 1.0.
    pub salary_cap: f32,
    /// Width of the contract-type indicator. Only the first `contract_slots`
    /// contract types of an offer are represented.
    pub contract_slots: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub weights_path: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub l2_penalty: f32,
    pub dropout_rate: f32,
    pub hidden_units: usize,
    pub hidden_units_2: usize,
    pub validation_split: f32,
    pub early_stopping_patience: usize,
    pub early_stopping_min_delta: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Share of the combined score taken from the model; the heuristic gets
    /// the remainder.
    pub ml_blend_weight: f32,
    /// Multiplicative penalty applied to already-applied offers when the
    /// exclusion rule is waived. 0.3 means the combined score is scaled by 0.7.
    pub applied_penalty: f32,
    /// Requested top_n values below this are floored up to it.
    pub min_top_n: usize,
    pub skill_weight: f32,
    pub location_weight: f32,
    pub salary_weight: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            salary_cap: 200_000.0,
            contract_slots: 4,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: "model-weights.json".to_string(),
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.0005,
            l2_penalty: 0.01,
            dropout_rate: 0.3,
            hidden_units: 32,
            hidden_units_2: 16,
            validation_split: 0.2,
            early_stopping_patience: 5,
            early_stopping_min_delta: 0.01,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ml_blend_weight: 0.5,
            applied_penalty: 0.3,
            min_top_n: 3,
            skill_weight: 0.6,
            location_weight: 0.2,
            salary_weight: 0.2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            model: ModelConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Config::default();

        Config {
            encoder: EncoderConfig {
                salary_cap: env_or("SALARY_CAP", defaults.encoder.salary_cap),
                contract_slots: env_or("CONTRACT_SLOTS", defaults.encoder.contract_slots),
            },
            model: ModelConfig {
                weights_path: env::var("MODEL_WEIGHTS_PATH")
                    .unwrap_or(defaults.model.weights_path),
                epochs: env_or("TRAIN_EPOCHS", defaults.model.epochs),
                batch_size: env_or("TRAIN_BATCH_SIZE", defaults.model.batch_size),
                learning_rate: env_or("TRAIN_LEARNING_RATE", defaults.model.learning_rate),
                l2_penalty: env_or("TRAIN_L2_PENALTY", defaults.model.l2_penalty),
                dropout_rate: env_or("TRAIN_DROPOUT_RATE", defaults.model.dropout_rate),
                hidden_units: env_or("MODEL_HIDDEN_UNITS", defaults.model.hidden_units),
                hidden_units_2: env_or("MODEL_HIDDEN_UNITS_2", defaults.model.hidden_units_2),
                validation_split: env_or("TRAIN_VALIDATION_SPLIT", defaults.model.validation_split),
                early_stopping_patience: env_or(
                    "TRAIN_EARLY_STOPPING_PATIENCE",
                    defaults.model.early_stopping_patience,
                ),
                early_stopping_min_delta: env_or(
                    "TRAIN_EARLY_STOPPING_MIN_DELTA",
                    defaults.model.early_stopping_min_delta,
                ),
            },
            scoring: ScoringConfig {
                ml_blend_weight: env_or("ML_BLEND_WEIGHT", defaults.scoring.ml_blend_weight),
                applied_penalty: env_or("APPLIED_PENALTY", defaults.scoring.applied_penalty),
                min_top_n: env_or("MIN_TOP_N", defaults.scoring.min_top_n),
                skill_weight: env_or("HEURISTIC_SKILL_WEIGHT", defaults.scoring.skill_weight),
                location_weight: env_or(
                    "HEURISTIC_LOCATION_WEIGHT",
                    defaults.scoring.location_weight,
                ),
                salary_weight: env_or("HEURISTIC_SALARY_WEIGHT", defaults.scoring.salary_weight),
            },
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.encoder.salary_cap, 200_000.0);
        assert_eq!(config.encoder.contract_slots, 4);
        assert_eq!(config.scoring.ml_blend_weight, 0.5);
        assert_eq!(config.scoring.applied_penalty, 0.3);
        assert_eq!(config.scoring.min_top_n, 3);
        assert_eq!(config.model.epochs, 20);
        assert_eq!(config.model.early_stopping_patience, 5);
    }

    #[test]
    fn test_heuristic_weights_sum_to_one() {
        let config = ScoringConfig::default();
        let total = config.skill_weight + config.location_weight + config.salary_weight;
        assert!((total - 1.0).abs() < 0.001);
    }
}
