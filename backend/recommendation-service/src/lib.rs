pub mod config;
pub mod models;
pub mod services;
pub mod sources;
pub mod utils;

pub use config::Config;
pub use services::{FeatureEncoder, HeuristicScorer, RecommendationService, RecommenderModel};
