pub mod encoder;
pub mod heuristic;
pub mod model;
pub mod recommendation;

pub use encoder::FeatureEncoder;
pub use heuristic::HeuristicScorer;
pub use model::RecommenderModel;
pub use recommendation::RecommendationService;
