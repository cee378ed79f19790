//! Recommendation Orchestrator
//!
//! End-to-end personalized ranking for one candidate against a supplied offer
//! pool: profile + history fetch, applied-offer exclusion (waived when it
//! would starve the result), one embedding pass, blended ML + heuristic
//! scoring, sort and truncate.
//!
//! The governing rule is "never fail the caller": every failure mode degrades
//! to a defined fallback list, logged for operational visibility.

use crate::config::ScoringConfig;
use crate::models::{
    CandidateProfile, LocationMatch, MlScoreSource, Offer, Recommendation, ScoreDetails,
};
use crate::services::heuristic::HeuristicScorer;
use crate::services::model::{MlScore, RecommenderModel, NEUTRAL_SCORE};
use crate::sources::{ApplicationSource, CandidateSource, TrainingCorpusSource};
use crate::utils::{normalize_name, round_score};
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct RecommendationService {
    candidates: Arc<dyn CandidateSource>,
    applications: Arc<dyn ApplicationSource>,
    corpus: Arc<dyn TrainingCorpusSource>,
    model: Arc<RecommenderModel>,
    heuristic: HeuristicScorer,
    config: ScoringConfig,
}

impl RecommendationService {
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        applications: Arc<dyn ApplicationSource>,
        corpus: Arc<dyn TrainingCorpusSource>,
        model: Arc<RecommenderModel>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            candidates,
            applications,
            corpus,
            model,
            heuristic: HeuristicScorer::from_config(&config),
            config,
        }
    }

    /// Ranked recommendations for a user, at most `top_n` records (floored to
    /// the configured minimum). Infallible by contract: data absence and
    /// pipeline errors both degrade to neutral-score fallbacks.
    pub async fn recommend(
        &self,
        user_id: Uuid,
        top_n: usize,
        offer_pool: &[Offer],
    ) -> Vec<Recommendation> {
        let top_n = top_n.max(self.config.min_top_n);
        match self.recommend_inner(user_id, top_n, offer_pool).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    user_id = %user_id,
                    error = ?e,
                    "Recommendation pipeline failed, serving shuffled neutral fallback"
                );
                self.neutral_fallback(offer_pool, top_n, true)
            }
        }
    }

    async fn recommend_inner(
        &self,
        user_id: Uuid,
        top_n: usize,
        offer_pool: &[Offer],
    ) -> anyhow::Result<Vec<Recommendation>> {
        let Some(candidate) = self.candidates.find_by_user(user_id).await? else {
            warn!(user_id = %user_id, "No candidate profile, serving neutral fallback");
            return Ok(self.neutral_fallback(offer_pool, top_n, false));
        };

        if offer_pool.is_empty() {
            warn!(user_id = %user_id, "No offers available to recommend");
            return Ok(Vec::new());
        }

        let history = self.applications.for_candidate(candidate.id).await?;
        let applied: HashSet<Uuid> = history.iter().map(|a| a.offer_id).collect();

        // Exclude already-applied offers unless doing so would starve the
        // result; then keep them all and penalize the applied ones instead.
        let fresh: Vec<Offer> = offer_pool
            .iter()
            .filter(|offer| !applied.contains(&offer.id))
            .cloned()
            .collect();
        let (working, exclusion_waived) = if fresh.len() < top_n {
            debug!(
                user_id = %user_id,
                fresh = fresh.len(),
                needed = top_n,
                "Waiving applied-offer exclusion to keep the pool viable"
            );
            (offer_pool.to_vec(), true)
        } else {
            (fresh, false)
        };

        let embedding = self.model.embed(&candidate);
        let ml_scores = self.model.predict_batch(&embedding, &working);

        let blend = self.config.ml_blend_weight;
        let mut records: Vec<Recommendation> = working
            .iter()
            .zip(ml_scores)
            .map(|(offer, ml)| {
                let heuristic = self.heuristic.score(offer, &candidate);
                let mut combined = ml.value * blend + heuristic * (1.0 - blend);
                if exclusion_waived && applied.contains(&offer.id) {
                    combined *= 1.0 - self.config.applied_penalty;
                }
                self.build_record(offer, &candidate, combined, ml, heuristic)
            })
            .collect();

        records.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(Ordering::Equal)
        });
        records.truncate(top_n);

        info!(
            user_id = %user_id,
            count = records.len(),
            top_score = records.first().map(|r| r.match_score),
            "Generated recommendations"
        );
        Ok(records)
    }

    /// Re-sort a generic offer listing by personalized relevance. Embeds the
    /// candidate once and runs one batched prediction over the whole listing;
    /// on any failure (including an unknown user) the listing keeps its
    /// original order.
    pub async fn rank_listing(&self, user_id: Uuid, offers: Vec<Offer>) -> Vec<Offer> {
        match self.rank_listing_inner(user_id, &offers).await {
            Ok(Some(ranked)) => ranked,
            Ok(None) => offers,
            Err(e) => {
                warn!(user_id = %user_id, error = ?e, "Listing ranking failed, keeping original order");
                offers
            }
        }
    }

    async fn rank_listing_inner(
        &self,
        user_id: Uuid,
        offers: &[Offer],
    ) -> anyhow::Result<Option<Vec<Offer>>> {
        if offers.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let Some(candidate) = self.candidates.find_by_user(user_id).await? else {
            return Ok(None);
        };

        let history = self.applications.for_candidate(candidate.id).await?;
        let applied: HashSet<Uuid> = history.iter().map(|a| a.offer_id).collect();

        let embedding = self.model.embed(&candidate);
        let ml_scores = self.model.predict_batch(&embedding, offers);

        let blend = self.config.ml_blend_weight;
        let mut scored: Vec<(f32, &Offer)> = offers
            .iter()
            .zip(ml_scores)
            .map(|(offer, ml)| {
                let heuristic = self.heuristic.score(offer, &candidate);
                let mut combined = ml.value * blend + heuristic * (1.0 - blend);
                if applied.contains(&offer.id) {
                    combined *= 1.0 - self.config.applied_penalty;
                }
                (combined, offer)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        Ok(Some(scored.into_iter().map(|(_, offer)| offer.clone()).collect()))
    }

    /// Administrative retraining trigger. Runs the CPU-bound training job off
    /// the async runtime; failures are logged, the previously-ready model
    /// keeps serving.
    pub async fn retrain(&self) {
        info!("Retraining recommender model");
        let corpus = match self.corpus.applications_with_relations().await {
            Ok(corpus) => corpus,
            Err(e) => {
                error!(error = %e, "Could not fetch training corpus");
                return;
            }
        };

        let model = Arc::clone(&self.model);
        let outcome = tokio::task::spawn_blocking(move || model.train(&corpus)).await;
        match outcome {
            Ok(Ok(report)) if report.examples == 0 => {
                info!(skipped = report.skipped, "Training skipped: no usable data");
            }
            Ok(Ok(report)) => {
                info!(
                    examples = report.examples,
                    skipped = report.skipped,
                    epochs_run = report.outcome.epochs_run,
                    val_accuracy = report.outcome.val_accuracy,
                    "Model retrained"
                );
            }
            Ok(Err(e)) => error!(error = %e, "Training failed"),
            Err(e) => error!(error = %e, "Training task panicked"),
        }
    }

    fn build_record(
        &self,
        offer: &Offer,
        candidate: &CandidateProfile,
        combined: f32,
        ml: MlScore,
        heuristic: f32,
    ) -> Recommendation {
        let location_match = match (offer.company_city.as_deref(), candidate.city.as_deref()) {
            (Some(offer_city), Some(candidate_city))
                if normalize_name(offer_city) == normalize_name(candidate_city) =>
            {
                LocationMatch::Exact
            }
            _ => LocationMatch::Partial,
        };

        Recommendation {
            offer_id: offer.id,
            title: offer.title.clone(),
            company: offer.company_name.clone(),
            match_score: round_score(combined.clamp(0.0, 1.0)),
            required_skills: offer.required_skills.clone(),
            candidate_skills: candidate.skills.clone(),
            salary_range: offer.salary_range(),
            location_match,
            contract_types: offer.contract_types.clone(),
            modality: offer.modality.clone(),
            skills_match_percentage: HeuristicScorer::skills_match_percentage(offer, candidate),
            score_details: ScoreDetails {
                ml_score: ml.value,
                heuristic_score: heuristic,
                ml_score_source: ml.source,
            },
        }
    }

    /// Degraded result used when no real scoring is possible: up to `top_n`
    /// offers tagged with the neutral score, optionally shuffled.
    fn neutral_fallback(&self, offer_pool: &[Offer], top_n: usize, shuffle: bool) -> Vec<Recommendation> {
        let mut picks: Vec<&Offer> = offer_pool.iter().collect();
        if shuffle {
            picks.shuffle(&mut rand::thread_rng());
        }

        picks
            .into_iter()
            .take(top_n)
            .map(|offer| Recommendation {
                offer_id: offer.id,
                title: offer.title.clone(),
                company: offer.company_name.clone(),
                match_score: NEUTRAL_SCORE,
                required_skills: offer.required_skills.clone(),
                candidate_skills: Vec::new(),
                salary_range: offer.salary_range(),
                location_match: LocationMatch::Partial,
                contract_types: offer.contract_types.clone(),
                modality: offer.modality.clone(),
                skills_match_percentage: 0,
                score_details: ScoreDetails {
                    ml_score: NEUTRAL_SCORE,
                    heuristic_score: 0.0,
                    ml_score_source: MlScoreSource::Fallback,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncoderConfig, ModelConfig};
    use crate::models::{Application, ApplicationStatus};
    use crate::services::encoder::FeatureEncoder;
    use crate::sources::{MockApplicationSource, MockCandidateSource, MockTrainingCorpusSource};

    fn catalog() -> Vec<String> {
        vec!["python".to_string(), "sql".to_string(), "aws".to_string()]
    }

    fn boston_candidate() -> CandidateProfile {
        CandidateProfile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            skills: vec!["python".to_string(), "sql".to_string()],
            city: Some("Boston".to_string()),
            expected_salary: Some(80_000.0),
        }
    }

    fn boston_offer() -> Offer {
        Offer {
            id: Uuid::new_v4(),
            title: "Data Engineer".to_string(),
            company_name: "Acme".to_string(),
            company_city: Some("Boston".to_string()),
            salary_min: Some(70_000.0),
            salary_max: Some(90_000.0),
            currency: Some("USD".to_string()),
            required_skills: vec!["python".to_string(), "sql".to_string(), "aws".to_string()],
            contract_types: vec!["full-time".to_string()],
            modality: vec!["hybrid".to_string()],
        }
    }

    fn service_with(
        candidates: MockCandidateSource,
        applications: MockApplicationSource,
    ) -> RecommendationService {
        let encoder = Arc::new(FeatureEncoder::new(&catalog(), &EncoderConfig::default()));
        let model = Arc::new(RecommenderModel::new(
            encoder,
            ModelConfig {
                weights_path: "unused-weights.json".to_string(),
                ..ModelConfig::default()
            },
        ));
        RecommendationService::new(
            Arc::new(candidates),
            Arc::new(applications),
            Arc::new(MockTrainingCorpusSource::new()),
            model,
            ScoringConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_user_gets_neutral_fallback() {
        let mut candidates = MockCandidateSource::new();
        candidates.expect_find_by_user().returning(|_| Ok(None));

        let service = service_with(candidates, MockApplicationSource::new());
        let pool: Vec<Offer> = (0..4).map(|_| boston_offer()).collect();

        let records = service.recommend(Uuid::new_v4(), 5, &pool).await;
        assert_eq!(records.len(), 4);
        for record in &records {
            assert_eq!(record.match_score, NEUTRAL_SCORE);
            assert_eq!(record.score_details.ml_score, NEUTRAL_SCORE);
            assert_eq!(record.score_details.ml_score_source, MlScoreSource::Fallback);
        }
    }

    #[tokio::test]
    async fn test_top_n_is_floored_to_minimum() {
        let mut candidates = MockCandidateSource::new();
        candidates.expect_find_by_user().returning(|_| Ok(None));

        let service = service_with(candidates, MockApplicationSource::new());
        let pool: Vec<Offer> = (0..10).map(|_| boston_offer()).collect();

        let records = service.recommend(Uuid::new_v4(), 1, &pool).await;
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_source_error_degrades_to_shuffled_fallback() {
        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_find_by_user()
            .returning(|_| Err(anyhow::anyhow!("store unreachable")));

        let service = service_with(candidates, MockApplicationSource::new());
        let pool: Vec<Offer> = (0..10).map(|_| boston_offer()).collect();

        let records = service.recommend(Uuid::new_v4(), 5, &pool).await;
        assert_eq!(records.len(), 5);
        for record in &records {
            assert_eq!(record.match_score, NEUTRAL_SCORE);
            assert_eq!(record.score_details.ml_score_source, MlScoreSource::Fallback);
        }
    }

    #[tokio::test]
    async fn test_empty_pool_returns_empty_list() {
        let candidate = boston_candidate();
        let user_id = candidate.user_id;

        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_find_by_user()
            .returning(move |_| Ok(Some(candidate.clone())));

        let service = service_with(candidates, MockApplicationSource::new());
        let records = service.recommend(user_id, 5, &[]).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_applied_offers_are_excluded_when_enough_remain() {
        let candidate = boston_candidate();
        let user_id = candidate.user_id;
        let candidate_id = candidate.id;

        let pool: Vec<Offer> = (0..10).map(|_| boston_offer()).collect();
        let applied_ids: Vec<Uuid> = pool.iter().take(2).map(|o| o.id).collect();
        let history: Vec<Application> = applied_ids
            .iter()
            .map(|&offer_id| Application {
                offer_id,
                status: ApplicationStatus::Pending,
            })
            .collect();

        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_find_by_user()
            .returning(move |_| Ok(Some(candidate.clone())));
        let mut applications = MockApplicationSource::new();
        applications
            .expect_for_candidate()
            .withf(move |id| *id == candidate_id)
            .returning(move |_| Ok(history.clone()));

        let service = service_with(candidates, applications);
        let records = service.recommend(user_id, 5, &pool).await;

        assert_eq!(records.len(), 5);
        for record in &records {
            assert!(!applied_ids.contains(&record.offer_id));
        }
    }

    #[tokio::test]
    async fn test_waived_exclusion_penalizes_applied_offers() {
        let candidate = boston_candidate();
        let user_id = candidate.user_id;

        // Applied to all but 2 of a 10-offer pool: exclusion would starve a
        // top-5 request, so it is waived and applied offers are penalized.
        let pool: Vec<Offer> = (0..10).map(|_| boston_offer()).collect();
        let fresh_ids: Vec<Uuid> = pool.iter().take(2).map(|o| o.id).collect();
        let history: Vec<Application> = pool
            .iter()
            .skip(2)
            .map(|offer| Application {
                offer_id: offer.id,
                status: ApplicationStatus::Rejected,
            })
            .collect();

        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_find_by_user()
            .returning(move |_| Ok(Some(candidate.clone())));
        let mut applications = MockApplicationSource::new();
        applications
            .expect_for_candidate()
            .returning(move |_| Ok(history.clone()));

        let service = service_with(candidates, applications);
        let records = service.recommend(user_id, 5, &pool).await;
        assert_eq!(records.len(), 5);

        // Uninitialized model: ml = 0.5 everywhere; heuristic for the Boston
        // scenario is 0.8, so fresh offers blend to 0.65 and applied ones are
        // scaled by 0.7 to 0.455 (rounded 0.46).
        let fresh: Vec<&Recommendation> = records
            .iter()
            .filter(|r| fresh_ids.contains(&r.offer_id))
            .collect();
        let applied: Vec<&Recommendation> = records
            .iter()
            .filter(|r| !fresh_ids.contains(&r.offer_id))
            .collect();

        assert_eq!(fresh.len(), 2);
        assert_eq!(applied.len(), 3);
        for record in fresh {
            assert!((record.match_score - 0.65).abs() < 0.001);
        }
        for record in applied {
            assert!((record.match_score - 0.46).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_records_are_sorted_non_increasing() {
        let candidate = boston_candidate();
        let user_id = candidate.user_id;

        let mut pool: Vec<Offer> = (0..5).map(|_| boston_offer()).collect();
        // Degrade some offers so scores actually differ.
        pool[1].required_skills = vec!["aws".to_string()];
        pool[3].company_city = Some("Madrid".to_string());

        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_find_by_user()
            .returning(move |_| Ok(Some(candidate.clone())));
        let mut applications = MockApplicationSource::new();
        applications.expect_for_candidate().returning(|_| Ok(vec![]));

        let service = service_with(candidates, applications);
        let records = service.recommend(user_id, 10, &pool).await;

        assert_eq!(records.len(), 5);
        for pair in records.windows(2) {
            assert!(pair[0].match_score >= pair[1].match_score);
        }
    }

    #[tokio::test]
    async fn test_rank_listing_keeps_order_for_unknown_user() {
        let mut candidates = MockCandidateSource::new();
        candidates.expect_find_by_user().returning(|_| Ok(None));

        let service = service_with(candidates, MockApplicationSource::new());
        let pool: Vec<Offer> = (0..3).map(|_| boston_offer()).collect();
        let original_ids: Vec<Uuid> = pool.iter().map(|o| o.id).collect();

        let ranked = service.rank_listing(Uuid::new_v4(), pool).await;
        let ranked_ids: Vec<Uuid> = ranked.iter().map(|o| o.id).collect();
        assert_eq!(ranked_ids, original_ids);
    }

    #[tokio::test]
    async fn test_rank_listing_moves_better_matches_up() {
        let candidate = boston_candidate();
        let user_id = candidate.user_id;

        let mut weak = boston_offer();
        weak.required_skills = vec!["aws".to_string()];
        weak.company_city = Some("Madrid".to_string());
        let strong = boston_offer();
        let weak_id = weak.id;
        let strong_id = strong.id;

        let mut candidates = MockCandidateSource::new();
        candidates
            .expect_find_by_user()
            .returning(move |_| Ok(Some(candidate.clone())));
        let mut applications = MockApplicationSource::new();
        applications.expect_for_candidate().returning(|_| Ok(vec![]));

        let service = service_with(candidates, applications);
        let ranked = service.rank_listing(user_id, vec![weak, strong]).await;

        assert_eq!(ranked[0].id, strong_id);
        assert_eq!(ranked[1].id, weak_id);
    }
}
