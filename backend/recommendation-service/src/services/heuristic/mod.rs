//! Heuristic Scorer
//!
//! Interpretable scoring independent of the learned model, used both as a
//! blend component and as the safety net when the model is unavailable.
//! Total function: missing data degrades to a zero sub-score, never an error.

use crate::config::ScoringConfig;
use crate::models::{CandidateProfile, Offer};
use crate::utils::normalize_name;
use std::collections::HashSet;

pub struct HeuristicScorer {
    skill_weight: f32,
    location_weight: f32,
    salary_weight: f32,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl HeuristicScorer {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            skill_weight: config.skill_weight,
            location_weight: config.location_weight,
            salary_weight: config.salary_weight,
        }
    }

    /// Weighted sum of skill overlap, location match and salary fit,
    /// bounded to [0, sum of weights].
    pub fn score(&self, offer: &Offer, candidate: &CandidateProfile) -> f32 {
        let mut score = 0.0;

        let candidate_skills: HashSet<String> =
            candidate.skills.iter().map(|s| normalize_name(s)).collect();
        let required: Vec<String> = offer
            .required_skills
            .iter()
            .map(|s| normalize_name(s))
            .collect();

        if !candidate_skills.is_empty() && !required.is_empty() {
            let matched = required
                .iter()
                .filter(|skill| candidate_skills.contains(*skill))
                .count();
            score += (matched as f32 / required.len() as f32) * self.skill_weight;
        }

        if let (Some(candidate_city), Some(offer_city)) =
            (candidate.city.as_deref(), offer.company_city.as_deref())
        {
            score += if normalize_name(candidate_city) == normalize_name(offer_city) {
                self.location_weight
            } else {
                self.location_weight / 2.0
            };
        }

        if let (Some(expected), Some(max)) = (candidate.expected_salary, offer.salary_max) {
            score += if expected <= max {
                self.salary_weight
            } else if max >= expected * 0.8 {
                self.salary_weight / 2.0
            } else {
                0.0
            };
        }

        score
    }

    /// Share of the offer's required skills the candidate covers, as a
    /// percentage for the UI. 0 when the offer requires nothing.
    pub fn skills_match_percentage(offer: &Offer, candidate: &CandidateProfile) -> u8 {
        if offer.required_skills.is_empty() {
            return 0;
        }
        let candidate_skills: HashSet<String> =
            candidate.skills.iter().map(|s| normalize_name(s)).collect();
        let matched = offer
            .required_skills
            .iter()
            .filter(|skill| candidate_skills.contains(&normalize_name(skill)))
            .count();
        ((matched as f32 / offer.required_skills.len() as f32) * 100.0).round() as u8
    }
}
