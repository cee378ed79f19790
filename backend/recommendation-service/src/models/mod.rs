use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub skills: Vec<String>,
    pub city: Option<String>,
    pub expected_salary: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    pub company_name: String,
    pub company_city: Option<String>,
    pub salary_min: Option<f32>,
    pub salary_max: Option<f32>,
    pub currency: Option<String>,
    pub required_skills: Vec<String>,
    pub contract_types: Vec<String>,
    pub modality: Vec<String>,
}

impl Offer {
    pub fn salary_range(&self) -> String {
        let range = format!(
            "{} - {} {}",
            self.salary_min.unwrap_or(0.0),
            self.salary_max.unwrap_or(0.0),
            self.currency.as_deref().unwrap_or(""),
        );
        range.trim_end().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

/// One row of a candidate's application history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub offer_id: Uuid,
    pub status: ApplicationStatus,
}

/// One joined row of the historical training corpus. Relations come from an
/// outer join upstream, so either side may be missing; such rows are skipped
/// during training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingApplication {
    pub id: Uuid,
    pub candidate: Option<CandidateProfile>,
    pub offer: Option<Offer>,
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMatch {
    Exact,
    Partial,
}

impl LocationMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationMatch::Exact => "exact",
            LocationMatch::Partial => "partial",
        }
    }
}

/// Where an ML score came from. The numeric contract is identical either way;
/// this tag keeps synthetic neutral scores distinguishable in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MlScoreSource {
    Model,
    Fallback,
}

impl MlScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MlScoreSource::Model => "model",
            MlScoreSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreDetails {
    pub ml_score: f32,
    pub heuristic_score: f32,
    pub ml_score_source: MlScoreSource,
}

/// Caller-facing recommendation record. Built fresh per call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub offer_id: Uuid,
    pub title: String,
    pub company: String,
    pub match_score: f32,
    pub required_skills: Vec<String>,
    pub candidate_skills: Vec<String>,
    pub salary_range: String,
    pub location_match: LocationMatch,
    pub contract_types: Vec<String>,
    pub modality: Vec<String>,
    pub skills_match_percentage: u8,
    pub score_details: ScoreDetails,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salary_range_formatting() {
        let mut offer = Offer {
            id: Uuid::new_v4(),
            title: "Backend Engineer".to_string(),
            company_name: "Acme".to_string(),
            company_city: None,
            salary_min: Some(60_000.0),
            salary_max: Some(90_000.0),
            currency: Some("EUR".to_string()),
            required_skills: vec![],
            contract_types: vec![],
            modality: vec![],
        };
        assert_eq!(offer.salary_range(), "60000 - 90000 EUR");

        offer.salary_min = None;
        offer.currency = None;
        assert_eq!(offer.salary_range(), "0 - 90000");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ApplicationStatus::Accepted).unwrap();
        assert_eq!(json, "\"accepted\"");
        assert_eq!(ApplicationStatus::Accepted.as_str(), "accepted");
    }
}
