//! Collaborator seams consumed by the recommendation core.
//!
//! Persistence, auth and the HTTP layer live in the surrounding system; the
//! core only sees these narrow async interfaces.

use crate::models::{Application, CandidateProfile, TrainingApplication};
use async_trait::async_trait;
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Resolve the candidate profile behind a platform user id, if any.
    async fn find_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<CandidateProfile>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApplicationSource: Send + Sync {
    /// Application history for one candidate.
    async fn for_candidate(&self, candidate_id: Uuid) -> anyhow::Result<Vec<Application>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrainingCorpusSource: Send + Sync {
    /// Historical applications with their candidate and offer relations,
    /// used only by the training path.
    async fn applications_with_relations(&self) -> anyhow::Result<Vec<TrainingApplication>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    /// Full skill catalog, used to size the skill vocabulary at encoder
    /// construction. Growing the catalog requires a new encoder.
    async fn list_all(&self) -> anyhow::Result<Vec<String>>;
}
