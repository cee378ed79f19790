//! Feature Encoder
//!
//! Deterministic mapping from candidates and offers to fixed-width numeric
//! feature vectors: skills one-hot over a stable vocabulary, a lazily grown
//! location index, normalized salary and a fixed-width contract indicator.
//!
//! The combined candidate+offer layout assembled here is a contract shared by
//! training and inference; both sides must go through this module.

use crate::config::EncoderConfig;
use crate::models::{CandidateProfile, Offer};
use crate::utils::{normalize_name, normalize_salary};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Candidate-side feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFeatures {
    pub skills: Vec<f32>,
    pub location: f32,
    pub salary: f32,
}

impl CandidateFeatures {
    /// Candidate half of the combined input vector, zero-padded where the
    /// offer half carries contract slots. Layout:
    /// `[skills.., location, salary, 0 x contract_slots]`
    pub fn to_padded_vector(&self, contract_slots: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.skills.len() + 2 + contract_slots);
        out.extend_from_slice(&self.skills);
        out.push(self.location);
        out.push(self.salary);
        out.resize(out.len() + contract_slots, 0.0);
        out
    }
}

/// Offer-side feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferFeatures {
    pub skills: Vec<f32>,
    pub location: f32,
    pub salary: f32,
    pub contracts: Vec<f32>,
}

impl OfferFeatures {
    fn append_to(&self, out: &mut Vec<f32>) {
        out.extend_from_slice(&self.skills);
        out.push(self.location);
        out.push(self.salary);
        out.extend_from_slice(&self.contracts);
    }
}

/// Encodes domain entities into numeric vectors.
///
/// The skill vocabulary is fixed at construction; the location index grows
/// lazily as new cities are first seen, shared across all encode calls on one
/// instance. Location indices are therefore only meaningful within a single
/// encoder lifetime and must not be persisted.
pub struct FeatureEncoder {
    skills: HashMap<String, usize>,
    locations: DashMap<String, usize>,
    next_location: AtomicUsize,
    salary_cap: f32,
    contract_slots: usize,
}

impl FeatureEncoder {
    pub fn new(skill_catalog: &[String], config: &EncoderConfig) -> Self {
        let mut skills = HashMap::new();
        for name in skill_catalog {
            let normalized = normalize_name(name);
            let next = skills.len();
            skills.entry(normalized).or_insert(next);
        }

        debug!(vocab_size = skills.len(), "Feature encoder constructed");

        Self {
            skills,
            locations: DashMap::new(),
            next_location: AtomicUsize::new(0),
            salary_cap: config.salary_cap,
            contract_slots: config.contract_slots,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.skills.len()
    }

    pub fn contract_slots(&self) -> usize {
        self.contract_slots
    }

    /// Width of one entity half: skills one-hot + location + salary + contract.
    pub fn half_width(&self) -> usize {
        self.skills.len() + 2 + self.contract_slots
    }

    /// Width of the combined candidate+offer input vector.
    pub fn combined_width(&self) -> usize {
        2 * self.half_width()
    }

    pub fn encode_candidate(&self, candidate: &CandidateProfile) -> CandidateFeatures {
        CandidateFeatures {
            skills: self.skills_one_hot(&candidate.skills),
            location: candidate
                .city
                .as_deref()
                .map(|city| self.location_index(city) as f32)
                .unwrap_or(0.0),
            salary: candidate
                .expected_salary
                .map(|salary| normalize_salary(salary, self.salary_cap))
                .unwrap_or(0.0),
        }
    }

    pub fn encode_offer(&self, offer: &Offer) -> OfferFeatures {
        let mut contracts = vec![0.0; self.contract_slots];
        for slot in contracts
            .iter_mut()
            .take(offer.contract_types.len().min(self.contract_slots))
        {
            *slot = 1.0;
        }

        OfferFeatures {
            skills: self.skills_one_hot(&offer.required_skills),
            location: offer
                .company_city
                .as_deref()
                .map(|city| self.location_index(city) as f32)
                .unwrap_or(0.0),
            salary: offer
                .salary_max
                .map(|salary| normalize_salary(salary, self.salary_cap))
                .unwrap_or(0.0),
            contracts,
        }
    }

    /// Assemble the combined input vector from a pre-computed candidate half
    /// and offer features. The layout must match between training and
    /// inference, so both go through this single assembly point.
    pub fn combined_vector(&self, candidate_half: &[f32], offer: &OfferFeatures) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.combined_width());
        out.extend_from_slice(candidate_half);
        offer.append_to(&mut out);
        out
    }

    fn skills_one_hot(&self, names: &[String]) -> Vec<f32> {
        let mut vector = vec![0.0; self.skills.len()];
        for name in names {
            if let Some(&index) = self.skills.get(&normalize_name(name)) {
                vector[index] = 1.0;
            }
        }
        vector
    }

    /// Index for a normalized city, assigning the next free slot on first
    /// sight. The entry lock serializes first-sight insertion per city, so two
    /// concurrent requests can never claim the same index for different
    /// cities.
    fn location_index(&self, city: &str) -> usize {
        let normalized = normalize_name(city);
        *self
            .locations
            .entry(normalized)
            .or_insert_with(|| self.next_location.fetch_add(1, Ordering::Relaxed))
    }
}
