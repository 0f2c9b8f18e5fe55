pub mod cache;
pub mod collaborative;
pub mod content;
pub mod learning_path;
pub mod orchestrator;
pub mod personalization;
pub mod resilience;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::*;

/// Per-request context assembled once by the orchestrator and shared by all
/// generators: the resolved user, their recent interactions (most recent
/// first) and the courses those interactions touched.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub interactions: Vec<UserInteraction>,
    pub courses: HashMap<Uuid, Course>,
}

impl RequestContext {
    pub fn new(user: User, interactions: Vec<UserInteraction>, courses: HashMap<Uuid, Course>) -> Self {
        Self {
            user,
            interactions,
            courses,
        }
    }

    /// Course ids the user recently touched, deduplicated, most recent first.
    pub fn recent_course_ids(&self) -> Vec<Uuid> {
        let mut seen = std::collections::HashSet::new();
        self.interactions
            .iter()
            .filter(|i| seen.insert(i.course_id))
            .map(|i| i.course_id)
            .collect()
    }

    pub fn has_interacted(&self, course_id: Uuid) -> bool {
        self.interactions.iter().any(|i| i.course_id == course_id)
    }

    /// Weighted interaction vector: course id -> accumulated effective weight.
    pub fn weighted_vector(&self) -> HashMap<Uuid, f32> {
        let mut vector = HashMap::new();
        for interaction in &self.interactions {
            *vector.entry(interaction.course_id).or_insert(0.0) += interaction.effective_weight();
        }
        vector
    }

    /// Recent positive-signal course ids, most recent first, capped.
    pub fn recent_positive_courses(&self, limit: usize) -> Vec<Uuid> {
        let mut seen = std::collections::HashSet::new();
        self.interactions
            .iter()
            .filter(|i| i.interaction_type.is_positive())
            .filter(|i| seen.insert(i.course_id))
            .map(|i| i.course_id)
            .take(limit)
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub limit: usize,
    pub min_confidence: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_confidence: 0.1,
        }
    }
}

/// A single recommendation strategy. Implementations degrade internal
/// failures to an empty draft list; only the orchestrator-level user lookup
/// and persistence are fatal.
#[async_trait]
pub trait RecommendationGenerator: Send + Sync {
    fn kind(&self) -> GeneratorKind;

    async fn generate(&self, context: &RequestContext, options: &GenerateOptions) -> Vec<RecommendationDraft>;
}
