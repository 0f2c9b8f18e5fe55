//! Course recommendation and learning-path engine.
//!
//! The engine combines collaborative filtering, content similarity and a
//! personalization model into one ensemble, plans adaptive learning paths
//! toward skill goals, and layers caching and resilience primitives over
//! pluggable storage collaborators.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, Result};
pub use models::*;

use std::sync::Arc;

use crate::services::cache::CacheService;
use crate::services::collaborative::CollaborativeFilteringGenerator;
use crate::services::content::ContentSimilarityGenerator;
use crate::services::learning_path::LearningPathPlanner;
use crate::services::orchestrator::RecommendationOrchestrator;
use crate::services::personalization::PersonalizationScorer;
use crate::services::resilience::BatchScheduler;
use crate::stores::{
    AnalyticsSink, CacheBackend, CourseDirectory, InMemoryBackends, InteractionStore,
    LearningPathRepository, RecommendationRepository, UserDirectory, WorkQueue,
};

/// Shared service graph. Construction wires every service against the
/// provided collaborators; all handles are cheaply cloneable.
#[derive(Clone)]
pub struct EngineState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub planner: Arc<LearningPathPlanner>,
    pub personalization: Arc<PersonalizationScorer>,
    pub cache: Arc<CacheService>,
    pub scheduler: Arc<BatchScheduler>,
}

pub struct EngineCollaborators {
    pub interactions: Arc<dyn InteractionStore>,
    pub courses: Arc<dyn CourseDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub recommendations: Arc<dyn RecommendationRepository>,
    pub paths: Arc<dyn LearningPathRepository>,
    pub queue: Arc<dyn WorkQueue>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub cache_backend: Arc<dyn CacheBackend>,
}

impl EngineState {
    pub fn new(config: Config, collaborators: EngineCollaborators) -> Self {
        let config = Arc::new(config);

        let cache = Arc::new(CacheService::new(
            collaborators.cache_backend,
            collaborators.queue.clone(),
            config.clone(),
        ));
        let collaborative = Arc::new(CollaborativeFilteringGenerator::new(
            collaborators.interactions.clone(),
            config.clone(),
        ));
        let content = Arc::new(ContentSimilarityGenerator::new(
            collaborators.courses.clone(),
            config.clone(),
        ));
        let personalization = Arc::new(PersonalizationScorer::new(
            collaborators.courses.clone(),
            config.clone(),
        ));

        let orchestrator = Arc::new(RecommendationOrchestrator::new(
            collaborators.users.clone(),
            collaborators.interactions.clone(),
            collaborators.courses.clone(),
            collaborators.recommendations,
            collaborators.analytics,
            cache.clone(),
            collaborative,
            content,
            personalization.clone(),
            config.clone(),
        ));
        let planner = Arc::new(LearningPathPlanner::new(
            collaborators.interactions,
            collaborators.courses,
            collaborators.users,
            collaborators.paths,
            config.clone(),
        ));
        let scheduler = Arc::new(BatchScheduler::new(collaborators.queue, config.clone()));

        Self {
            config,
            orchestrator,
            planner,
            personalization,
            cache,
            scheduler,
        }
    }

    /// Engine backed entirely by in-memory collaborators; used in tests,
    /// benches and single-process deployments.
    pub fn in_memory(config: Config) -> (Self, InMemoryBackends) {
        let backends = InMemoryBackends::new();
        let state = Self::new(
            config,
            EngineCollaborators {
                interactions: backends.interactions.clone(),
                courses: backends.courses.clone(),
                users: backends.users.clone(),
                recommendations: backends.recommendations.clone(),
                paths: backends.paths.clone(),
                queue: backends.queue.clone(),
                analytics: backends.analytics.clone(),
                cache_backend: backends.cache.clone(),
            },
        );
        (state, backends)
    }
}

/// Installs the global tracing subscriber. Safe to call once per process.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
