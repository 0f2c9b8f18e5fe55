use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub recommendation: RecommendationConfig,
    pub collaborative: CollaborativeConfig,
    pub content: ContentConfig,
    pub personalization: PersonalizationConfig,
    pub learning_path: LearningPathConfig,
    pub cache: CacheConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Default number of recommendations per generation call.
    pub default_limit: usize,
    pub min_confidence: f32,
    /// Interactions pulled into the request context.
    pub context_interaction_limit: usize,
    /// Diversity caps applied after ranking.
    pub max_per_type: usize,
    pub max_per_tag: usize,
    /// Window for the trending heuristic, in days.
    pub trending_window_days: i64,
    pub algorithm_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborativeConfig {
    pub min_similarity: f32,
    pub top_similar_users: usize,
    /// Recent positive courses seeding item-based scoring.
    pub item_seed_limit: usize,
    /// Similarity cache lifetime in hours.
    pub similarity_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Candidate pool cap as a multiple of the requested limit.
    pub candidate_multiplier: usize,
    /// Interactions considered when building the preference profile.
    pub profile_interaction_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationConfig {
    pub feature_dim: usize,
    pub skill_buckets: usize,
    pub preference_buckets: usize,
    /// A retrain is triggered every nth feedback event.
    pub retrain_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPathConfig {
    pub courses_per_tier: usize,
    pub assessment_minutes: u32,
    pub project_minutes: u32,
    /// Max course duration as a multiple of the preferred duration.
    pub duration_slack: f32,
    /// Completion rate below which an adaptation is recorded.
    pub support_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub recommendations_ttl_secs: u64,
    pub user_profile_ttl_secs: u64,
    pub similarity_ttl_secs: u64,
    pub learning_path_ttl_secs: u64,
    pub analytics_ttl_secs: u64,
    pub ml_features_ttl_secs: u64,
    pub collaborative_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub dedup_ttl_ms: u64,
    pub failure_threshold: u32,
    pub operation_timeout_ms: u64,
    pub reset_timeout_ms: u64,
    pub batch_size: usize,
    pub job_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recommendation: RecommendationConfig {
                default_limit: 10,
                min_confidence: 0.1,
                context_interaction_limit: 100,
                max_per_type: 3,
                max_per_tag: 2,
                trending_window_days: 7,
                algorithm_version: "ensemble-v1".to_string(),
            },
            collaborative: CollaborativeConfig {
                min_similarity: 0.1,
                top_similar_users: 20,
                item_seed_limit: 10,
                similarity_ttl_hours: 24,
            },
            content: ContentConfig {
                candidate_multiplier: 4,
                profile_interaction_limit: 100,
            },
            personalization: PersonalizationConfig {
                feature_dim: 50,
                skill_buckets: 50,
                preference_buckets: 50,
                retrain_every: 10,
            },
            learning_path: LearningPathConfig {
                courses_per_tier: 3,
                assessment_minutes: 30,
                project_minutes: 120,
                duration_slack: 1.5,
                support_threshold: 0.5,
            },
            cache: CacheConfig {
                recommendations_ttl_secs: 300,
                user_profile_ttl_secs: 1800,
                similarity_ttl_secs: 3600,
                learning_path_ttl_secs: 600,
                analytics_ttl_secs: 900,
                ml_features_ttl_secs: 7200,
                collaborative_ttl_secs: 1800,
            },
            resilience: ResilienceConfig {
                dedup_ttl_ms: 5000,
                failure_threshold: 5,
                operation_timeout_ms: 10_000,
                reset_timeout_ms: 60_000,
                batch_size: 25,
                job_attempts: 3,
                backoff_base_ms: 2000,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LEARNPATH"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
