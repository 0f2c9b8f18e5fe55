use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{InteractionType, UserInteraction};
use crate::stores::{CacheBackend, JobRequest, WorkQueue};

/// Delay before the background regeneration kicked off by an enrollment.
const REGENERATION_DELAY_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Recommendations,
    UserProfile,
    Similarity,
    LearningPaths,
    Analytics,
    MlFeatures,
    Collaborative,
}

impl CacheCategory {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheCategory::Recommendations => "recommendations",
            CacheCategory::UserProfile => "user_profile",
            CacheCategory::Similarity => "similarity",
            CacheCategory::LearningPaths => "learning_paths",
            CacheCategory::Analytics => "analytics",
            CacheCategory::MlFeatures => "ml_features",
            CacheCategory::Collaborative => "collaborative",
        }
    }

    pub fn ttl_secs(&self, config: &Config) -> u64 {
        match self {
            CacheCategory::Recommendations => config.cache.recommendations_ttl_secs,
            CacheCategory::UserProfile => config.cache.user_profile_ttl_secs,
            CacheCategory::Similarity => config.cache.similarity_ttl_secs,
            CacheCategory::LearningPaths => config.cache.learning_path_ttl_secs,
            CacheCategory::Analytics => config.cache.analytics_ttl_secs,
            CacheCategory::MlFeatures => config.cache.ml_features_ttl_secs,
            CacheCategory::Collaborative => config.cache.collaborative_ttl_secs,
        }
    }

    fn all() -> [CacheCategory; 7] {
        [
            CacheCategory::Recommendations,
            CacheCategory::UserProfile,
            CacheCategory::Similarity,
            CacheCategory::LearningPaths,
            CacheCategory::Analytics,
            CacheCategory::MlFeatures,
            CacheCategory::Collaborative,
        ]
    }
}

/// Keyed, TTL-based cache facade. Failures of the backing store are logged
/// and swallowed; the cache must never fail a primary operation.
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    queue: Arc<dyn WorkQueue>,
    config: Arc<Config>,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>, queue: Arc<dyn WorkQueue>, config: Arc<Config>) -> Self {
        Self {
            backend,
            queue,
            config,
        }
    }

    /// `{prefix}:{user_id}[:k=v]*` with params sorted for key stability.
    pub fn key(category: CacheCategory, user_id: Uuid, params: &[(&str, String)]) -> String {
        let mut key = format!("{}:{}", category.prefix(), user_id);
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        for (k, v) in sorted {
            key.push_str(&format!(":{}={}", k, v));
        }
        key
    }

    /// Order-independent pair key for similarity scores.
    pub fn similarity_key(a: Uuid, b: Uuid) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{}:{}:{}", CacheCategory::Similarity.prefix(), lo, hi)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get_raw(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, category: CacheCategory) {
        let ttl = category.ttl_secs(&self.config);
        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = self.backend.set_raw(key, raw, ttl).await {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Cache serialization failed for {}: {}", key, e),
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.backend.del(key).await {
            warn!("Cache invalidation failed for {}: {}", key, e);
        }
    }

    /// Clears every category for a user.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        for category in CacheCategory::all() {
            let prefix = format!("{}:{}", category.prefix(), user_id);
            if let Err(e) = self.backend.del_prefix(&prefix).await {
                warn!("Cache invalidation failed for prefix {}: {}", prefix, e);
            }
        }
        debug!("Invalidated all cache categories for user {}", user_id);
    }

    /// Interaction hook: enrollments invalidate the user's recommendation
    /// entries and schedule a delayed background regeneration.
    pub async fn on_interaction(&self, interaction: &UserInteraction) {
        if interaction.interaction_type != InteractionType::Enroll {
            return;
        }

        let prefix = format!(
            "{}:{}",
            CacheCategory::Recommendations.prefix(),
            interaction.user_id
        );
        if let Err(e) = self.backend.del_prefix(&prefix).await {
            warn!("Cache invalidation failed for prefix {}: {}", prefix, e);
        }

        let job = JobRequest::new(
            "regenerate_recommendations",
            serde_json::json!({ "user_ids": [interaction.user_id] }),
        )
        .with_delay_ms(REGENERATION_DELAY_MS);
        if let Err(e) = self.queue.enqueue(job).await {
            warn!(
                "Failed to enqueue regeneration for user {}: {}",
                interaction.user_id, e
            );
        }
    }

    pub async fn reset(&self) {
        if let Err(e) = self.backend.reset().await {
            warn!("Cache reset failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryCacheBackend, InMemoryWorkQueue};

    fn service(queue: Arc<InMemoryWorkQueue>) -> CacheService {
        CacheService::new(
            Arc::new(InMemoryCacheBackend::new()),
            queue,
            Arc::new(Config::default()),
        )
    }

    #[test]
    fn test_key_params_are_sorted() {
        let user = Uuid::new_v4();
        let a = CacheService::key(
            CacheCategory::Recommendations,
            user,
            &[("limit", "10".to_string()), ("kind", "course".to_string())],
        );
        let b = CacheService::key(
            CacheCategory::Recommendations,
            user,
            &[("kind", "course".to_string()), ("limit", "10".to_string())],
        );
        assert_eq!(a, b);
        assert!(a.starts_with(&format!("recommendations:{}", user)));
    }

    #[test]
    fn test_similarity_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            CacheService::similarity_key(a, b),
            CacheService::similarity_key(b, a)
        );
    }

    #[tokio::test]
    async fn test_roundtrip_and_user_invalidation() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let cache = service(queue);
        let user = Uuid::new_v4();

        let key = CacheService::key(CacheCategory::UserProfile, user, &[]);
        cache.set_json(&key, &"profile", CacheCategory::UserProfile).await;
        assert_eq!(cache.get_json::<String>(&key).await.as_deref(), Some("profile"));

        cache.invalidate_user(user).await;
        assert!(cache.get_json::<String>(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_enrollment_triggers_regeneration_job() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let cache = service(queue.clone());
        let user = Uuid::new_v4();

        let interaction = UserInteraction::new(user, Uuid::new_v4(), InteractionType::Enroll);
        cache.on_interaction(&interaction).await;

        let jobs = queue.jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "regenerate_recommendations");
        assert!(jobs[0].delay_ms > 0);

        // Non-enrollment interactions schedule nothing.
        let view = UserInteraction::new(user, Uuid::new_v4(), InteractionType::View);
        cache.on_interaction(&view).await;
        assert_eq!(queue.jobs().await.len(), 1);
    }
}
