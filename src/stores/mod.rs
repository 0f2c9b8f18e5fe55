//! External collaborator contracts.
//!
//! Persistence, the work queue, the analytics pipeline and the cache backend
//! live outside this crate. They are modelled as async traits here, with
//! in-memory implementations used for tests and single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::*;

/// Append-only log of user-course interactions.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn record(&self, interaction: UserInteraction) -> Result<()>;

    /// Interactions for one user, most recent first, capped at `limit`.
    async fn for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<UserInteraction>>;

    /// Distinct users who interacted with a course.
    async fn users_for_course(&self, course_id: Uuid) -> Result<HashSet<Uuid>>;

    /// Distinct users (excluding `exclude`) sharing at least one of the given courses.
    async fn users_sharing_courses(&self, course_ids: &[Uuid], exclude: Uuid) -> Result<Vec<Uuid>>;

    /// Per-course interaction counts since the given instant (trending input).
    async fn interaction_counts_since(&self, since: DateTime<Utc>) -> Result<HashMap<Uuid, u64>>;
}

/// Filtered course listing contract offered by the course directory.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub active_only: bool,
    pub skills_any: Vec<String>,
    pub difficulties: Vec<Difficulty>,
    pub max_duration_minutes: Option<u32>,
    pub include_topics: Vec<String>,
    pub exclude_topics: Vec<String>,
    pub exclude_ids: Vec<Uuid>,
    pub limit: Option<usize>,
}

impl CourseFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    fn matches(&self, course: &Course) -> bool {
        if self.active_only && !course.is_active {
            return false;
        }
        if self.exclude_ids.contains(&course.id) {
            return false;
        }
        if !self.skills_any.is_empty()
            && !course.skills.iter().any(|s| self.skills_any.contains(s))
        {
            return false;
        }
        if !self.difficulties.is_empty() && !self.difficulties.contains(&course.difficulty) {
            return false;
        }
        if let Some(max) = self.max_duration_minutes {
            if course.duration_minutes > max {
                return false;
            }
        }
        if !self.include_topics.is_empty()
            && !course.tags.iter().any(|t| self.include_topics.contains(t))
        {
            return false;
        }
        if course.tags.iter().any(|t| self.exclude_topics.contains(t)) {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait CourseDirectory: Send + Sync {
    async fn get(&self, course_id: Uuid) -> Result<Option<Course>>;

    /// Matching courses ordered by rating descending.
    async fn find(&self, filter: &CourseFilter) -> Result<Vec<Course>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<User>>;
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationQuery {
    pub recommendation_type: Option<RecommendationType>,
    pub status: Option<RecommendationStatus>,
    pub min_confidence: Option<f32>,
    pub include_expired: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn insert_batch(&self, recommendations: Vec<Recommendation>) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Recommendation>>;

    async fn for_user(&self, user_id: Uuid, query: &RecommendationQuery) -> Result<Vec<Recommendation>>;

    /// Serialized read-modify-write on a single record. Concurrent mutations
    /// of the same recommendation are applied one at a time.
    async fn mutate(
        &self,
        id: Uuid,
        f: Box<dyn for<'a> FnOnce(&'a mut Recommendation) + Send>,
    ) -> Result<Recommendation>;
}

#[derive(Debug, Clone, Default)]
pub struct PathQuery {
    pub status: Option<PathStatus>,
    pub skill_area: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[async_trait]
pub trait LearningPathRepository: Send + Sync {
    async fn insert(&self, path: LearningPath, steps: Vec<LearningPathStep>) -> Result<()>;

    async fn get(&self, path_id: Uuid) -> Result<Option<LearningPath>>;

    /// Steps for a path in step_order.
    async fn steps(&self, path_id: Uuid) -> Result<Vec<LearningPathStep>>;

    async fn for_user(&self, user_id: Uuid, query: &PathQuery) -> Result<Vec<LearningPath>>;

    async fn save_path(&self, path: LearningPath) -> Result<()>;

    async fn save_step(&self, step: LearningPathStep) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    pub payload: serde_json::Value,
    pub priority: u8,
    pub attempts: u32,
    pub backoff_base_ms: u64,
    pub delay_ms: u64,
}

impl JobRequest {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            priority: 5,
            attempts: 3,
            backoff_base_ms: 2000,
            delay_ms: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// External work queue offering at-least-once delivery with retry/backoff.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, job: JobRequest) -> Result<()>;
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: AnalyticsEvent) -> Result<()>;
}

/// Raw string cache contract (backed by Redis or similar in production).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;
    async fn set_raw(&self, key: &str, value: String, ttl_secs: u64) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn del_prefix(&self, prefix: &str) -> Result<()>;
    async fn reset(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryInteractionStore {
    interactions: RwLock<Vec<UserInteraction>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn record(&self, interaction: UserInteraction) -> Result<()> {
        self.interactions.write().await.push(interaction);
        Ok(())
    }

    async fn for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<UserInteraction>> {
        let interactions = self.interactions.read().await;
        let mut result: Vec<UserInteraction> = interactions
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn users_for_course(&self, course_id: Uuid) -> Result<HashSet<Uuid>> {
        let interactions = self.interactions.read().await;
        Ok(interactions
            .iter()
            .filter(|i| i.course_id == course_id)
            .map(|i| i.user_id)
            .collect())
    }

    async fn users_sharing_courses(&self, course_ids: &[Uuid], exclude: Uuid) -> Result<Vec<Uuid>> {
        let interactions = self.interactions.read().await;
        let mut users = HashSet::new();
        for i in interactions.iter() {
            if i.user_id != exclude && course_ids.contains(&i.course_id) {
                users.insert(i.user_id);
            }
        }
        Ok(users.into_iter().collect())
    }

    async fn interaction_counts_since(&self, since: DateTime<Utc>) -> Result<HashMap<Uuid, u64>> {
        let interactions = self.interactions.read().await;
        let mut counts = HashMap::new();
        for i in interactions.iter() {
            if i.created_at >= since {
                *counts.entry(i.course_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryCourseDirectory {
    courses: DashMap<Uuid, Course>,
}

impl InMemoryCourseDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, course: Course) {
        self.courses.insert(course.id, course);
    }
}

#[async_trait]
impl CourseDirectory for InMemoryCourseDirectory {
    async fn get(&self, course_id: Uuid) -> Result<Option<Course>> {
        Ok(self.courses.get(&course_id).map(|c| c.clone()))
    }

    async fn find(&self, filter: &CourseFilter) -> Result<Vec<Course>> {
        let mut result: Vec<Course> = self
            .courses
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        result.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<Uuid, User>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryRecommendationRepository {
    recommendations: DashMap<Uuid, Recommendation>,
}

impl InMemoryRecommendationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.recommendations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }
}

#[async_trait]
impl RecommendationRepository for InMemoryRecommendationRepository {
    async fn insert_batch(&self, recommendations: Vec<Recommendation>) -> Result<()> {
        let count = recommendations.len();
        for rec in recommendations {
            self.recommendations.insert(rec.id, rec);
        }
        info!("Persisted {} recommendations", count);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Recommendation>> {
        Ok(self.recommendations.get(&id).map(|r| r.clone()))
    }

    async fn for_user(&self, user_id: Uuid, query: &RecommendationQuery) -> Result<Vec<Recommendation>> {
        let now = Utc::now();
        let mut result: Vec<Recommendation> = self
            .recommendations
            .iter()
            .filter(|entry| {
                let r = entry.value();
                if r.user_id != user_id {
                    return false;
                }
                if let Some(t) = query.recommendation_type {
                    if r.recommendation_type != t {
                        return false;
                    }
                }
                if let Some(s) = query.status {
                    if r.status != s {
                        return false;
                    }
                }
                if let Some(min) = query.min_confidence {
                    if r.confidence_score < min {
                        return false;
                    }
                }
                if !query.include_expired && r.is_expired(now) {
                    return false;
                }
                true
            })
            .map(|entry| entry.value().clone())
            .collect();

        result.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal))
        });

        let result: Vec<Recommendation> = result
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(result)
    }

    async fn mutate(
        &self,
        id: Uuid,
        f: Box<dyn for<'a> FnOnce(&'a mut Recommendation) + Send>,
    ) -> Result<Recommendation> {
        // The shard lock held by get_mut serializes concurrent writers.
        let mut entry = self
            .recommendations
            .get_mut(&id)
            .ok_or_else(|| EngineError::recommendation_not_found(id))?;
        f(entry.value_mut());
        Ok(entry.value().clone())
    }
}

#[derive(Default)]
pub struct InMemoryLearningPathRepository {
    paths: DashMap<Uuid, LearningPath>,
    steps: DashMap<Uuid, Vec<LearningPathStep>>,
}

impl InMemoryLearningPathRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LearningPathRepository for InMemoryLearningPathRepository {
    async fn insert(&self, path: LearningPath, steps: Vec<LearningPathStep>) -> Result<()> {
        info!("Persisted learning path {} with {} steps", path.id, steps.len());
        self.steps.insert(path.id, steps);
        self.paths.insert(path.id, path);
        Ok(())
    }

    async fn get(&self, path_id: Uuid) -> Result<Option<LearningPath>> {
        Ok(self.paths.get(&path_id).map(|p| p.clone()))
    }

    async fn steps(&self, path_id: Uuid) -> Result<Vec<LearningPathStep>> {
        let mut steps = self.steps.get(&path_id).map(|s| s.clone()).unwrap_or_default();
        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }

    async fn for_user(&self, user_id: Uuid, query: &PathQuery) -> Result<Vec<LearningPath>> {
        let mut result: Vec<LearningPath> = self
            .paths
            .iter()
            .filter(|entry| {
                let p = entry.value();
                if p.user_id != user_id {
                    return false;
                }
                if let Some(s) = query.status {
                    if p.status != s {
                        return false;
                    }
                }
                if let Some(ref area) = query.skill_area {
                    if !p.target_skills.contains(area) {
                        return false;
                    }
                }
                true
            })
            .map(|entry| entry.value().clone())
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let result: Vec<LearningPath> = result
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(result)
    }

    async fn save_path(&self, path: LearningPath) -> Result<()> {
        if !self.paths.contains_key(&path.id) {
            return Err(EngineError::path_not_found(path.id));
        }
        self.paths.insert(path.id, path);
        Ok(())
    }

    async fn save_step(&self, step: LearningPathStep) -> Result<()> {
        let mut steps = self
            .steps
            .get_mut(&step.learning_path_id)
            .ok_or_else(|| EngineError::path_not_found(step.learning_path_id))?;
        match steps.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => {
                *existing = step;
                Ok(())
            }
            None => Err(EngineError::step_not_found(step.id)),
        }
    }
}

#[derive(Default)]
pub struct InMemoryWorkQueue {
    jobs: RwLock<Vec<JobRequest>>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<JobRequest> {
        self.jobs.read().await.clone()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn enqueue(&self, job: JobRequest) -> Result<()> {
        info!("Enqueued job '{}' (priority {})", job.name, job.priority);
        self.jobs.write().await.push(job);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAnalyticsSink {
    events: RwLock<Vec<AnalyticsEvent>>,
}

impl InMemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AnalyticsSink for InMemoryAnalyticsSink {
    async fn record(&self, event: AnalyticsEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

pub struct InMemoryCacheBackend {
    entries: DashMap<String, (String, DateTime<Utc>)>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if Utc::now() < *expires_at {
                return Ok(Some(value.clone()));
            }
        }
        // Expired entries are dropped lazily on read.
        self.entries.remove(key);
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn del_prefix(&self, prefix: &str) -> Result<()> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.entries.remove(&key);
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Convenience bundle of in-memory collaborators used in tests and benches.
pub struct InMemoryBackends {
    pub interactions: Arc<InMemoryInteractionStore>,
    pub courses: Arc<InMemoryCourseDirectory>,
    pub users: Arc<InMemoryUserDirectory>,
    pub recommendations: Arc<InMemoryRecommendationRepository>,
    pub paths: Arc<InMemoryLearningPathRepository>,
    pub queue: Arc<InMemoryWorkQueue>,
    pub analytics: Arc<InMemoryAnalyticsSink>,
    pub cache: Arc<InMemoryCacheBackend>,
}

impl InMemoryBackends {
    pub fn new() -> Self {
        Self {
            interactions: Arc::new(InMemoryInteractionStore::new()),
            courses: Arc::new(InMemoryCourseDirectory::new()),
            users: Arc::new(InMemoryUserDirectory::new()),
            recommendations: Arc::new(InMemoryRecommendationRepository::new()),
            paths: Arc::new(InMemoryLearningPathRepository::new()),
            queue: Arc::new(InMemoryWorkQueue::new()),
            analytics: Arc::new(InMemoryAnalyticsSink::new()),
            cache: Arc::new(InMemoryCacheBackend::new()),
        }
    }
}

impl Default for InMemoryBackends {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recommendation(user_id: Uuid) -> Recommendation {
        let draft = RecommendationDraft::new(
            Uuid::new_v4(),
            GeneratorKind::ContentBased,
            RecommendationReason::InterestBased,
            0.7,
        );
        Recommendation::from_draft(user_id, draft, Utc::now())
    }

    #[tokio::test]
    async fn test_mutate_applies_closure_and_returns_updated_record() {
        let repo = InMemoryRecommendationRepository::new();
        let rec = sample_recommendation(Uuid::new_v4());
        let id = rec.id;
        repo.insert_batch(vec![rec]).await.unwrap();

        let now = Utc::now();
        let updated = repo
            .mutate(id, Box::new(move |r| r.mark_viewed(now)))
            .await
            .unwrap();
        assert_eq!(updated.viewed_at, Some(now));

        // Stored copy reflects the mutation too.
        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.viewed_at, Some(now));
    }

    #[tokio::test]
    async fn test_mutate_unknown_id_is_not_found() {
        let repo = InMemoryRecommendationRepository::new();
        let err = repo
            .mutate(Uuid::new_v4(), Box::new(|r| r.dismiss(Utc::now())))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
