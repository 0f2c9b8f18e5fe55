//! Ensemble orchestration: fan out to the strategy generators, merge and
//! re-rank their drafts, apply business filters and diversity caps, persist
//! the survivors and report analytics.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::models::*;
use crate::services::cache::{CacheCategory, CacheService};
use crate::services::collaborative::CollaborativeFilteringGenerator;
use crate::services::content::ContentSimilarityGenerator;
use crate::services::personalization::PersonalizationScorer;
use crate::services::resilience::RequestDeduplicator;
use crate::services::{GenerateOptions, RecommendationGenerator, RequestContext};
use crate::stores::{
    AnalyticsSink, CourseDirectory, CourseFilter, InteractionStore, RecommendationQuery,
    RecommendationRepository, UserDirectory,
};

// Share of the requested limit each strategy is asked for. The heuristics
// (trending, skill gap) run inline and get a smaller slice.
const COLLABORATIVE_SHARE: f32 = 0.4;
const CONTENT_SHARE: f32 = 0.3;
const PERSONALIZATION_SHARE: f32 = 0.3;
const HEURISTIC_SHARE: f32 = 0.2;

// Relevance boosts applied during ensemble re-ranking.
const RECENT_INTERACTION_BOOST: f32 = 1.2;
const FAVORITE_TOPIC_BOOST: f32 = 1.15;

/// Caller-tunable knobs for one generation call. The zero value means
/// "engine defaults".
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub limit: usize,
    pub exclude_course_ids: Vec<Uuid>,
    /// When non-empty, only drafts with one of these reasons survive.
    pub reasons: Vec<RecommendationReason>,
    pub min_confidence: Option<f32>,
}

pub struct RecommendationOrchestrator {
    users: Arc<dyn UserDirectory>,
    interactions: Arc<dyn InteractionStore>,
    courses: Arc<dyn CourseDirectory>,
    repository: Arc<dyn RecommendationRepository>,
    analytics: Arc<dyn AnalyticsSink>,
    cache: Arc<CacheService>,
    collaborative: Arc<CollaborativeFilteringGenerator>,
    content: Arc<ContentSimilarityGenerator>,
    personalization: Arc<PersonalizationScorer>,
    deduplicator: RequestDeduplicator<Result<Vec<Recommendation>>>,
    config: Arc<Config>,
}

impl RecommendationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        interactions: Arc<dyn InteractionStore>,
        courses: Arc<dyn CourseDirectory>,
        repository: Arc<dyn RecommendationRepository>,
        analytics: Arc<dyn AnalyticsSink>,
        cache: Arc<CacheService>,
        collaborative: Arc<CollaborativeFilteringGenerator>,
        content: Arc<ContentSimilarityGenerator>,
        personalization: Arc<PersonalizationScorer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            users,
            interactions,
            courses,
            repository,
            analytics,
            cache,
            collaborative,
            content,
            personalization,
            deduplicator: RequestDeduplicator::from_config(&config),
            config,
        }
    }

    /// Builds the shared per-request context. An unknown user is the one
    /// fatal condition here.
    async fn build_context(&self, user_id: Uuid) -> Result<RequestContext> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::user_not_found(user_id))?;

        let interactions = self
            .interactions
            .for_user(user_id, self.config.recommendation.context_interaction_limit)
            .await?;

        let mut courses = HashMap::new();
        for interaction in &interactions {
            if courses.contains_key(&interaction.course_id) {
                continue;
            }
            if let Some(course) = self.courses.get(interaction.course_id).await? {
                courses.insert(course.id, course);
            }
        }

        Ok(RequestContext::new(user, interactions, courses))
    }

    fn share(limit: usize, fraction: f32) -> usize {
        ((limit as f32 * fraction).ceil() as usize).max(1)
    }

    /// Full ensemble generation with engine defaults. Repeated calls within
    /// the cache TTL return the already-persisted batch instead of
    /// generating a new one.
    pub async fn generate_recommendations(
        self: &Arc<Self>,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        self.generate(
            user_id,
            &GenerationRequest {
                limit,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn generate(
        self: &Arc<Self>,
        user_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<Vec<Recommendation>> {
        let limit = self.effective_limit(request);

        // Only default-shaped requests are cacheable; custom excludes or
        // reason filters always generate fresh.
        if !Self::cacheable(request) {
            return self.generate_fresh(user_id, request).await;
        }

        let cache_key = Self::generation_key(user_id, limit);
        if let Some(cached) = self.cache.get_json::<Vec<Recommendation>>(&cache_key).await {
            debug!("Serving cached recommendations for user {}", user_id);
            return Ok(cached);
        }

        // Concurrent identical cache misses share one in-flight generation
        // instead of each persisting their own batch.
        self.deduplicator.sweep();
        let this = self.clone();
        let request = request.clone();
        self.deduplicator
            .run(&cache_key, async move {
                this.generate_fresh(user_id, &request).await
            })
            .await
    }

    fn effective_limit(&self, request: &GenerationRequest) -> usize {
        if request.limit == 0 {
            self.config.recommendation.default_limit
        } else {
            request.limit
        }
    }

    fn cacheable(request: &GenerationRequest) -> bool {
        request.exclude_course_ids.is_empty() && request.reasons.is_empty()
    }

    fn generation_key(user_id: Uuid, limit: usize) -> String {
        CacheService::key(
            CacheCategory::Recommendations,
            user_id,
            &[("limit", limit.to_string())],
        )
    }

    async fn generate_fresh(
        &self,
        user_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<Vec<Recommendation>> {
        let started = Instant::now();
        let limit = self.effective_limit(request);

        let context = self.build_context(user_id).await?;

        let strategy_opts = |fraction: f32| GenerateOptions {
            limit: Self::share(limit, fraction),
            min_confidence: self.config.recommendation.min_confidence,
        };

        let collaborative_opts = strategy_opts(COLLABORATIVE_SHARE);
        let content_opts = strategy_opts(CONTENT_SHARE);
        let personalization_opts = strategy_opts(PERSONALIZATION_SHARE);
        let heuristic_limit = Self::share(limit, HEURISTIC_SHARE);

        // The three strategies run concurrently; each degrades to an empty
        // list on internal failure. The two heuristics are cheap enough to
        // join in the same round.
        let (collaborative, content, personalized, trending, skill_gap) = tokio::join!(
            self.collaborative.generate(&context, &collaborative_opts),
            self.content.generate(&context, &content_opts),
            self.personalization.generate(&context, &personalization_opts),
            self.trending_drafts(&context, heuristic_limit),
            self.skill_gap_drafts(&context, heuristic_limit),
        );

        let mut drafts = collaborative;
        drafts.extend(content);
        drafts.extend(personalized);
        drafts.extend(trending);
        drafts.extend(skill_gap);

        let merged = Self::merge_duplicates(drafts);
        let filtered = self.business_filter(request, merged).await?;
        let ranked = self.rank_ensemble(&context, filtered);
        let selected = self.diversity_pass(&context, ranked, limit);

        let now = Utc::now();
        let recommendations: Vec<Recommendation> = selected
            .into_iter()
            .map(|draft| Recommendation::from_draft(user_id, draft, now))
            .collect();

        // Persistence is fatal; analytics and caching are not.
        self.repository.insert_batch(recommendations.clone()).await?;

        let event = AnalyticsEvent {
            user_id,
            algorithm_version: self.config.recommendation.algorithm_version.clone(),
            recommendation_count: recommendations.len(),
            latency_ms: started.elapsed().as_millis() as u64,
            created_at: now,
        };
        if let Err(e) = self.analytics.record(event).await {
            warn!("Analytics record failed for user {}: {}", user_id, e);
        }

        if Self::cacheable(request) {
            let cache_key = Self::generation_key(user_id, limit);
            self.cache
                .set_json(&cache_key, &recommendations, CacheCategory::Recommendations)
                .await;
        }

        info!(
            "Generated {} recommendations for user {} in {}ms",
            recommendations.len(),
            user_id,
            started.elapsed().as_millis()
        );
        Ok(recommendations)
    }

    /// Courses with the most interactions inside the trending window,
    /// scored by count relative to the window leader.
    async fn trending_drafts(&self, context: &RequestContext, limit: usize) -> Vec<RecommendationDraft> {
        let since = Utc::now() - Duration::days(self.config.recommendation.trending_window_days);
        let counts = match self.interactions.interaction_counts_since(since).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Trending heuristic degraded to empty result: {}", e);
                return Vec::new();
            }
        };

        let max_count = counts.values().copied().max().unwrap_or(0);
        if max_count == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(Uuid, u64)> = counts
            .into_iter()
            .filter(|(course_id, _)| !context.has_interacted(*course_id))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        ranked
            .into_iter()
            .take(limit)
            .map(|(course_id, count)| {
                let score = count as f32 / max_count as f32;
                RecommendationDraft::new(
                    course_id,
                    GeneratorKind::Trending,
                    RecommendationReason::Trending,
                    score,
                )
                .with_explanation(format!(
                    "Popular this week with {} recent interactions",
                    count
                ))
            })
            .collect()
    }

    /// Courses teaching skills the user wants but does not have yet, scored
    /// by how much of the gap each course covers.
    async fn skill_gap_drafts(&self, context: &RequestContext, limit: usize) -> Vec<RecommendationDraft> {
        let gap: Vec<String> = context
            .user
            .desired_skills
            .iter()
            .filter(|s| !context.user.current_skills.contains(s))
            .cloned()
            .collect();
        if gap.is_empty() {
            return Vec::new();
        }

        let filter = CourseFilter {
            active_only: true,
            skills_any: gap.clone(),
            exclude_ids: context.recent_course_ids(),
            limit: Some(limit * 2),
            ..Default::default()
        };
        let candidates = match self.courses.find(&filter).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Skill-gap heuristic degraded to empty result: {}", e);
                return Vec::new();
            }
        };

        let mut drafts: Vec<RecommendationDraft> = candidates
            .into_iter()
            .map(|course| {
                let covered = course.skills.iter().filter(|s| gap.contains(s)).count();
                let score = covered as f32 / gap.len() as f32;
                let matched: Vec<&String> = course
                    .skills
                    .iter()
                    .filter(|s| gap.contains(s))
                    .collect();
                RecommendationDraft::new(
                    course.id,
                    GeneratorKind::SkillGap,
                    RecommendationReason::SkillGap,
                    score,
                )
                .with_explanation(format!(
                    "Teaches {} from your skill goals",
                    matched
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
            .collect();

        drafts.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        drafts.truncate(limit);
        drafts
    }

    /// Drafts for the same (course, recommendation type) pair are merged by
    /// averaging their scores; the strongest priority and the first
    /// explanation win.
    fn merge_duplicates(drafts: Vec<RecommendationDraft>) -> Vec<RecommendationDraft> {
        let mut merged: HashMap<(Uuid, RecommendationType), (RecommendationDraft, f32, f32, u32)> =
            HashMap::new();

        for draft in drafts {
            let key = (draft.course_id, draft.recommendation_type);
            match merged.get_mut(&key) {
                Some((kept, conf_sum, rel_sum, count)) => {
                    *conf_sum += draft.confidence_score;
                    *rel_sum += draft.relevance_score;
                    *count += 1;
                    kept.priority = kept.priority.max(draft.priority);
                    if kept.explanation.is_empty() {
                        kept.explanation = draft.explanation;
                    }
                }
                None => {
                    let conf = draft.confidence_score;
                    let rel = draft.relevance_score;
                    merged.insert(key, (draft, conf, rel, 1));
                }
            }
        }

        merged
            .into_values()
            .map(|(mut draft, conf_sum, rel_sum, count)| {
                draft.confidence_score = conf_sum / count as f32;
                draft.relevance_score = rel_sum / count as f32;
                draft
            })
            .collect()
    }

    /// Ensemble re-ranking: relevance becomes confidence times the strategy
    /// weight, boosted for affinity with recent courses and favorite topics,
    /// then priority boosts are layered on top of the base band.
    fn rank_ensemble(
        &self,
        context: &RequestContext,
        drafts: Vec<RecommendationDraft>,
    ) -> Vec<RecommendationDraft> {
        let favorites: HashSet<&String> = context.user.favorite_topics.iter().collect();

        let mut ranked: Vec<RecommendationDraft> = drafts
            .into_iter()
            .map(|mut draft| {
                let mut relevance = draft.confidence_score * draft.kind.ensemble_weight();

                if context.has_interacted(draft.course_id) {
                    relevance *= RECENT_INTERACTION_BOOST;
                }
                let course_tags: Vec<String> = draft
                    .metadata
                    .get("tags")
                    .and_then(|t| serde_json::from_value(t.clone()).ok())
                    .unwrap_or_default();
                if course_tags.iter().any(|t| favorites.contains(t)) {
                    relevance *= FAVORITE_TOPIC_BOOST;
                }
                draft.relevance_score = relevance.clamp(0.0, 1.0);

                // Deliberately uncapped: a high-confidence skill-gap match
                // can outrank every banded score.
                match draft.reason {
                    RecommendationReason::SkillGap => draft.priority += 3,
                    RecommendationReason::Continuation => draft.priority += 2,
                    _ => {}
                }
                if draft.confidence_score > 0.8 {
                    draft.priority += 1;
                }
                draft
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then(
                b.relevance_score
                    .partial_cmp(&a.relevance_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        ranked
    }

    /// Business filters: requested exclusions and reason filters, inactive
    /// courses, and the confidence floor. Survivors get the course tags
    /// attached to their metadata for the ranking and diversity stages.
    async fn business_filter(
        &self,
        request: &GenerationRequest,
        drafts: Vec<RecommendationDraft>,
    ) -> Result<Vec<RecommendationDraft>> {
        let min_confidence = request
            .min_confidence
            .unwrap_or(self.config.recommendation.min_confidence);
        let mut kept = Vec::with_capacity(drafts.len());

        for mut draft in drafts {
            if request.exclude_course_ids.contains(&draft.course_id) {
                continue;
            }
            if !request.reasons.is_empty() && !request.reasons.contains(&draft.reason) {
                continue;
            }
            if draft.confidence_score < min_confidence {
                continue;
            }
            match self.courses.get(draft.course_id).await? {
                Some(course) if course.is_active => {
                    draft.metadata["tags"] = serde_json::json!(course.tags);
                    kept.push(draft);
                }
                _ => {}
            }
        }
        Ok(kept)
    }

    /// Caps each recommendation type and each tag; over-cap drafts are
    /// skipped, never replaced, so the result may come in under the limit.
    fn diversity_pass(
        &self,
        context: &RequestContext,
        drafts: Vec<RecommendationDraft>,
        limit: usize,
    ) -> Vec<RecommendationDraft> {
        let max_per_type = self.config.recommendation.max_per_type;
        let max_per_tag = self.config.recommendation.max_per_tag;

        let mut type_counts: HashMap<RecommendationType, usize> = HashMap::new();
        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        let mut selected = Vec::with_capacity(limit);

        for draft in drafts {
            if selected.len() >= limit {
                break;
            }

            let type_count = type_counts.entry(draft.recommendation_type).or_insert(0);
            if *type_count >= max_per_type {
                continue;
            }

            let tags: Vec<String> = draft
                .metadata
                .get("tags")
                .and_then(|t| serde_json::from_value(t.clone()).ok())
                .unwrap_or_default();
            if tags
                .iter()
                .any(|t| tag_counts.get(t).copied().unwrap_or(0) >= max_per_tag)
            {
                continue;
            }

            *type_count += 1;
            for tag in tags {
                *tag_counts.entry(tag).or_insert(0) += 1;
            }
            selected.push(draft);
        }

        debug!(
            "Diversity pass kept {} of {} slots for user {}",
            selected.len(),
            limit,
            context.user.id
        );
        selected
    }

    /// "More like this" listing for a course detail page, backed by the
    /// content feature blend. Unknown courses yield an empty list.
    pub async fn similar_courses(&self, course_id: Uuid, limit: usize) -> Result<Vec<(Course, f32)>> {
        self.content.find_similar_courses(course_id, limit).await
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    pub async fn list_recommendations(
        &self,
        user_id: Uuid,
        query: &RecommendationQuery,
    ) -> Result<Vec<Recommendation>> {
        self.repository.for_user(user_id, query).await
    }

    /// Fetch by id, recording an implicit view on first access.
    pub async fn get_recommendation(&self, id: Uuid) -> Result<Recommendation> {
        let now = Utc::now();
        self.repository
            .mutate(id, Box::new(move |rec| rec.mark_viewed(now)))
            .await
    }

    pub async fn record_view(&self, id: Uuid) -> Result<Recommendation> {
        let now = Utc::now();
        self.repository
            .mutate(id, Box::new(move |rec| rec.mark_viewed(now)))
            .await
    }

    pub async fn record_click(&self, id: Uuid) -> Result<Recommendation> {
        let now = Utc::now();
        self.repository
            .mutate(
                id,
                Box::new(move |rec| {
                    rec.mark_viewed(now);
                    rec.mark_clicked(now);
                }),
            )
            .await
    }

    pub async fn dismiss(&self, id: Uuid) -> Result<Recommendation> {
        let now = Utc::now();
        let dismissed = self
            .repository
            .mutate(id, Box::new(move |rec| rec.dismiss(now)))
            .await?;
        self.cache.invalidate_user(dismissed.user_id).await;
        Ok(dismissed)
    }

    /// Stores explicit feedback in the recommendation's metadata and feeds
    /// it to the personalization model.
    pub async fn record_feedback(
        &self,
        id: Uuid,
        feedback: RecommendationFeedback,
    ) -> Result<Recommendation> {
        if !(0.0..=5.0).contains(&feedback.score) {
            return Err(EngineError::Validation(format!(
                "feedback score {} outside [0, 5]",
                feedback.score
            )));
        }

        let stored = feedback.clone();
        let updated = self
            .repository
            .mutate(
                id,
                Box::new(move |rec| {
                    rec.metadata["feedback"] = serde_json::json!({
                        "score": stored.score,
                        "feedback_type": stored.feedback_type,
                        "comment": stored.comment,
                        "recorded_at": Utc::now(),
                    });
                }),
            )
            .await?;

        self.personalization
            .update_model_with_feedback(updated.user_id, id, feedback.score);
        Ok(updated)
    }
}
