use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use nalgebra::{DMatrix, DVector};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::models::*;
use crate::services::{GenerateOptions, RecommendationGenerator, RequestContext};
use crate::stores::{CourseDirectory, CourseFilter};
use crate::utils;

/// Dimensionality of the per-feature-group slices fed into the combined vector.
const GROUP_DIM: usize = 10;

/// Pluggable scoring model. The linear-plus-sigmoid implementation is the
/// hand-built default; a trained-model adapter can slot in behind the same
/// trait without touching the feature pipeline.
pub trait Scorer: Send + Sync {
    fn score(&self, features: &DVector<f32>) -> f32;
    fn version(&self) -> &str;
}

/// sigmoid(W x + b) over the combined feature vector. Weights are supplied
/// by an external trainer; `random_init` exists for experimentation only and
/// is never the production default.
pub struct LinearSigmoidModel {
    weights: DMatrix<f32>,
    bias: DVector<f32>,
    version: String,
}

impl LinearSigmoidModel {
    pub fn new(weights: DMatrix<f32>, bias: DVector<f32>, version: impl Into<String>) -> Self {
        Self {
            weights,
            bias,
            version: version.into(),
        }
    }

    pub fn random_init(feature_dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let weights = DMatrix::from_fn(1, feature_dim, |_, _| rng.gen_range(-0.1..0.1));
        let bias = DVector::from_element(1, 0.0);
        Self::new(weights, bias, "random-init")
    }
}

impl Scorer for LinearSigmoidModel {
    fn score(&self, features: &DVector<f32>) -> f32 {
        let z = (&self.weights * features + &self.bias)[0];
        utils::sigmoid(z)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Debug, Clone)]
struct FeedbackRecord {
    user_id: Uuid,
    recommendation_id: Uuid,
    score: f32,
    recorded_at: DateTime<Utc>,
}

pub struct PersonalizationScorer {
    courses: Arc<dyn CourseDirectory>,
    config: Arc<Config>,
    model: RwLock<Option<Arc<dyn Scorer>>>,
    feedback_log: Mutex<Vec<FeedbackRecord>>,
    feedback_count: AtomicU64,
    last_retrain_trigger: Mutex<Option<DateTime<Utc>>>,
}

impl PersonalizationScorer {
    pub fn new(courses: Arc<dyn CourseDirectory>, config: Arc<Config>) -> Self {
        Self {
            courses,
            config,
            model: RwLock::new(None),
            feedback_log: Mutex::new(Vec::new()),
            feedback_count: AtomicU64::new(0),
            last_retrain_trigger: Mutex::new(None),
        }
    }

    pub fn load_model(&self, model: Arc<dyn Scorer>) {
        info!("Loaded personalization model '{}'", model.version());
        *self.model.write() = Some(model);
    }

    pub fn model_version(&self) -> Option<String> {
        self.model.read().as_ref().map(|m| m.version().to_string())
    }

    /// Log-scaled interaction-type counts in fixed slots. Empty slots are
    /// padded with low-magnitude noise so the embedding never degenerates to
    /// an all-zero vector.
    pub fn user_embedding(&self, context: &RequestContext) -> Vec<f32> {
        let mut counts: HashMap<InteractionType, u32> = HashMap::new();
        for interaction in &context.interactions {
            *counts.entry(interaction.interaction_type).or_insert(0) += 1;
        }

        let mut rng = rand::thread_rng();
        InteractionType::all()
            .iter()
            .map(|t| match counts.get(t) {
                Some(&c) => (1.0 + c as f32).ln(),
                None => rng.gen_range(-0.01..0.01),
            })
            .collect()
    }

    /// Hash-bucketed skill list; each occurrence adds 0.2, capped at 1.0.
    pub fn skill_vector(&self, user: &User) -> Vec<f32> {
        let buckets = self.config.personalization.skill_buckets;
        let mut vector = vec![0.0f32; buckets];
        for skill in user.current_skills.iter().chain(user.desired_skills.iter()) {
            let slot = utils::hash_bucket(skill, buckets);
            vector[slot] = (vector[slot] + 0.2).min(1.0);
        }
        vector
    }

    /// Hash-bucketed tag affinities from weighted interactions, tanh-squashed.
    pub fn preference_vector(&self, context: &RequestContext) -> Vec<f32> {
        let buckets = self.config.personalization.preference_buckets;
        let mut vector = vec![0.0f32; buckets];
        for interaction in &context.interactions {
            let Some(course) = context.courses.get(&interaction.course_id) else {
                continue;
            };
            let weight = interaction.effective_weight();
            for tag in &course.tags {
                let slot = utils::hash_bucket(tag, buckets);
                vector[slot] += weight;
            }
        }
        for v in vector.iter_mut() {
            *v = v.tanh();
        }
        vector
    }

    /// Per-type counts, 7-day recency count, average interactions per
    /// session, and completion rate.
    pub fn history_features(&self, context: &RequestContext) -> Vec<f32> {
        let mut features = Vec::with_capacity(InteractionType::all().len() + 3);

        let mut counts: HashMap<InteractionType, u32> = HashMap::new();
        for interaction in &context.interactions {
            *counts.entry(interaction.interaction_type).or_insert(0) += 1;
        }
        for t in InteractionType::all() {
            features.push(counts.get(&t).copied().unwrap_or(0) as f32);
        }

        let week_ago = Utc::now() - Duration::days(7);
        let recent = context
            .interactions
            .iter()
            .filter(|i| i.created_at >= week_ago)
            .count();
        features.push(recent as f32);

        let mut sessions: HashMap<&str, u32> = HashMap::new();
        for interaction in &context.interactions {
            if let Some(ref session) = interaction.session_id {
                *sessions.entry(session.as_str()).or_insert(0) += 1;
            }
        }
        let avg_session = if sessions.is_empty() {
            0.0
        } else {
            sessions.values().sum::<u32>() as f32 / sessions.len() as f32
        };
        features.push(avg_session);

        features.push(self.completion_rate(context));
        features
    }

    fn completion_rate(&self, context: &RequestContext) -> f32 {
        let enrolls = context
            .interactions
            .iter()
            .filter(|i| i.interaction_type == InteractionType::Enroll)
            .count();
        let completes = context
            .interactions
            .iter()
            .filter(|i| i.interaction_type == InteractionType::Complete)
            .count();
        if enrolls == 0 {
            0.0
        } else {
            (completes as f32 / enrolls as f32).min(1.0)
        }
    }

    pub fn contextual_features(&self, now: DateTime<Utc>) -> Vec<f32> {
        let hour = now.hour() as f32 / 24.0;
        let day_of_week = now.weekday().num_days_from_monday() as f32 / 7.0;
        // Device flag is unknown in a headless engine; reserved slot.
        vec![hour, day_of_week, 0.0]
    }

    /// Fixed-size content vector: difficulty tier, log-duration, rating,
    /// paid flag, then hashed tags in the remaining slots.
    pub fn content_embedding(&self, course: &Course) -> Vec<f32> {
        let mut embedding = vec![0.0f32; GROUP_DIM];
        embedding[0] = course.difficulty.tier() as f32 / 2.0;
        embedding[1] = (1.0 + course.duration_minutes as f32).ln() / 10.0;
        embedding[2] = course.rating / 5.0;
        embedding[3] = if course.is_paid { 1.0 } else { 0.0 };
        for tag in &course.tags {
            let slot = 4 + utils::hash_bucket(tag, GROUP_DIM - 4);
            embedding[slot] = (embedding[slot] + 0.25).min(1.0);
        }
        embedding
    }

    /// ML input contract: first 10 dims each of user embedding, content
    /// embedding, skill vector and preference vector, plus the contextual
    /// values, zero-padded or truncated to the configured dimension.
    pub fn combined_features(&self, context: &RequestContext, course: &Course) -> DVector<f32> {
        let dim = self.config.personalization.feature_dim;
        let mut combined = Vec::with_capacity(dim);

        let groups = [
            self.user_embedding(context),
            self.content_embedding(course),
            self.skill_vector(&context.user),
            self.preference_vector(context),
        ];
        for group in &groups {
            combined.extend(group.iter().copied().take(GROUP_DIM));
            if group.len() < GROUP_DIM {
                combined.extend(std::iter::repeat(0.0).take(GROUP_DIM - group.len()));
            }
        }
        combined.extend(self.contextual_features(Utc::now()));

        combined.resize(dim, 0.0);
        DVector::from_vec(combined)
    }

    fn skill_alignment(&self, user: &User, course: &Course) -> f32 {
        let buckets = self.config.personalization.skill_buckets;
        let user_vec = self.skill_vector(user);
        let mut course_vec = vec![0.0f32; buckets];
        for skill in &course.skills {
            let slot = utils::hash_bucket(skill, buckets);
            course_vec[slot] = (course_vec[slot] + 0.2).min(1.0);
        }
        utils::cosine_similarity(&user_vec, &course_vec).max(0.0)
    }

    /// Heuristic fallback used whenever no trained model is loaded.
    pub fn heuristic_score(&self, context: &RequestContext, course: &Course) -> f32 {
        let skill_alignment = self.skill_alignment(&context.user, course);
        let user_experience = (context.interactions.len() as f32 / 100.0).min(1.0);
        let popularity = (course.enrollment_count as f32 / 1000.0).min(1.0);

        utils::clamp01(
            0.5 + skill_alignment * 0.3 + (user_experience - 0.5) * 0.2 + popularity * 0.1,
        )
    }

    fn derive_reason(&self, context: &RequestContext, skill_alignment: f32) -> RecommendationReason {
        if skill_alignment > 0.7 {
            RecommendationReason::SkillGap
        } else if context.interactions.len() > 10 {
            RecommendationReason::LearningHistory
        } else {
            RecommendationReason::InterestBased
        }
    }

    async fn try_generate(
        &self,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<Vec<RecommendationDraft>> {
        let filter = CourseFilter {
            active_only: true,
            exclude_ids: context.recent_course_ids(),
            limit: Some(options.limit * self.config.content.candidate_multiplier),
            ..Default::default()
        };
        let candidates = self.courses.find(&filter).await?;

        let model = self.model.read().clone();
        let mut drafts = Vec::new();

        for course in &candidates {
            let skill_alignment = self.skill_alignment(&context.user, course);
            let score = match &model {
                Some(scorer) => {
                    let features = self.combined_features(context, course);
                    scorer.score(&features)
                }
                None => self.heuristic_score(context, course),
            };

            if score < options.min_confidence {
                continue;
            }

            let reason = self.derive_reason(context, skill_alignment);
            drafts.push(
                RecommendationDraft::new(course.id, GeneratorKind::Personalization, reason, score)
                    .with_explanation(match reason {
                        RecommendationReason::SkillGap => {
                            format!("Closes a gap toward skills you want: {}", course.skills.join(", "))
                        }
                        RecommendationReason::LearningHistory => {
                            "Scored highly against your learning history".to_string()
                        }
                        _ => "Personalized pick based on your interests".to_string(),
                    })
                    .with_metadata(serde_json::json!({
                        "algorithm": GeneratorKind::Personalization.label(),
                        "model": model.as_ref().map(|m| m.version()).unwrap_or("heuristic"),
                        "skill_alignment": skill_alignment,
                    })),
            );
        }

        drafts.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        drafts.truncate(options.limit);
        Ok(drafts)
    }

    /// Records explicit or implicit feedback and bumps the retrain trigger
    /// every nth event. Actual training happens in an external trainer.
    pub fn update_model_with_feedback(&self, user_id: Uuid, recommendation_id: Uuid, score: f32) {
        self.feedback_log.lock().push(FeedbackRecord {
            user_id,
            recommendation_id,
            score: score.clamp(0.0, 5.0),
            recorded_at: Utc::now(),
        });

        let count = self.feedback_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.config.personalization.retrain_every == 0 {
            *self.last_retrain_trigger.lock() = Some(Utc::now());
            info!(
                "Retrain triggered after {} feedback events (user {})",
                count, user_id
            );
        }
    }

    pub fn feedback_count(&self) -> u64 {
        self.feedback_count.load(Ordering::SeqCst)
    }

    pub fn last_retrain_trigger(&self) -> Option<DateTime<Utc>> {
        *self.last_retrain_trigger.lock()
    }
}

#[async_trait]
impl RecommendationGenerator for PersonalizationScorer {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Personalization
    }

    async fn generate(&self, context: &RequestContext, options: &GenerateOptions) -> Vec<RecommendationDraft> {
        match self.try_generate(context, options).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!("Personalization generator degraded to empty result: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryCourseDirectory;

    fn scorer() -> PersonalizationScorer {
        PersonalizationScorer::new(
            Arc::new(InMemoryCourseDirectory::new()),
            Arc::new(Config::default()),
        )
    }

    fn empty_context(user: User) -> RequestContext {
        RequestContext::new(user, Vec::new(), HashMap::new())
    }

    #[test]
    fn test_combined_features_have_fixed_dimension() {
        let s = scorer();
        let course = Course::new("Rust", "systems").with_tags(vec!["rust".to_string()]);
        let context = empty_context(User::new("u"));
        let features = s.combined_features(&context, &course);
        assert_eq!(features.len(), 50);
    }

    #[test]
    fn test_heuristic_score_clamped_and_skill_sensitive() {
        let s = scorer();
        let aligned_user = User::new("a").with_skills(
            vec!["rust".to_string()],
            vec!["async".to_string()],
        );
        let course = Course::new("Rust", "systems")
            .with_skills(vec!["rust".to_string(), "async".to_string()])
            .with_enrollments(500);

        let aligned = s.heuristic_score(&empty_context(aligned_user), &course);
        let stranger = s.heuristic_score(&empty_context(User::new("b")), &course);

        assert!((0.0..=1.0).contains(&aligned));
        assert!(aligned > stranger);
    }

    #[test]
    fn test_linear_sigmoid_model_scores_in_unit_interval() {
        let model = LinearSigmoidModel::random_init(50);
        let features = DVector::from_element(50, 0.5);
        let score = model.score(&features);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_feedback_triggers_retrain_every_nth_event() {
        let s = scorer();
        let user = Uuid::new_v4();

        for _ in 0..9 {
            s.update_model_with_feedback(user, Uuid::new_v4(), 4.0);
        }
        assert!(s.last_retrain_trigger().is_none());

        s.update_model_with_feedback(user, Uuid::new_v4(), 4.0);
        assert!(s.last_retrain_trigger().is_some());
        assert_eq!(s.feedback_count(), 10);
    }

    #[test]
    fn test_skill_gap_reason_for_high_alignment() {
        let s = scorer();
        let user = User::new("a").with_skills(vec!["rust".to_string()], vec![]);
        let context = empty_context(user);
        assert_eq!(
            s.derive_reason(&context, 0.9),
            RecommendationReason::SkillGap
        );
        assert_eq!(
            s.derive_reason(&context, 0.1),
            RecommendationReason::InterestBased
        );
    }
}
