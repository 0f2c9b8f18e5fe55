use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recommendations expire passively this many days after creation.
pub const RECOMMENDATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    Click,
    Enroll,
    Start,
    Progress,
    Complete,
    Rate,
    Bookmark,
    Share,
    Download,
}

impl InteractionType {
    /// Fixed interaction weight table used by all profiling code.
    pub fn weight(&self) -> f32 {
        match self {
            InteractionType::View => 0.1,
            InteractionType::Click => 0.2,
            InteractionType::Enroll => 0.8,
            InteractionType::Start => 0.6,
            InteractionType::Progress => 0.7,
            InteractionType::Complete => 1.0,
            InteractionType::Rate => 0.9,
            InteractionType::Bookmark => 0.5,
            InteractionType::Share => 0.4,
            InteractionType::Download => 0.3,
        }
    }

    /// Positive signals feed collaborative scoring; passive ones do not.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            InteractionType::Enroll
                | InteractionType::Complete
                | InteractionType::Rate
                | InteractionType::Bookmark
                | InteractionType::Share
                | InteractionType::Progress
        )
    }

    pub fn all() -> [InteractionType; 10] {
        [
            InteractionType::View,
            InteractionType::Click,
            InteractionType::Enroll,
            InteractionType::Start,
            InteractionType::Progress,
            InteractionType::Complete,
            InteractionType::Rate,
            InteractionType::Bookmark,
            InteractionType::Share,
            InteractionType::Download,
        ]
    }
}

/// Immutable user-course interaction record; source of all profiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInteraction {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub interaction_type: InteractionType,
    /// Optional per-record override multiplied into the fixed weight.
    pub weight_override: Option<f32>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserInteraction {
    pub fn new(user_id: Uuid, course_id: Uuid, interaction_type: InteractionType) -> Self {
        Self {
            user_id,
            course_id,
            interaction_type,
            weight_override: None,
            session_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_override(mut self, weight: f32) -> Self {
        self.weight_override = Some(weight.clamp(0.0, 1.0));
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Table weight times the optional override, clamped to [0, 1].
    pub fn effective_weight(&self) -> f32 {
        let base = self.interaction_type.weight();
        let weighted = match self.weight_override {
            Some(o) => base * o.clamp(0.0, 1.0),
            None => base,
        };
        weighted.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn tier(&self) -> usize {
        match self {
            Difficulty::Beginner => 0,
            Difficulty::Intermediate => 1,
            Difficulty::Advanced => 2,
        }
    }

    pub fn next(&self) -> Option<Difficulty> {
        match self {
            Difficulty::Beginner => Some(Difficulty::Intermediate),
            Difficulty::Intermediate => Some(Difficulty::Advanced),
            Difficulty::Advanced => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Practice,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub prerequisites: Vec<String>,
    pub category: String,
    pub instructor: String,
    pub difficulty: Difficulty,
    pub duration_minutes: u32,
    pub rating: f32,
    pub enrollment_count: u64,
    pub content_type: ContentType,
    pub is_paid: bool,
    pub is_active: bool,
}

impl Course {
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            skills: Vec::new(),
            prerequisites: Vec::new(),
            category: category.into(),
            instructor: String::new(),
            difficulty: Difficulty::Beginner,
            duration_minutes: 120,
            rating: 0.0,
            enrollment_count: 0,
            content_type: ContentType::Video,
            is_paid: false,
            is_active: true,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = rating.clamp(0.0, 5.0);
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_enrollments(mut self, count: u64) -> Self {
        self.enrollment_count = count;
        self
    }

    pub fn with_prerequisites(mut self, prerequisites: Vec<String>) -> Self {
        self.prerequisites = prerequisites;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub current_skills: Vec<String>,
    pub desired_skills: Vec<String>,
    pub favorite_topics: Vec<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            current_skills: Vec::new(),
            desired_skills: Vec::new(),
            favorite_topics: Vec::new(),
        }
    }

    pub fn with_skills(mut self, current: Vec<String>, desired: Vec<String>) -> Self {
        self.current_skills = current;
        self.desired_skills = desired;
        self
    }

    pub fn with_favorite_topics(mut self, topics: Vec<String>) -> Self {
        self.favorite_topics = topics;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    ContentBased,
    Collaborative,
    Course,
    SkillBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    SkillGap,
    SimilarUsers,
    SimilarContent,
    Trending,
    InterestBased,
    LearningHistory,
    Continuation,
}

impl RecommendationReason {
    pub fn label(&self) -> &'static str {
        match self {
            RecommendationReason::SkillGap => "skill_gap",
            RecommendationReason::SimilarUsers => "similar_users",
            RecommendationReason::SimilarContent => "similar_content",
            RecommendationReason::Trending => "trending",
            RecommendationReason::InterestBased => "interest_based",
            RecommendationReason::LearningHistory => "learning_history",
            RecommendationReason::Continuation => "continuation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationStatus {
    Active,
    Dismissed,
}

/// Closed set of generator kinds. Ensemble weighting and reason derivation
/// match on this exhaustively instead of branching on metadata strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Collaborative,
    ContentBased,
    Personalization,
    Trending,
    SkillGap,
}

impl GeneratorKind {
    pub fn ensemble_weight(&self) -> f32 {
        match self {
            GeneratorKind::Collaborative => 0.3,
            GeneratorKind::ContentBased => 0.25,
            GeneratorKind::Personalization => 0.3,
            GeneratorKind::Trending => 0.1,
            GeneratorKind::SkillGap => 0.05,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GeneratorKind::Collaborative => "collaborative",
            GeneratorKind::ContentBased => "content_based",
            GeneratorKind::Personalization => "personalization",
            GeneratorKind::Trending => "trending",
            GeneratorKind::SkillGap => "skill_gap",
        }
    }

    pub fn recommendation_type(&self) -> RecommendationType {
        match self {
            GeneratorKind::Collaborative => RecommendationType::Collaborative,
            GeneratorKind::ContentBased => RecommendationType::ContentBased,
            GeneratorKind::Personalization => RecommendationType::Course,
            GeneratorKind::Trending => RecommendationType::Course,
            GeneratorKind::SkillGap => RecommendationType::SkillBased,
        }
    }
}

/// Priority banding shared by the collaborative and content generators.
pub fn priority_for_score(score: f32) -> u8 {
    if score >= 0.8 {
        5
    } else if score >= 0.6 {
        4
    } else if score >= 0.4 {
        3
    } else if score >= 0.2 {
        2
    } else {
        1
    }
}

/// Generator output prior to ensemble ranking and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationDraft {
    pub course_id: Uuid,
    pub kind: GeneratorKind,
    pub recommendation_type: RecommendationType,
    pub reason: RecommendationReason,
    pub confidence_score: f32,
    pub relevance_score: f32,
    pub priority: u8,
    pub explanation: String,
    pub metadata: serde_json::Value,
}

impl RecommendationDraft {
    pub fn new(course_id: Uuid, kind: GeneratorKind, reason: RecommendationReason, score: f32) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            course_id,
            kind,
            recommendation_type: kind.recommendation_type(),
            reason,
            confidence_score: score,
            relevance_score: score * 0.9,
            priority: priority_for_score(score),
            explanation: String::new(),
            metadata: serde_json::json!({ "algorithm": kind.label() }),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub recommendation_type: RecommendationType,
    pub reason: RecommendationReason,
    pub confidence_score: f32,
    pub relevance_score: f32,
    pub priority: u8,
    pub explanation: String,
    pub status: RecommendationStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

impl Recommendation {
    pub fn from_draft(user_id: Uuid, draft: RecommendationDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            course_id: draft.course_id,
            recommendation_type: draft.recommendation_type,
            reason: draft.reason,
            confidence_score: draft.confidence_score,
            relevance_score: draft.relevance_score,
            priority: draft.priority,
            explanation: draft.explanation,
            status: RecommendationStatus::Active,
            metadata: draft.metadata,
            created_at: now,
            expires_at: now + Duration::days(RECOMMENDATION_TTL_DAYS),
            viewed_at: None,
            clicked_at: None,
            dismissed_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn mark_viewed(&mut self, now: DateTime<Utc>) {
        if self.viewed_at.is_none() {
            self.viewed_at = Some(now);
        }
    }

    pub fn mark_clicked(&mut self, now: DateTime<Utc>) {
        if self.clicked_at.is_none() {
            self.clicked_at = Some(now);
        }
    }

    pub fn dismiss(&mut self, now: DateTime<Utc>) {
        self.status = RecommendationStatus::Dismissed;
        self.dismissed_at = Some(now);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalPreferences {
    pub max_courses_per_week: u32,
    pub preferred_duration_minutes: u32,
    pub include_topics: Vec<String>,
    pub exclude_topics: Vec<String>,
}

impl Default for GoalPreferences {
    fn default() -> Self {
        Self {
            max_courses_per_week: 2,
            preferred_duration_minutes: 120,
            include_topics: Vec::new(),
            exclude_topics: Vec::new(),
        }
    }
}

/// Transient learning goal; never persisted as its own entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningGoal {
    pub target_skills: Vec<String>,
    pub current_level: Difficulty,
    pub target_level: Difficulty,
    pub timeframe_weeks: u32,
    pub preferences: GoalPreferences,
}

impl LearningGoal {
    pub fn new(target_skills: Vec<String>, current_level: Difficulty, target_level: Difficulty) -> Self {
        Self {
            target_skills,
            current_level,
            target_level,
            timeframe_weeks: 12,
            preferences: GoalPreferences::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PathGenerationOptions {
    pub max_courses: usize,
    pub include_assessments: bool,
    pub include_projects: bool,
}

impl Default for PathGenerationOptions {
    fn default() -> Self {
        Self {
            max_courses: 6,
            include_assessments: true,
            include_projects: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    Course,
    Assessment,
    Project,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub target_skills: Vec<String>,
    pub current_level: Difficulty,
    pub target_level: Difficulty,
    pub status: PathStatus,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub progress_percentage: u8,
    pub estimated_duration_minutes: u32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LearningPath {
    /// Recomputes the derived progress fields and status from a completed
    /// step count. Status is a pure function of progress; paths are never
    /// reopened once completed.
    pub fn apply_progress(&mut self, completed_steps: u32, now: DateTime<Utc>) {
        if self.status == PathStatus::Completed {
            return;
        }

        self.completed_steps = completed_steps;
        self.progress_percentage = if self.total_steps == 0 {
            0
        } else {
            ((100.0 * completed_steps as f64 / self.total_steps as f64).round()) as u8
        };

        if self.progress_percentage == 100 {
            self.status = PathStatus::Completed;
            self.completed_at = Some(now);
        } else if self.progress_percentage > 0 {
            self.status = PathStatus::InProgress;
            if self.started_at.is_none() {
                self.started_at = Some(now);
            }
        } else {
            self.status = PathStatus::NotStarted;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPathStep {
    pub id: Uuid,
    pub learning_path_id: Uuid,
    /// None for assessment and project steps.
    pub course_id: Option<Uuid>,
    pub step_type: StepType,
    pub title: String,
    /// 1-based, dense under normal generation.
    pub step_order: u32,
    pub estimated_duration_minutes: u32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// 24h-boxed memoization of user-user similarity; rebuildable at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSimilarity {
    pub user_id: Uuid,
    pub similarity: f32,
    pub common_interactions: u32,
    pub computed_at: DateTime<Utc>,
}

/// 24h-boxed memoization of item-item similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSimilarity {
    pub course_id: Uuid,
    pub similarity: f32,
    pub common_users: u32,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub user_id: Uuid,
    pub algorithm_version: String,
    pub recommendation_count: usize,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationFeedback {
    /// Explicit score in [0, 5].
    pub score: f32,
    pub feedback_type: String,
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_weight_override_clamped() {
        let user = Uuid::new_v4();
        let course = Uuid::new_v4();

        let i = UserInteraction::new(user, course, InteractionType::Complete);
        assert!((i.effective_weight() - 1.0).abs() < 1e-6);

        let i = UserInteraction::new(user, course, InteractionType::Enroll).with_override(0.5);
        assert!((i.effective_weight() - 0.4).abs() < 1e-6);

        let i = UserInteraction::new(user, course, InteractionType::Enroll).with_override(7.0);
        assert!((i.effective_weight() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_priority_banding() {
        assert_eq!(priority_for_score(0.85), 5);
        assert_eq!(priority_for_score(0.6), 4);
        assert_eq!(priority_for_score(0.45), 3);
        assert_eq!(priority_for_score(0.2), 2);
        assert_eq!(priority_for_score(0.05), 1);
    }

    #[test]
    fn test_recommendation_expiry_and_lifecycle() {
        let now = Utc::now();
        let draft = RecommendationDraft::new(
            Uuid::new_v4(),
            GeneratorKind::ContentBased,
            RecommendationReason::InterestBased,
            0.7,
        );
        let mut rec = Recommendation::from_draft(Uuid::new_v4(), draft, now);

        assert_eq!(rec.status, RecommendationStatus::Active);
        assert_eq!(rec.expires_at, now + Duration::days(7));
        assert!(!rec.is_expired(now));
        assert!(rec.is_expired(now + Duration::days(8)));

        rec.mark_viewed(now);
        rec.mark_clicked(now);
        assert_eq!(rec.status, RecommendationStatus::Active);

        rec.dismiss(now);
        assert_eq!(rec.status, RecommendationStatus::Dismissed);
        assert!(rec.dismissed_at.is_some());
    }

    #[test]
    fn test_path_progress_invariant() {
        let now = Utc::now();
        let mut path = LearningPath {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Test".to_string(),
            target_skills: vec!["rust".to_string()],
            current_level: Difficulty::Beginner,
            target_level: Difficulty::Advanced,
            status: PathStatus::NotStarted,
            total_steps: 3,
            completed_steps: 0,
            progress_percentage: 0,
            estimated_duration_minutes: 360,
            metadata: serde_json::json!({}),
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        path.apply_progress(1, now);
        assert_eq!(path.progress_percentage, 33);
        assert_eq!(path.status, PathStatus::InProgress);
        assert!(path.started_at.is_some());

        path.apply_progress(3, now);
        assert_eq!(path.progress_percentage, 100);
        assert_eq!(path.status, PathStatus::Completed);
        let completed_at = path.completed_at;
        assert!(completed_at.is_some());

        // Completed paths are never reopened by lower progress counts.
        path.apply_progress(1, now + chrono::Duration::hours(1));
        assert_eq!(path.status, PathStatus::Completed);
        assert_eq!(path.progress_percentage, 100);
        assert_eq!(path.completed_at, completed_at);
    }
}
