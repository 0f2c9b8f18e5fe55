use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::models::*;
use crate::stores::{
    CourseDirectory, CourseFilter, InteractionStore, LearningPathRepository, PathQuery,
    UserDirectory,
};
use crate::utils;

// Candidate scoring blend inside a difficulty tier.
const W_SKILL_OVERLAP: f32 = 0.4;
const W_RATING: f32 = 0.2;
const W_PREREQS: f32 = 0.2;
const W_DURATION: f32 = 0.1;
const W_ENROLLMENT: f32 = 0.1;

/// Profile derived from the learner's history; drives candidate selection.
#[derive(Debug, Clone)]
pub struct LearnerProfile {
    pub skills: HashSet<String>,
    pub completion_rate: f32,
    pub learning_style: ContentType,
    pub preferred_difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathSuggestion {
    pub title: String,
    pub target_skills: Vec<String>,
    pub suggested_level: Difficulty,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathRecommendations {
    pub skill_based: Vec<PathSuggestion>,
    pub trending: Vec<PathSuggestion>,
    pub continuation: Vec<LearningPath>,
}

pub struct LearningPathPlanner {
    interactions: Arc<dyn InteractionStore>,
    courses: Arc<dyn CourseDirectory>,
    users: Arc<dyn UserDirectory>,
    paths: Arc<dyn LearningPathRepository>,
    config: Arc<Config>,
    /// Serializes progress updates and adaptations per path.
    path_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl LearningPathPlanner {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        courses: Arc<dyn CourseDirectory>,
        users: Arc<dyn UserDirectory>,
        paths: Arc<dyn LearningPathRepository>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            interactions,
            courses,
            users,
            paths,
            config,
            path_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, path_id: Uuid) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(path_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn validate_goal(goal: &LearningGoal) -> Result<()> {
        if goal.target_skills.is_empty() {
            return Err(EngineError::Validation(
                "learning goal requires at least one target skill".to_string(),
            ));
        }
        if goal.target_level < goal.current_level {
            return Err(EngineError::Validation(
                "target level must not be below current level".to_string(),
            ));
        }
        if goal.timeframe_weeks == 0 {
            return Err(EngineError::Validation(
                "timeframe must be at least one week".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the learner profile: declared skills plus skills from completed
    /// courses, completion rate, majority learning style and the difficulty
    /// tier with the most completions.
    pub async fn build_learner_profile(&self, user: &User, goal: &LearningGoal) -> Result<LearnerProfile> {
        let interactions = self.interactions.for_user(user.id, 500).await?;

        let mut skills: HashSet<String> = user.current_skills.iter().cloned().collect();
        let mut enrolls = 0u32;
        let mut completes = 0u32;
        let mut style_counts: HashMap<ContentType, u32> = HashMap::new();
        let mut difficulty_completions: HashMap<Difficulty, u32> = HashMap::new();

        for interaction in &interactions {
            let course = self.courses.get(interaction.course_id).await?;
            match interaction.interaction_type {
                InteractionType::Enroll => enrolls += 1,
                InteractionType::Complete => {
                    completes += 1;
                    if let Some(ref course) = course {
                        skills.extend(course.skills.iter().cloned());
                        *difficulty_completions.entry(course.difficulty).or_insert(0) += 1;
                    }
                }
                _ => {}
            }
            if let Some(course) = course {
                *style_counts.entry(course.content_type).or_insert(0) += 1;
            }
        }

        let completion_rate = if enrolls == 0 {
            0.0
        } else {
            (completes as f32 / enrolls as f32).min(1.0)
        };

        let learning_style = style_counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(style, _)| style)
            .unwrap_or(ContentType::Video);

        let preferred_difficulty = difficulty_completions
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(d, _)| d)
            .unwrap_or(goal.current_level);

        Ok(LearnerProfile {
            skills,
            completion_rate,
            learning_style,
            preferred_difficulty,
        })
    }

    fn score_candidate(
        goal: &LearningGoal,
        profile: &LearnerProfile,
        course: &Course,
        max_enrollment: u64,
    ) -> f32 {
        let overlap = if goal.target_skills.is_empty() {
            0.0
        } else {
            let matching = course
                .skills
                .iter()
                .filter(|s| goal.target_skills.contains(s))
                .count();
            matching as f32 / goal.target_skills.len() as f32
        };

        let prereqs_met = course
            .prerequisites
            .iter()
            .all(|p| profile.skills.contains(p));

        let duration_fit = utils::duration_closeness(
            course.duration_minutes as f32,
            goal.preferences.preferred_duration_minutes as f32,
        );

        let enrollment_norm = if max_enrollment == 0 {
            0.0
        } else {
            course.enrollment_count as f32 / max_enrollment as f32
        };

        overlap * W_SKILL_OVERLAP
            + (course.rating / 5.0) * W_RATING
            + if prereqs_met { W_PREREQS } else { 0.0 }
            + duration_fit * W_DURATION
            + enrollment_norm * W_ENROLLMENT
    }

    /// Difficulty ladder from the current level up to the target level.
    fn tier_ladder(goal: &LearningGoal) -> Vec<Difficulty> {
        let mut tiers = vec![goal.current_level];
        let mut tier = goal.current_level;
        while tier < goal.target_level {
            match tier.next() {
                Some(next) => {
                    tiers.push(next);
                    tier = next;
                }
                None => break,
            }
        }
        tiers
    }

    /// Generates and persists a learning path toward the goal.
    pub async fn generate(
        &self,
        user_id: Uuid,
        goal: &LearningGoal,
        options: &PathGenerationOptions,
    ) -> Result<(LearningPath, Vec<LearningPathStep>)> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::user_not_found(user_id))?;
        Self::validate_goal(goal)?;

        let profile = self.build_learner_profile(&user, goal).await?;
        let ladder = Self::tier_ladder(goal);

        let max_duration = (goal.preferences.preferred_duration_minutes as f32
            * self.config.learning_path.duration_slack) as u32;
        let filter = CourseFilter {
            active_only: true,
            skills_any: goal.target_skills.clone(),
            difficulties: ladder.clone(),
            max_duration_minutes: Some(max_duration),
            include_topics: goal.preferences.include_topics.clone(),
            exclude_topics: goal.preferences.exclude_topics.clone(),
            ..Default::default()
        };
        let candidates = self.courses.find(&filter).await?;
        let max_enrollment = candidates.iter().map(|c| c.enrollment_count).max().unwrap_or(0);

        // Walk the ladder one tier at a time, taking the best candidates per
        // tier until the course budget is exhausted.
        let mut selected: Vec<Course> = Vec::new();
        for tier in &ladder {
            if selected.len() >= options.max_courses {
                break;
            }
            let mut tier_courses: Vec<&Course> = candidates
                .iter()
                .filter(|c| c.difficulty == *tier)
                .filter(|c| !selected.iter().any(|s| s.id == c.id))
                .collect();
            tier_courses.sort_by(|a, b| {
                let sa = Self::score_candidate(goal, &profile, a, max_enrollment);
                let sb = Self::score_candidate(goal, &profile, b, max_enrollment);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
            for course in tier_courses
                .into_iter()
                .take(self.config.learning_path.courses_per_tier)
            {
                if selected.len() >= options.max_courses {
                    break;
                }
                selected.push(course.clone());
            }
        }

        if selected.is_empty() {
            return Err(EngineError::Validation(
                "no courses match the learning goal".to_string(),
            ));
        }

        let path_id = Uuid::new_v4();
        let now = Utc::now();
        let mut steps = Vec::new();
        let mut order = 1u32;
        let mut total_minutes = 0u32;

        for course in &selected {
            total_minutes += course.duration_minutes;
            steps.push(LearningPathStep {
                id: Uuid::new_v4(),
                learning_path_id: path_id,
                course_id: Some(course.id),
                step_type: StepType::Course,
                title: course.title.clone(),
                step_order: order,
                estimated_duration_minutes: course.duration_minutes,
                completed: false,
                completed_at: None,
                metadata: serde_json::json!({ "difficulty": course.difficulty.label() }),
            });
            order += 1;

            if options.include_assessments {
                let minutes = self.config.learning_path.assessment_minutes;
                total_minutes += minutes;
                steps.push(LearningPathStep {
                    id: Uuid::new_v4(),
                    learning_path_id: path_id,
                    course_id: None,
                    step_type: StepType::Assessment,
                    title: format!("Assessment: {}", course.title),
                    step_order: order,
                    estimated_duration_minutes: minutes,
                    completed: false,
                    completed_at: None,
                    metadata: serde_json::json!({ "for_course": course.id }),
                });
                order += 1;
            }

            if options.include_projects && course.difficulty == Difficulty::Advanced {
                let minutes = self.config.learning_path.project_minutes;
                total_minutes += minutes;
                steps.push(LearningPathStep {
                    id: Uuid::new_v4(),
                    learning_path_id: path_id,
                    course_id: None,
                    step_type: StepType::Project,
                    title: format!("Project: {}", course.title),
                    step_order: order,
                    estimated_duration_minutes: minutes,
                    completed: false,
                    completed_at: None,
                    metadata: serde_json::json!({ "for_course": course.id }),
                });
                order += 1;
            }
        }

        let path = LearningPath {
            id: path_id,
            user_id,
            title: format!("Path to {}", goal.target_skills.join(", ")),
            target_skills: goal.target_skills.clone(),
            current_level: goal.current_level,
            target_level: goal.target_level,
            status: PathStatus::NotStarted,
            total_steps: steps.len() as u32,
            completed_steps: 0,
            progress_percentage: 0,
            estimated_duration_minutes: total_minutes,
            metadata: serde_json::json!({
                "generation": {
                    "timeframe_weeks": goal.timeframe_weeks,
                    "max_courses": options.max_courses,
                    "include_assessments": options.include_assessments,
                    "include_projects": options.include_projects,
                    "learning_style": format!("{:?}", profile.learning_style),
                    "completion_rate": profile.completion_rate,
                },
                "adaptations": [],
            }),
            created_at: now,
            started_at: None,
            completed_at: None,
        };

        self.paths.insert(path.clone(), steps.clone()).await?;
        info!(
            "Generated learning path {} for user {} with {} steps",
            path.id,
            user_id,
            steps.len()
        );
        Ok((path, steps))
    }

    /// Toggles a step and recomputes the path's derived progress fields.
    /// Unknown paths and steps fail with NotFound before any mutation, and
    /// completed paths reject further updates instead of reopening.
    pub async fn update_progress(
        &self,
        path_id: Uuid,
        step_id: Uuid,
        completed: bool,
    ) -> Result<LearningPath> {
        let lock = self.lock_for(path_id);
        let _guard = lock.lock().await;

        let mut path = self
            .paths
            .get(path_id)
            .await?
            .ok_or_else(|| EngineError::path_not_found(path_id))?;
        if path.status == PathStatus::Completed {
            return Err(EngineError::Validation(format!(
                "Learning path {} is already completed",
                path_id
            )));
        }
        let mut steps = self.paths.steps(path_id).await?;

        let step = steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| EngineError::step_not_found(step_id))?;

        let now = Utc::now();
        step.completed = completed;
        step.completed_at = if completed { Some(now) } else { None };
        self.paths.save_step(step.clone()).await?;

        let completed_count = steps.iter().filter(|s| s.completed).count() as u32;
        path.apply_progress(completed_count, now);
        self.paths.save_path(path.clone()).await?;

        info!(
            "Path {} progress: {}/{} steps ({}%)",
            path.id, path.completed_steps, path.total_steps, path.progress_percentage
        );
        Ok(path)
    }

    /// Inspects completion over the steps attempted so far and records an
    /// advisory `add_support` adaptation when the rate drops below the
    /// threshold. The step list itself is not mutated.
    pub async fn adapt_learning_path(&self, path_id: Uuid) -> Result<LearningPath> {
        let lock = self.lock_for(path_id);
        let _guard = lock.lock().await;

        let mut path = self
            .paths
            .get(path_id)
            .await?
            .ok_or_else(|| EngineError::path_not_found(path_id))?;
        let steps = self.paths.steps(path_id).await?;

        let frontier = steps
            .iter()
            .filter(|s| s.completed)
            .map(|s| s.step_order)
            .max()
            .unwrap_or(0);
        let attempted: Vec<&LearningPathStep> =
            steps.iter().filter(|s| s.step_order <= frontier).collect();

        if attempted.is_empty() {
            return Ok(path);
        }

        let completion_rate =
            attempted.iter().filter(|s| s.completed).count() as f32 / attempted.len() as f32;

        if completion_rate < self.config.learning_path.support_threshold {
            let record = serde_json::json!({
                "kind": "add_support",
                "completion_rate": completion_rate,
                "recorded_at": Utc::now(),
            });
            if let Some(adaptations) = path
                .metadata
                .get_mut("adaptations")
                .and_then(|a| a.as_array_mut())
            {
                adaptations.push(record);
            } else {
                path.metadata["adaptations"] = serde_json::json!([record]);
            }
            self.paths.save_path(path.clone()).await?;
            info!(
                "Recorded add_support adaptation for path {} (completion rate {:.2})",
                path_id, completion_rate
            );
        }

        Ok(path)
    }

    pub async fn list(&self, user_id: Uuid, query: &PathQuery) -> Result<Vec<LearningPath>> {
        self.paths.for_user(user_id, query).await
    }

    pub async fn get(&self, path_id: Uuid) -> Result<(LearningPath, Vec<LearningPathStep>)> {
        let path = self
            .paths
            .get(path_id)
            .await?
            .ok_or_else(|| EngineError::path_not_found(path_id))?;
        let steps = self.paths.steps(path_id).await?;
        Ok((path, steps))
    }

    /// Path suggestions: skill-gap goals, trending skills and in-progress
    /// paths worth continuing.
    pub async fn path_recommendations(&self, user_id: Uuid, limit: usize) -> Result<PathRecommendations> {
        let user = self
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::user_not_found(user_id))?;

        let skill_based: Vec<PathSuggestion> = user
            .desired_skills
            .iter()
            .filter(|s| !user.current_skills.contains(s))
            .take(limit)
            .map(|skill| PathSuggestion {
                title: format!("Master {}", skill),
                target_skills: vec![skill.clone()],
                suggested_level: Difficulty::Beginner,
            })
            .collect();

        let trending = match self.trending_suggestions(limit).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                warn!("Trending path suggestions degraded to empty: {}", e);
                Vec::new()
            }
        };

        let continuation = self
            .paths
            .for_user(
                user_id,
                &PathQuery {
                    status: Some(PathStatus::InProgress),
                    limit: Some(limit),
                    ..Default::default()
                },
            )
            .await?;

        Ok(PathRecommendations {
            skill_based,
            trending,
            continuation,
        })
    }

    async fn trending_suggestions(&self, limit: usize) -> Result<Vec<PathSuggestion>> {
        let since = Utc::now() - Duration::days(7);
        let counts = self.interactions.interaction_counts_since(since).await?;

        let mut skill_counts: HashMap<String, u64> = HashMap::new();
        for (course_id, count) in counts {
            if let Some(course) = self.courses.get(course_id).await? {
                for skill in course.skills {
                    *skill_counts.entry(skill).or_insert(0) += count;
                }
            }
        }

        let mut ranked: Vec<(String, u64)> = skill_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(skill, _)| PathSuggestion {
                title: format!("Trending now: {}", skill),
                target_skills: vec![skill],
                suggested_level: Difficulty::Beginner,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{
        InMemoryCourseDirectory, InMemoryInteractionStore, InMemoryLearningPathRepository,
        InMemoryUserDirectory,
    };

    struct Fixture {
        planner: LearningPathPlanner,
        users: Arc<InMemoryUserDirectory>,
        courses: Arc<InMemoryCourseDirectory>,
    }

    fn fixture() -> Fixture {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let courses = Arc::new(InMemoryCourseDirectory::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let paths = Arc::new(InMemoryLearningPathRepository::new());
        let planner = LearningPathPlanner::new(
            interactions,
            courses.clone(),
            users.clone(),
            paths,
            Arc::new(Config::default()),
        );
        Fixture {
            planner,
            users,
            courses,
        }
    }

    fn rust_course(title: &str, difficulty: Difficulty, minutes: u32) -> Course {
        Course::new(title, "systems")
            .with_skills(vec!["rust".to_string()])
            .with_difficulty(difficulty)
            .with_duration(minutes)
            .with_rating(4.5)
    }

    fn rust_goal() -> LearningGoal {
        LearningGoal::new(
            vec!["rust".to_string()],
            Difficulty::Beginner,
            Difficulty::Advanced,
        )
    }

    #[tokio::test]
    async fn test_generate_emits_dense_ordered_steps() {
        let f = fixture();
        let user = User::new("learner");
        f.users.insert(user.clone());

        f.courses.insert(rust_course("Rust Basics", Difficulty::Beginner, 120));
        f.courses.insert(rust_course("Rust Ownership", Difficulty::Intermediate, 120));
        f.courses.insert(rust_course("Async Rust", Difficulty::Advanced, 120));

        let (path, steps) = f
            .planner
            .generate(user.id, &rust_goal(), &PathGenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(path.status, PathStatus::NotStarted);
        assert_eq!(path.total_steps, steps.len() as u32);

        // Dense 1-based ordering.
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.step_order, i as u32 + 1);
        }

        // Each course is followed by an assessment; the advanced course also
        // gets a project.
        let assessments = steps.iter().filter(|s| s.step_type == StepType::Assessment).count();
        let projects = steps.iter().filter(|s| s.step_type == StepType::Project).count();
        let course_steps = steps.iter().filter(|s| s.step_type == StepType::Course).count();
        assert_eq!(assessments, course_steps);
        assert_eq!(projects, 1);

        let expected_minutes: u32 = steps.iter().map(|s| s.estimated_duration_minutes).sum();
        assert_eq!(path.estimated_duration_minutes, expected_minutes);
    }

    #[tokio::test]
    async fn test_update_progress_completes_path() {
        let f = fixture();
        let user = User::new("learner");
        f.users.insert(user.clone());
        f.courses.insert(rust_course("Rust Basics", Difficulty::Beginner, 120));
        f.courses.insert(rust_course("Rust Testing", Difficulty::Beginner, 90));

        let options = PathGenerationOptions {
            max_courses: 2,
            include_assessments: false,
            include_projects: false,
        };
        let goal = LearningGoal::new(
            vec!["rust".to_string()],
            Difficulty::Beginner,
            Difficulty::Beginner,
        );
        let (path, steps) = f.planner.generate(user.id, &goal, &options).await.unwrap();
        assert_eq!(steps.len(), 2);

        let updated = f
            .planner
            .update_progress(path.id, steps[0].id, true)
            .await
            .unwrap();
        assert_eq!(updated.status, PathStatus::InProgress);
        assert_eq!(updated.progress_percentage, 50);

        let finished = f
            .planner
            .update_progress(path.id, steps[1].id, true)
            .await
            .unwrap();
        assert_eq!(finished.completed_steps, 2);
        assert_eq!(finished.progress_percentage, 100);
        assert_eq!(finished.status, PathStatus::Completed);
        assert!(finished.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_completed_path_rejects_further_updates() {
        let f = fixture();
        let user = User::new("learner");
        f.users.insert(user.clone());
        f.courses.insert(rust_course("Rust Basics", Difficulty::Beginner, 120));
        f.courses.insert(rust_course("Rust Testing", Difficulty::Beginner, 90));

        let options = PathGenerationOptions {
            max_courses: 2,
            include_assessments: false,
            include_projects: false,
        };
        let goal = LearningGoal::new(
            vec!["rust".to_string()],
            Difficulty::Beginner,
            Difficulty::Beginner,
        );
        let (path, steps) = f.planner.generate(user.id, &goal, &options).await.unwrap();
        for step in &steps {
            f.planner.update_progress(path.id, step.id, true).await.unwrap();
        }

        // Un-completing a step on a finished path is rejected outright.
        let err = f
            .planner
            .update_progress(path.id, steps[0].id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let (unchanged, unchanged_steps) = f.planner.get(path.id).await.unwrap();
        assert_eq!(unchanged.status, PathStatus::Completed);
        assert_eq!(unchanged.progress_percentage, 100);
        assert!(unchanged.completed_at.is_some());
        assert!(unchanged_steps.iter().all(|s| s.completed));
    }

    #[tokio::test]
    async fn test_update_progress_unknown_step_is_not_found() {
        let f = fixture();
        let user = User::new("learner");
        f.users.insert(user.clone());
        f.courses.insert(rust_course("Rust Basics", Difficulty::Beginner, 120));

        let goal = LearningGoal::new(
            vec!["rust".to_string()],
            Difficulty::Beginner,
            Difficulty::Beginner,
        );
        let (path, _) = f
            .planner
            .generate(user.id, &goal, &PathGenerationOptions::default())
            .await
            .unwrap();

        let bogus_step = Uuid::new_v4();
        let err = f
            .planner
            .update_progress(path.id, bogus_step, true)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(err.to_string().contains("not found in learning path"));

        // The path itself is untouched.
        let (unchanged, _) = f.planner.get(path.id).await.unwrap();
        assert_eq!(unchanged.completed_steps, 0);
        assert_eq!(unchanged.status, PathStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_adaptation_recorded_when_struggling() {
        let f = fixture();
        let user = User::new("learner");
        f.users.insert(user.clone());
        for i in 0..3 {
            f.courses
                .insert(rust_course(&format!("Rust {}", i), Difficulty::Beginner, 120));
        }

        let options = PathGenerationOptions {
            max_courses: 3,
            include_assessments: false,
            include_projects: false,
        };
        let goal = LearningGoal::new(
            vec!["rust".to_string()],
            Difficulty::Beginner,
            Difficulty::Beginner,
        );
        let (path, steps) = f.planner.generate(user.id, &goal, &options).await.unwrap();

        // Complete only the last step: one of three attempted steps done.
        f.planner
            .update_progress(path.id, steps[2].id, true)
            .await
            .unwrap();

        let adapted = f.planner.adapt_learning_path(path.id).await.unwrap();
        let adaptations = adapted.metadata["adaptations"].as_array().unwrap();
        assert_eq!(adaptations.len(), 1);
        assert_eq!(adaptations[0]["kind"], "add_support");
    }

    #[tokio::test]
    async fn test_goal_validation() {
        let f = fixture();
        let user = User::new("learner");
        f.users.insert(user.clone());

        let empty_goal = LearningGoal::new(vec![], Difficulty::Beginner, Difficulty::Advanced);
        let err = f
            .planner
            .generate(user.id, &empty_goal, &PathGenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let inverted = LearningGoal::new(
            vec!["rust".to_string()],
            Difficulty::Advanced,
            Difficulty::Beginner,
        );
        let err = f
            .planner
            .generate(user.id, &inverted, &PathGenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let f = fixture();
        let err = f
            .planner
            .generate(Uuid::new_v4(), &rust_goal(), &PathGenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
