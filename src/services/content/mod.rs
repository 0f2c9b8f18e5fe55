use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::models::*;
use crate::services::{GenerateOptions, RecommendationGenerator, RequestContext};
use crate::stores::{CourseDirectory, CourseFilter};
use crate::utils;

// Feature blend weights for profile-vs-course scoring.
const W_TAGS: f32 = 0.25;
const W_SKILLS: f32 = 0.30;
const W_CATEGORY: f32 = 0.15;
const W_DIFFICULTY: f32 = 0.10;
const W_DURATION: f32 = 0.10;
const W_RATING: f32 = 0.10;

/// Weighted-frequency preference profile built from recent interactions.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ContentPreferenceProfile {
    pub tag_weights: HashMap<String, f32>,
    pub skill_weights: HashMap<String, f32>,
    pub category_weights: HashMap<String, f32>,
    pub difficulty_weights: HashMap<String, f32>,
    pub instructor_weights: HashMap<String, f32>,
    pub avg_duration_minutes: f32,
    pub avg_rating: f32,
    pub total_weight: f32,
}

impl ContentPreferenceProfile {
    /// Builds the profile by accumulating each interaction's effective weight
    /// into the frequency maps of the course it touched. Only the `limit`
    /// most recent interactions contribute; the context is ordered newest
    /// first.
    pub fn from_context(context: &RequestContext, limit: usize) -> Self {
        let mut profile = Self::default();
        let mut duration_sum = 0.0f32;
        let mut rating_sum = 0.0f32;

        for interaction in context.interactions.iter().take(limit) {
            let Some(course) = context.courses.get(&interaction.course_id) else {
                continue;
            };
            let weight = interaction.effective_weight();

            for tag in &course.tags {
                *profile.tag_weights.entry(tag.clone()).or_insert(0.0) += weight;
            }
            for skill in &course.skills {
                *profile.skill_weights.entry(skill.clone()).or_insert(0.0) += weight;
            }
            *profile
                .category_weights
                .entry(course.category.clone())
                .or_insert(0.0) += weight;
            *profile
                .difficulty_weights
                .entry(course.difficulty.label().to_string())
                .or_insert(0.0) += weight;
            if !course.instructor.is_empty() {
                *profile
                    .instructor_weights
                    .entry(course.instructor.clone())
                    .or_insert(0.0) += weight;
            }

            duration_sum += course.duration_minutes as f32 * weight;
            rating_sum += course.rating * weight;
            profile.total_weight += weight;
        }

        if profile.total_weight > 0.0 {
            profile.avg_duration_minutes = duration_sum / profile.total_weight;
            profile.avg_rating = rating_sum / profile.total_weight;
        }

        profile
    }

    pub fn is_empty(&self) -> bool {
        self.total_weight == 0.0
    }
}

pub struct ContentSimilarityGenerator {
    courses: Arc<dyn CourseDirectory>,
    config: Arc<Config>,
}

impl ContentSimilarityGenerator {
    pub fn new(courses: Arc<dyn CourseDirectory>, config: Arc<Config>) -> Self {
        Self { courses, config }
    }

    /// Fixed-weight blend of profile-vs-course feature similarities,
    /// normalized by the weight of the features that had preference data.
    pub fn score_against_profile(&self, profile: &ContentPreferenceProfile, course: &Course) -> f32 {
        let mut score = 0.0f32;
        let mut active_weight = 0.0f32;

        // Tags: mean of per-tag preference strength, each capped at pref/10.
        if !profile.tag_weights.is_empty() && !course.tags.is_empty() {
            let sum: f32 = course
                .tags
                .iter()
                .map(|t| (profile.tag_weights.get(t).copied().unwrap_or(0.0) / 10.0).min(1.0))
                .sum();
            score += W_TAGS * (sum / course.tags.len() as f32);
            active_weight += W_TAGS;
        }

        if !profile.skill_weights.is_empty() && !course.skills.is_empty() {
            let sum: f32 = course
                .skills
                .iter()
                .map(|s| (profile.skill_weights.get(s).copied().unwrap_or(0.0) / 10.0).min(1.0))
                .sum();
            score += W_SKILLS * (sum / course.skills.len() as f32);
            active_weight += W_SKILLS;
        }

        if !profile.category_weights.is_empty() {
            let category_score = profile
                .category_weights
                .get(&course.category)
                .map(|w| (w / 10.0).min(1.0))
                .unwrap_or(0.0);
            score += W_CATEGORY * category_score;
            active_weight += W_CATEGORY;
        }

        // Difficulty is neutral when the user has no history at this tier.
        let difficulty_score = profile
            .difficulty_weights
            .get(course.difficulty.label())
            .map(|w| (w / 10.0).min(1.0))
            .unwrap_or(0.5);
        score += W_DIFFICULTY * difficulty_score;
        active_weight += W_DIFFICULTY;

        if profile.avg_duration_minutes > 0.0 {
            score += W_DURATION
                * utils::duration_closeness(course.duration_minutes as f32, profile.avg_duration_minutes);
            active_weight += W_DURATION;
        }

        score += W_RATING * (course.rating / 5.0);
        active_weight += W_RATING;

        if active_weight > 0.0 {
            score / active_weight
        } else {
            0.0
        }
    }

    fn explain(&self, profile: &ContentPreferenceProfile, course: &Course, score: f32) -> String {
        let mut reasons = Vec::new();

        for tag in &course.tags {
            if profile.tag_weights.get(tag).copied().unwrap_or(0.0) > 5.0 {
                reasons.push(format!("matches your strong interest in {}", tag));
                break;
            }
        }
        for skill in &course.skills {
            if profile.skill_weights.get(skill).copied().unwrap_or(0.0) > 3.0 {
                reasons.push(format!("builds {} skills you have been developing", skill));
                break;
            }
        }
        if profile.category_weights.contains_key(&course.category) {
            reasons.push(format!("in your preferred category {}", course.category));
        }
        if profile.difficulty_weights.contains_key(course.difficulty.label()) {
            reasons.push(format!("at your usual {} level", course.difficulty.label()));
        }
        if course.rating >= 4.5 {
            reasons.push("highly rated by other learners".to_string());
        }

        if reasons.is_empty() {
            if score > 0.7 {
                "Strong match for your learning profile".to_string()
            } else if score > 0.5 {
                "Good match for your recent activity".to_string()
            } else {
                "Might broaden your current learning focus".to_string()
            }
        } else {
            format!("Recommended because it {}", reasons.join(", "))
        }
    }

    async fn try_generate(
        &self,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<Vec<RecommendationDraft>> {
        let profile = ContentPreferenceProfile::from_context(
            context,
            self.config.content.profile_interaction_limit,
        );

        let filter = CourseFilter {
            active_only: true,
            exclude_ids: context.recent_course_ids(),
            limit: Some(options.limit * self.config.content.candidate_multiplier),
            ..Default::default()
        };
        let candidates = self.courses.find(&filter).await?;

        let mut drafts: Vec<RecommendationDraft> = candidates
            .iter()
            .map(|course| {
                let score = self.score_against_profile(&profile, course);
                let explanation = self.explain(&profile, course, score);
                RecommendationDraft::new(
                    course.id,
                    GeneratorKind::ContentBased,
                    RecommendationReason::InterestBased,
                    score,
                )
                .with_explanation(explanation)
                .with_metadata(serde_json::json!({
                    "algorithm": GeneratorKind::ContentBased.label(),
                    "profile_weight": profile.total_weight,
                }))
            })
            .filter(|d| d.confidence_score >= options.min_confidence)
            .collect();

        drafts.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        drafts.truncate(options.limit);
        Ok(drafts)
    }

    /// Course-to-course similarity for "more like this" listings.
    pub async fn find_similar_courses(&self, course_id: Uuid, limit: usize) -> Result<Vec<(Course, f32)>> {
        let Some(target) = self.courses.get(course_id).await? else {
            return Ok(Vec::new());
        };

        let filter = CourseFilter {
            active_only: true,
            exclude_ids: vec![course_id],
            ..Default::default()
        };
        let candidates = self.courses.find(&filter).await?;

        let mut scored: Vec<(Course, f32)> = candidates
            .into_iter()
            .map(|candidate| {
                let score = course_similarity(&target, &candidate);
                (candidate, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Jaccard on tags and skills plus exact-match category/difficulty and
/// duration closeness.
pub fn course_similarity(a: &Course, b: &Course) -> f32 {
    let tag_sim = utils::jaccard_str(&a.tags, &b.tags);
    let skill_sim = utils::jaccard_str(&a.skills, &b.skills);
    let category_sim = if a.category == b.category { 1.0 } else { 0.0 };
    let difficulty_sim = if a.difficulty == b.difficulty { 1.0 } else { 0.5 };
    let duration_sim =
        utils::duration_closeness(a.duration_minutes as f32, b.duration_minutes as f32);

    tag_sim * 0.3 + skill_sim * 0.3 + category_sim * 0.2 + difficulty_sim * 0.1 + duration_sim * 0.1
}

#[async_trait]
impl RecommendationGenerator for ContentSimilarityGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::ContentBased
    }

    async fn generate(&self, context: &RequestContext, options: &GenerateOptions) -> Vec<RecommendationDraft> {
        match self.try_generate(context, options).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!("Content generator degraded to empty result: {}", e);
                Vec::new()
            }
        }
    }
}
