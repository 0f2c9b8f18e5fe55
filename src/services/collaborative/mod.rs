use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::models::*;
use crate::services::{GenerateOptions, RecommendationGenerator, RequestContext};
use crate::stores::InteractionStore;
use crate::utils;

/// Share of the requested limit taken from each strategy before merging.
const USER_BASED_SHARE: f32 = 0.6;
const ITEM_BASED_SHARE: f32 = 0.4;

/// Interactions pulled per candidate user when building similarity vectors.
const CANDIDATE_INTERACTION_CAP: usize = 500;

pub struct CollaborativeFilteringGenerator {
    interactions: Arc<dyn InteractionStore>,
    config: Arc<Config>,
    user_similarity_cache: DashMap<Uuid, (Vec<UserSimilarity>, DateTime<Utc>)>,
    item_similarity_cache: DashMap<Uuid, (Vec<ItemSimilarity>, DateTime<Utc>)>,
}

impl CollaborativeFilteringGenerator {
    pub fn new(interactions: Arc<dyn InteractionStore>, config: Arc<Config>) -> Self {
        Self {
            interactions,
            config,
            user_similarity_cache: DashMap::new(),
            item_similarity_cache: DashMap::new(),
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::hours(self.config.collaborative.similarity_ttl_hours)
    }

    /// Similar users via cosine over weighted interaction vectors, cached
    /// per target user. Entries older than the TTL are rebuilt lazily.
    pub async fn similar_users(&self, context: &RequestContext) -> Result<Vec<UserSimilarity>> {
        let user_id = context.user.id;

        if let Some(entry) = self.user_similarity_cache.get(&user_id) {
            let (cached, computed_at) = entry.value();
            if Utc::now() - *computed_at < self.cache_ttl() {
                return Ok(cached.clone());
            }
        }

        let target_vector = context.weighted_vector();
        let shared_courses: Vec<Uuid> = target_vector.keys().copied().collect();
        let candidates = self
            .interactions
            .users_sharing_courses(&shared_courses, user_id)
            .await?;

        let mut similarities = Vec::new();
        for candidate_id in candidates {
            let candidate_interactions = self
                .interactions
                .for_user(candidate_id, CANDIDATE_INTERACTION_CAP)
                .await?;

            let mut candidate_vector: HashMap<Uuid, f32> = HashMap::new();
            for interaction in &candidate_interactions {
                *candidate_vector.entry(interaction.course_id).or_insert(0.0) +=
                    interaction.effective_weight();
            }

            let similarity = utils::sparse_cosine_similarity(&target_vector, &candidate_vector);
            if similarity > self.config.collaborative.min_similarity {
                let common = candidate_vector
                    .keys()
                    .filter(|c| target_vector.contains_key(c))
                    .count() as u32;
                similarities.push(UserSimilarity {
                    user_id: candidate_id,
                    similarity,
                    common_interactions: common,
                    computed_at: Utc::now(),
                });
            }
        }

        similarities.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.user_similarity_cache
            .insert(user_id, (similarities.clone(), Utc::now()));
        Ok(similarities)
    }

    /// User-based scores: positive interactions of the top similar users on
    /// courses the target has not touched, accumulated as sim x weight and
    /// averaged per candidate course.
    async fn user_based_scores(&self, context: &RequestContext) -> Result<HashMap<Uuid, f32>> {
        let similar = self.similar_users(context).await?;
        let top = similar
            .iter()
            .take(self.config.collaborative.top_similar_users);

        let mut score_sum: HashMap<Uuid, f32> = HashMap::new();
        let mut score_count: HashMap<Uuid, u32> = HashMap::new();

        for neighbor in top {
            let neighbor_interactions = self
                .interactions
                .for_user(neighbor.user_id, CANDIDATE_INTERACTION_CAP)
                .await?;

            for interaction in neighbor_interactions {
                if !interaction.interaction_type.is_positive() {
                    continue;
                }
                if context.has_interacted(interaction.course_id) {
                    continue;
                }
                *score_sum.entry(interaction.course_id).or_insert(0.0) +=
                    neighbor.similarity * interaction.effective_weight();
                *score_count.entry(interaction.course_id).or_insert(0) += 1;
            }
        }

        Ok(score_sum
            .into_iter()
            .map(|(course_id, sum)| {
                let count = score_count.get(&course_id).copied().unwrap_or(1).max(1);
                (course_id, sum / count as f32)
            })
            .collect())
    }

    /// Items similar to a course via Jaccard on their user sets, cached.
    pub async fn similar_items(&self, course_id: Uuid) -> Result<Vec<ItemSimilarity>> {
        if let Some(entry) = self.item_similarity_cache.get(&course_id) {
            let (cached, computed_at) = entry.value();
            if Utc::now() - *computed_at < self.cache_ttl() {
                return Ok(cached.clone());
            }
        }

        let seed_users = self.interactions.users_for_course(course_id).await?;

        // Union of the other courses those users touched.
        let mut candidate_courses: HashSet<Uuid> = HashSet::new();
        for user_id in &seed_users {
            for interaction in self
                .interactions
                .for_user(*user_id, CANDIDATE_INTERACTION_CAP)
                .await?
            {
                if interaction.course_id != course_id {
                    candidate_courses.insert(interaction.course_id);
                }
            }
        }

        let mut similarities = Vec::new();
        for candidate in candidate_courses {
            let candidate_users = self.interactions.users_for_course(candidate).await?;
            let similarity = utils::jaccard_similarity(&seed_users, &candidate_users);
            if similarity > self.config.collaborative.min_similarity {
                let common = seed_users.intersection(&candidate_users).count() as u32;
                similarities.push(ItemSimilarity {
                    course_id: candidate,
                    similarity,
                    common_users: common,
                    computed_at: Utc::now(),
                });
            }
        }

        similarities.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.item_similarity_cache
            .insert(course_id, (similarities.clone(), Utc::now()));
        Ok(similarities)
    }

    /// Item-based scores seeded by the user's recent positive courses.
    async fn item_based_scores(&self, context: &RequestContext) -> Result<HashMap<Uuid, f32>> {
        let seeds = context.recent_positive_courses(self.config.collaborative.item_seed_limit);

        let mut score_sum: HashMap<Uuid, f32> = HashMap::new();
        let mut score_count: HashMap<Uuid, u32> = HashMap::new();

        for seed in seeds {
            for item in self.similar_items(seed).await? {
                if context.has_interacted(item.course_id) {
                    continue;
                }
                *score_sum.entry(item.course_id).or_insert(0.0) += item.similarity;
                *score_count.entry(item.course_id).or_insert(0) += 1;
            }
        }

        Ok(score_sum
            .into_iter()
            .map(|(course_id, sum)| {
                let count = score_count.get(&course_id).copied().unwrap_or(1).max(1);
                (course_id, sum / count as f32)
            })
            .collect())
    }

    async fn try_generate(
        &self,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<Vec<RecommendationDraft>> {
        let user_limit = ((options.limit as f32 * USER_BASED_SHARE).ceil() as usize).max(1);
        let item_limit = ((options.limit as f32 * ITEM_BASED_SHARE).ceil() as usize).max(1);

        let user_scores = self.user_based_scores(context).await?;
        let item_scores = self.item_based_scores(context).await?;

        let mut user_ranked: Vec<(Uuid, f32)> = user_scores.into_iter().collect();
        user_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        user_ranked.truncate(user_limit);

        let mut item_ranked: Vec<(Uuid, f32)> = item_scores.into_iter().collect();
        item_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        item_ranked.truncate(item_limit);

        // Union merge: duplicate courses average their scores and keep both
        // strategy labels in the explanation.
        let mut merged: HashMap<Uuid, (f32, u32, Vec<&'static str>)> = HashMap::new();
        for (course_id, score) in user_ranked {
            let entry = merged.entry(course_id).or_insert((0.0, 0, Vec::new()));
            entry.0 += score;
            entry.1 += 1;
            entry.2.push("learners similar to you engaged with this course");
        }
        for (course_id, score) in item_ranked {
            let entry = merged.entry(course_id).or_insert((0.0, 0, Vec::new()));
            entry.0 += score;
            entry.1 += 1;
            entry.2.push("similar to courses you recently completed");
        }

        let mut drafts: Vec<RecommendationDraft> = merged
            .into_iter()
            .map(|(course_id, (sum, count, reasons))| {
                let score = sum / count.max(1) as f32;
                RecommendationDraft::new(
                    course_id,
                    GeneratorKind::Collaborative,
                    RecommendationReason::SimilarUsers,
                    score,
                )
                .with_explanation(format!("Recommended because {}", reasons.join("; ")))
                .with_metadata(serde_json::json!({
                    "algorithm": GeneratorKind::Collaborative.label(),
                    "strategies": count,
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

        debug!(
            "Collaborative generator produced {} drafts for user {}",
            drafts.len(),
            context.user.id
        );
        Ok(drafts)
    }
}

#[async_trait]
impl RecommendationGenerator for CollaborativeFilteringGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Collaborative
    }

    async fn generate(&self, context: &RequestContext, options: &GenerateOptions) -> Vec<RecommendationDraft> {
        match self.try_generate(context, options).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!("Collaborative generator degraded to empty result: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryInteractionStore, InteractionStore as _};

    async fn seed_positive(
        store: &InMemoryInteractionStore,
        user: Uuid,
        courses: &[Uuid],
        kind: InteractionType,
    ) {
        for course in courses {
            store
                .record(UserInteraction::new(user, *course, kind))
                .await
                .unwrap();
        }
    }

    fn context_for(user_id: Uuid, interactions: Vec<UserInteraction>) -> RequestContext {
        let mut user = User::new("target");
        user.id = user_id;
        RequestContext::new(user, interactions, HashMap::new())
    }

    #[tokio::test]
    async fn test_identical_histories_have_similarity_one() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let target = Uuid::new_v4();
        let twin = Uuid::new_v4();
        let courses: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        seed_positive(&store, target, &courses, InteractionType::Enroll).await;
        seed_positive(&store, twin, &courses, InteractionType::Enroll).await;

        let generator = CollaborativeFilteringGenerator::new(
            store.clone(),
            Arc::new(Config::default()),
        );
        let context = context_for(target, store.for_user(target, 100).await.unwrap());

        let similar = generator.similar_users(&context).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].user_id, twin);
        assert!((similar[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_recommends_courses_from_similar_users() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let target = Uuid::new_v4();
        let neighbor = Uuid::new_v4();
        let shared: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let unseen = Uuid::new_v4();

        seed_positive(&store, target, &shared, InteractionType::Complete).await;
        seed_positive(&store, neighbor, &shared, InteractionType::Complete).await;
        seed_positive(&store, neighbor, &[unseen], InteractionType::Complete).await;

        let generator = CollaborativeFilteringGenerator::new(
            store.clone(),
            Arc::new(Config::default()),
        );
        let context = context_for(target, store.for_user(target, 100).await.unwrap());

        let drafts = generator
            .generate(&context, &GenerateOptions::default())
            .await;

        assert!(drafts.iter().any(|d| d.course_id == unseen));
        // Courses the target already touched never come back.
        assert!(drafts.iter().all(|d| !shared.contains(&d.course_id)));
    }

    #[tokio::test]
    async fn test_item_similarity_jaccard_identity() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let course_a = Uuid::new_v4();
        let course_b = Uuid::new_v4();

        // Same three users touch both courses: Jaccard = 1.
        for _ in 0..3 {
            let user = Uuid::new_v4();
            seed_positive(&store, user, &[course_a, course_b], InteractionType::Enroll).await;
        }

        let generator = CollaborativeFilteringGenerator::new(
            store,
            Arc::new(Config::default()),
        );
        let similar = generator.similar_items(course_a).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].course_id, course_b);
        assert!((similar[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_similarity_cache_is_reused() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let target = Uuid::new_v4();
        let twin = Uuid::new_v4();
        let courses: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();

        seed_positive(&store, target, &courses, InteractionType::Enroll).await;
        seed_positive(&store, twin, &courses, InteractionType::Enroll).await;

        let generator = CollaborativeFilteringGenerator::new(
            store.clone(),
            Arc::new(Config::default()),
        );
        let context = context_for(target, store.for_user(target, 100).await.unwrap());

        let first = generator.similar_users(&context).await.unwrap();

        // New data arrives but the cached snapshot still answers.
        let newcomer = Uuid::new_v4();
        seed_positive(&store, newcomer, &courses, InteractionType::Enroll).await;
        let second = generator.similar_users(&context).await.unwrap();

        assert_eq!(first.len(), second.len());
    }
}
