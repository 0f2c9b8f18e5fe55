use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use uuid::Uuid;

/// Cosine similarity between two dense vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Cosine similarity between two sparse weighted vectors keyed by course id.
/// Missing entries count as zero, so the union of keys defines the space.
pub fn sparse_cosine_similarity(a: &HashMap<Uuid, f32>, b: &HashMap<Uuid, f32>) -> f32 {
    let keys: HashSet<&Uuid> = a.keys().chain(b.keys()).collect();

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for key in keys {
        let va = a.get(key).copied().unwrap_or(0.0);
        let vb = b.get(key).copied().unwrap_or(0.0);
        dot_product += va * vb;
        norm_a += va * va;
        norm_b += vb * vb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Jaccard similarity of two id sets.
pub fn jaccard_similarity(a: &HashSet<Uuid>, b: &HashSet<Uuid>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count();
    let union = a.union(b).count();

    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Jaccard over string sets (tags, skills).
pub fn jaccard_str(a: &[String], b: &[String]) -> f32 {
    let sa: HashSet<&str> = a.iter().map(|s| s.as_str()).collect();
    let sb: HashSet<&str> = b.iter().map(|s| s.as_str()).collect();

    if sa.is_empty() && sb.is_empty() {
        return 0.0;
    }

    let union = sa.union(&sb).count();
    if union == 0 {
        0.0
    } else {
        sa.intersection(&sb).count() as f32 / union as f32
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Stable hash bucket for feature hashing (skill/tag vectors).
pub fn hash_bucket(value: &str, buckets: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    (hasher.finish() as usize) % buckets
}

/// Ratio of the smaller to the larger of two durations, in [0, 1].
pub fn duration_closeness(a: f32, b: f32) -> f32 {
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    a.min(b) / a.max(b)
}

pub fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indexed_scores: Vec<(usize, f32)> = scores
        .iter()
        .enumerate()
        .map(|(i, &score)| (i, score))
        .collect();

    indexed_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    indexed_scores.into_iter().take(k).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        let a = vec![1.0, 1.0];
        let b = vec![1.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_cosine_identical_and_disjoint() {
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();
        let c3 = Uuid::new_v4();

        let mut a = HashMap::new();
        a.insert(c1, 0.8);
        a.insert(c2, 1.0);

        assert!((sparse_cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);

        let mut b = HashMap::new();
        b.insert(c3, 0.5);
        assert_eq!(sparse_cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_jaccard_identities() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let u3 = Uuid::new_v4();

        let a: HashSet<Uuid> = [u1, u2].into_iter().collect();
        let b: HashSet<Uuid> = [u3].into_iter().collect();

        assert!((jaccard_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(jaccard_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_duration_closeness() {
        assert!((duration_closeness(60.0, 120.0) - 0.5).abs() < 1e-6);
        assert!((duration_closeness(90.0, 90.0) - 1.0).abs() < 1e-6);
        assert_eq!(duration_closeness(0.0, 90.0), 0.0);
    }

    #[test]
    fn test_hash_bucket_stable() {
        assert_eq!(hash_bucket("react", 50), hash_bucket("react", 50));
        assert!(hash_bucket("react", 50) < 50);
    }

    #[test]
    fn test_top_k_indices() {
        let scores = vec![0.1, 0.5, 0.3, 0.9, 0.2];
        let top_2 = top_k_indices(&scores, 2);
        assert_eq!(top_2, vec![3, 1]);
    }
}
