use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::runtime::Runtime;
use uuid::Uuid;

use learnpath::models::*;
use learnpath::stores::{InMemoryBackends, InteractionStore};
use learnpath::{Config, EngineState};

const USERS: usize = 200;
const COURSES: usize = 300;
const INTERACTIONS_PER_USER: usize = 20;

fn seed(rt: &Runtime) -> (EngineState, InMemoryBackends, Vec<Uuid>) {
    let (engine, backends) = EngineState::in_memory(Config::default());
    let mut rng = rand::thread_rng();

    let tags = ["rust", "python", "javascript", "go", "sql", "ml"];
    let skills = ["backend", "frontend", "data", "systems", "devops"];

    let courses: Vec<Course> = (0..COURSES)
        .map(|i| {
            Course::new(format!("Course {}", i), "programming")
                .with_tags(vec![tags.choose(&mut rng).unwrap().to_string()])
                .with_skills(vec![skills.choose(&mut rng).unwrap().to_string()])
                .with_rating(rng.gen_range(2.0..5.0))
                .with_duration(rng.gen_range(30..300))
                .with_enrollments(rng.gen_range(0..10_000))
        })
        .collect();
    for course in &courses {
        backends.courses.insert(course.clone());
    }

    let mut user_ids = Vec::with_capacity(USERS);
    for i in 0..USERS {
        let user = User::new(format!("user-{}", i)).with_skills(
            vec![skills.choose(&mut rng).unwrap().to_string()],
            vec![skills.choose(&mut rng).unwrap().to_string()],
        );
        user_ids.push(user.id);
        backends.users.insert(user);
    }

    let types = InteractionType::all();
    rt.block_on(async {
        for user_id in &user_ids {
            for _ in 0..INTERACTIONS_PER_USER {
                let course = courses.choose(&mut rng).unwrap();
                let kind = *types.choose(&mut rng).unwrap();
                backends
                    .interactions
                    .record(UserInteraction::new(*user_id, course.id, kind))
                    .await
                    .unwrap();
            }
        }
    });

    (engine, backends, user_ids)
}

fn bench_generate_recommendations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, _backends, user_ids) = seed(&rt);

    c.bench_function("generate_recommendations_cold", |b| {
        let mut index = 0;
        b.iter(|| {
            let user_id = user_ids[index % user_ids.len()];
            index += 1;
            rt.block_on(async {
                engine.cache.invalidate_user(user_id).await;
                let recs = engine
                    .orchestrator
                    .generate_recommendations(user_id, 10)
                    .await
                    .unwrap();
                black_box(recs)
            })
        })
    });

    c.bench_function("generate_recommendations_cached", |b| {
        let user_id = user_ids[0];
        rt.block_on(async {
            engine
                .orchestrator
                .generate_recommendations(user_id, 10)
                .await
                .unwrap();
        });
        b.iter(|| {
            rt.block_on(async {
                let recs = engine
                    .orchestrator
                    .generate_recommendations(user_id, 10)
                    .await
                    .unwrap();
                black_box(recs)
            })
        })
    });
}

fn bench_learning_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (engine, _backends, user_ids) = seed(&rt);
    let goal = LearningGoal::new(
        vec!["backend".to_string()],
        Difficulty::Beginner,
        Difficulty::Advanced,
    );

    c.bench_function("generate_learning_path", |b| {
        let mut index = 0;
        b.iter(|| {
            let user_id = user_ids[index % user_ids.len()];
            index += 1;
            rt.block_on(async {
                let path = engine
                    .planner
                    .generate(user_id, &goal, &PathGenerationOptions::default())
                    .await
                    .unwrap();
                black_box(path)
            })
        })
    });
}

fn bench_similarity_primitives(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let a: Vec<f32> = (0..256).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let b: Vec<f32> = (0..256).map(|_| rng.gen_range(-1.0..1.0)).collect();

    c.bench_function("cosine_similarity_256", |bench| {
        bench.iter(|| black_box(learnpath::utils::cosine_similarity(&a, &b)))
    });
}

criterion_group!(
    benches,
    bench_generate_recommendations,
    bench_learning_path,
    bench_similarity_primitives
);
criterion_main!(benches);
