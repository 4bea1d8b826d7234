//! Benchmark tests for critical operations
//!
//! Run with: cargo test --release -- --ignored --nocapture bench

use std::time::Instant;
use tempfile::NamedTempFile;

use foodgram::database::init_db;
use foodgram::model::{Caller, IngredientAmount, RecipePayload, RegisterRequest};
use foodgram::query::{render_shopping_list, RecipeFilter, Snapshot};
use foodgram::relation::{add_recipe_relation, RecipeRelation};
use foodgram::validation::validate_registration;
use foodgram::{seed, store};

/// Benchmark helper to measure execution time
fn benchmark<F>(name: &str, iterations: usize, mut f: F)
where
    F: FnMut(),
{
    let start = Instant::now();

    for _ in 0..iterations {
        f();
    }

    let duration = start.elapsed();
    let avg_ms = duration.as_millis() as f64 / iterations as f64;
    let ops_per_sec = (iterations as f64 / duration.as_secs_f64()) as u64;

    println!("  {} ({} iterations)", name, iterations);
    println!("    Total time: {:?}", duration);
    println!("    Avg time: {:.3}ms", avg_ms);
    println!("    Throughput: {} ops/sec\n", ops_per_sec);
}

/// Database with one user owning `recipes` recipes over `ingredients` ingredients
fn prepare(recipes: usize, ingredients: u64) -> (NamedTempFile, redb::Database, Caller) {
    let temp_db = NamedTempFile::new().unwrap();
    let db = init_db(temp_db.path().to_str().unwrap()).unwrap();
    seed::load_default_tags(&db).unwrap();

    let items: Vec<(String, String)> = (0..ingredients)
        .map(|i| (format!("Ingredient {i}"), "g".to_string()))
        .collect();
    store::insert_ingredients(&db, &items).unwrap();

    let request = RegisterRequest {
        email: Some("bench@example.com".to_string()),
        username: Some("bench".to_string()),
        first_name: Some("Bench".to_string()),
        last_name: Some("Mark".to_string()),
    };
    let (user, _) = store::register_user(&db, validate_registration(&request).unwrap()).unwrap();
    let caller = Caller::User(user.id);

    for i in 0..recipes {
        let first = (i as u64 % ingredients) + 1;
        let second = ((i as u64 + 1) % ingredients) + 1;
        let payload = RecipePayload {
            name: Some(format!("Recipe {i}")),
            image: Some("data:image/png;base64,AAAA".to_string()),
            text: Some("Cook it.".to_string()),
            cooking_time: Some(10),
            tags: Some(vec![(i as u64 % 4) + 1]),
            ingredients: Some(vec![
                IngredientAmount { id: first, amount: 3 },
                IngredientAmount { id: second, amount: 7 },
            ]),
        };
        store::create_recipe(&db, &caller, &payload).unwrap();
    }

    (temp_db, db, caller)
}

#[test]
#[ignore] // Run explicitly with: cargo test bench --release -- --ignored --nocapture
fn bench_list_recipes() {
    println!("\n=== Benchmark: List recipes ===\n");

    println!("  Preparing: Creating 1000 recipes...");
    let (_temp_db, db, caller) = prepare(1000, 50);
    println!("  Done!\n");

    let iterations = 200;
    benchmark("List without filters", iterations, || {
        let snapshot = Snapshot::open(&db).unwrap();
        let recipes = snapshot.list_recipes(&caller, &RecipeFilter::default()).unwrap();
        assert_eq!(recipes.len(), 1000);
    });

    let filter = RecipeFilter {
        tags: vec!["breakfast".to_string(), "dessert".to_string()],
        ..RecipeFilter::default()
    };
    benchmark("List filtered by two tags", iterations, || {
        let snapshot = Snapshot::open(&db).unwrap();
        let recipes = snapshot.list_recipes(&caller, &filter).unwrap();
        assert_eq!(recipes.len(), 500);
    });

    benchmark("Render first page", iterations, || {
        let snapshot = Snapshot::open(&db).unwrap();
        let recipes = snapshot.list_recipes(&caller, &RecipeFilter::default()).unwrap();
        for recipe in recipes.iter().take(6) {
            snapshot.recipe_view(&caller, recipe).unwrap();
        }
    });
}

#[test]
#[ignore]
fn bench_shopping_list() {
    println!("\n=== Benchmark: Shopping list aggregation ===\n");

    println!("  Preparing: 500 recipes in the cart...");
    let (_temp_db, db, caller) = prepare(500, 20);
    for recipe_id in 1..=500 {
        add_recipe_relation(&db, &caller, RecipeRelation::ShoppingCart, recipe_id).unwrap();
    }
    println!("  Done!\n");

    let user_id = caller.user_id().unwrap();
    benchmark("Aggregate and render", 200, || {
        let snapshot = Snapshot::open(&db).unwrap();
        let lines = snapshot.shopping_list(user_id).unwrap();
        assert_eq!(lines.len(), 20);
        let _ = render_shopping_list(&lines);
    });
}
