//! Reference data loaded at startup: default tags and the ingredient catalogue

use std::fs;
use std::path::Path;

use redb::Database;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::store;

/// Tags every installation starts with, as (name, slug)
pub const DEFAULT_TAGS: [(&str, &str); 4] = [
    ("Breakfast", "breakfast"),
    ("Lunch", "lunch"),
    ("Dinner", "dinner"),
    ("Dessert", "dessert"),
];

#[derive(Deserialize)]
struct IngredientRow {
    name: String,
    measurement_unit: String,
}

/// Creates the default tags that do not exist yet
pub fn load_default_tags(db: &Database) -> Result<(), AppError> {
    for (name, slug) in DEFAULT_TAGS {
        store::get_or_create_tag(db, name, slug)?;
    }
    Ok(())
}

/// Loads ingredients from a JSON array or a two-column CSV file
///
/// Pairs already present are skipped, as are CSV rows without exactly two
/// columns. Returns the number of ingredients added.
pub fn load_ingredients(db: &Database, path: &Path) -> Result<usize, AppError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), "Failed to read ingredients file: {e}");
            return Ok(0);
        }
    };

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let items = if is_json {
        parse_json(&raw)?
    } else {
        parse_csv(&raw)
    };

    let added = store::insert_ingredients(db, &items)?;
    info!(
        path = %path.display(),
        read = items.len(),
        added,
        "ingredients loaded"
    );
    Ok(added)
}

fn parse_json(raw: &str) -> Result<Vec<(String, String)>, AppError> {
    let rows: Vec<IngredientRow> = serde_json::from_str(raw)?;
    Ok(rows
        .into_iter()
        .map(|row| (row.name.trim().to_string(), row.measurement_unit.trim().to_string()))
        .filter(|(name, unit)| !name.is_empty() && !unit.is_empty())
        .collect())
}

fn parse_csv(raw: &str) -> Vec<(String, String)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let rows = reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => match (record.len(), record.get(0), record.get(1)) {
                (2, Some(name), Some(unit)) if !name.is_empty() && !unit.is_empty() => {
                    Some((name.to_string(), unit.to_string()))
                }
                _ => None,
            },
            Err(e) => {
                warn!("Skipping unreadable ingredient row: {e}");
                None
            }
        })
        .collect();
    rows
}
