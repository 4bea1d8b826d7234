//! Short link codes for recipes
//!
//! A code is 15 to 32 random alphanumeric characters. It is assigned to a
//! recipe the first time someone asks for the recipe's short link and is
//! never changed afterwards. Collisions with existing codes are retried a
//! bounded number of times.

use rand::{distr::Alphanumeric, Rng};
use redb::{ReadableTable, WriteTransaction};
use tracing::{debug, info};

use crate::database::{TABLE_RECIPES, TABLE_SHORT_LINKS};
use crate::error::AppError;
use crate::model::RecipeRecord;
use crate::query::load;

pub const MIN_CODE_LEN: usize = 15;
pub const MAX_CODE_LEN: usize = 32;

/// Attempts made before giving up with `AppError::ShortLinkExhausted`
pub const MAX_ATTEMPTS: usize = 10;

/// Generates a random code of 15 to 32 alphanumeric characters
pub fn generate_code() -> String {
    let len = rand::rng().random_range(MIN_CODE_LEN..=MAX_CODE_LEN);
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Draws codes from `generate` until one is not yet taken
pub fn allocate_code<R>(
    short_links: &R,
    mut generate: impl FnMut() -> String,
) -> Result<String, AppError>
where
    R: ReadableTable<&'static str, u64>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let code = generate();
        if short_links.get(code.as_str())?.is_none() {
            return Ok(code);
        }
        debug!(attempt, "short link code collision, retrying");
    }
    Err(AppError::ShortLinkExhausted(MAX_ATTEMPTS))
}

/// Returns the recipe's short link code, assigning one on first use
pub fn assign(txn: &WriteTransaction, recipe_id: u64) -> Result<String, AppError> {
    assign_with(txn, recipe_id, generate_code)
}

/// Same as [`assign`] with a caller-supplied code generator
pub fn assign_with(
    txn: &WriteTransaction,
    recipe_id: u64,
    generate: impl FnMut() -> String,
) -> Result<String, AppError> {
    let mut recipes = txn.open_table(TABLE_RECIPES)?;
    let mut recipe: RecipeRecord = load(&recipes, recipe_id)?
        .ok_or_else(|| AppError::NotFound("Recipe not found".to_string()))?;

    if let Some(code) = &recipe.short_link {
        return Ok(code.clone());
    }

    let mut short_links = txn.open_table(TABLE_SHORT_LINKS)?;
    let code = allocate_code(&short_links, generate)?;
    short_links.insert(code.as_str(), recipe_id)?;

    recipe.short_link = Some(code.clone());
    let json = serde_json::to_string(&recipe)?;
    recipes.insert(recipe_id, json.as_str())?;

    info!(recipe_id, code = %code, "short link assigned");
    Ok(code)
}
