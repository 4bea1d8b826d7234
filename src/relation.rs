//! Add/remove operations over unique (user, target) relations
//!
//! Favorites and shopping cart entries pair a user with a recipe;
//! subscriptions pair a user with an author. Adding a pair that already
//! exists is a conflict, and removing a pair that does not exist is a
//! not-found error: neither side is silently idempotent.

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::info;

use crate::database::{
    pair_key, TABLE_FAVORITES, TABLE_RECIPES, TABLE_SHOPPING_CART, TABLE_SUBSCRIPTIONS,
    TABLE_USERS,
};
use crate::error::AppError;
use crate::model::{Caller, RecipeRecord, ShortRecipe, SubscriptionView};
use crate::query::{load, Snapshot};
use crate::short_link;
use crate::validation::validate_subscription;

/// The two user-to-recipe relations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeRelation {
    Favorite,
    ShoppingCart,
}

impl RecipeRelation {
    fn table(self) -> TableDefinition<'static, &'static str, i64> {
        match self {
            RecipeRelation::Favorite => TABLE_FAVORITES,
            RecipeRelation::ShoppingCart => TABLE_SHOPPING_CART,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "favorite",
            RecipeRelation::ShoppingCart => "shopping_cart",
        }
    }

    fn already_present(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "Recipe is already in favorites.",
            RecipeRelation::ShoppingCart => "Recipe is already in the shopping cart.",
        }
    }

    fn absent(self) -> &'static str {
        match self {
            RecipeRelation::Favorite => "Recipe is not in favorites.",
            RecipeRelation::ShoppingCart => "Recipe is not in the shopping cart.",
        }
    }
}

/// Adds `recipe_id` to the caller's favorites or shopping cart
///
/// Returns the condensed recipe on success and `Conflict` if the pair is
/// already present.
pub fn add_recipe_relation(
    db: &Database,
    caller: &Caller,
    relation: RecipeRelation,
    recipe_id: u64,
) -> Result<ShortRecipe, AppError> {
    let user_id = caller.require_user()?;

    let write_txn = db.begin_write()?;
    let recipe: RecipeRecord = {
        let recipes = write_txn.open_table(TABLE_RECIPES)?;
        load(&recipes, recipe_id)?
            .ok_or_else(|| AppError::NotFound("Recipe not found".to_string()))?
    };
    {
        let mut table = write_txn.open_table(relation.table())?;
        let key = pair_key(user_id, recipe_id);
        if table.get(key.as_str())?.is_some() {
            return Err(AppError::Conflict(relation.already_present().to_string()));
        }
        table.insert(key.as_str(), Utc::now().timestamp_micros())?;
    }
    write_txn.commit()?;

    info!(user_id, recipe_id, relation = relation.name(), "relation added");
    Ok(ShortRecipe::from(&recipe))
}

/// Removes `recipe_id` from the caller's favorites or shopping cart
pub fn remove_recipe_relation(
    db: &Database,
    caller: &Caller,
    relation: RecipeRelation,
    recipe_id: u64,
) -> Result<(), AppError> {
    let user_id = caller.require_user()?;

    let write_txn = db.begin_write()?;
    {
        let recipes = write_txn.open_table(TABLE_RECIPES)?;
        if recipes.get(recipe_id)?.is_none() {
            return Err(AppError::NotFound("Recipe not found".to_string()));
        }

        let mut table = write_txn.open_table(relation.table())?;
        if table.remove(pair_key(user_id, recipe_id).as_str())?.is_none() {
            return Err(AppError::NotFound(relation.absent().to_string()));
        }
    }
    write_txn.commit()?;

    info!(user_id, recipe_id, relation = relation.name(), "relation removed");
    Ok(())
}

/// Subscribes the caller to `author_id`
///
/// Returns the followed author with their recipes, truncated to
/// `recipes_limit` when given.
pub fn subscribe(
    db: &Database,
    caller: &Caller,
    author_id: u64,
    recipes_limit: Option<usize>,
) -> Result<SubscriptionView, AppError> {
    let user_id = caller.require_user()?;

    let write_txn = db.begin_write()?;
    {
        let users = write_txn.open_table(TABLE_USERS)?;
        if users.get(author_id)?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }
    }
    validate_subscription(user_id, author_id)?;
    {
        let mut subscriptions = write_txn.open_table(TABLE_SUBSCRIPTIONS)?;
        let key = pair_key(user_id, author_id);
        if subscriptions.get(key.as_str())?.is_some() {
            return Err(AppError::Conflict(
                "You are already subscribed to this author.".to_string(),
            ));
        }
        subscriptions.insert(key.as_str(), Utc::now().timestamp_micros())?;
    }
    write_txn.commit()?;
    info!(user_id, author_id, "subscribed");

    let snapshot = Snapshot::open(db)?;
    let author = snapshot.require_user(author_id)?;
    snapshot.subscription_view(caller, &author, recipes_limit)
}

/// Removes the caller's subscription to `author_id`
pub fn unsubscribe(db: &Database, caller: &Caller, author_id: u64) -> Result<(), AppError> {
    let user_id = caller.require_user()?;

    let write_txn = db.begin_write()?;
    {
        let users = write_txn.open_table(TABLE_USERS)?;
        if users.get(author_id)?.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let mut subscriptions = write_txn.open_table(TABLE_SUBSCRIPTIONS)?;
        if subscriptions
            .remove(pair_key(user_id, author_id).as_str())?
            .is_none()
        {
            return Err(AppError::NotFound(
                "You are not subscribed to this author.".to_string(),
            ));
        }
    }
    write_txn.commit()?;

    info!(user_id, author_id, "unsubscribed");
    Ok(())
}

/// Short link code of a recipe, assigning one on first request
pub fn recipe_short_link(db: &Database, recipe_id: u64) -> Result<String, AppError> {
    let write_txn = db.begin_write()?;
    let code = short_link::assign(&write_txn, recipe_id)?;
    write_txn.commit()?;
    Ok(code)
}
