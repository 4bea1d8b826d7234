//! Write side of the entity store
//!
//! Each public function runs in exactly one redb write transaction and
//! commits only when every step succeeded; returning early with an error
//! drops the transaction, which rolls it back. redb admits one writer at a
//! time, so a uniqueness check and the insert that follows it cannot be
//! interleaved with another request.

use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use redb::{Database, ReadableDatabase, ReadableTable, Table, WriteTransaction};
use serde::Serialize;
use tracing::{debug, info};

use crate::database::{
    pair_key, prefix_bounds, split_pair_key, TABLE_FAVORITES, TABLE_INGREDIENTS,
    TABLE_INGREDIENT_KEYS, TABLE_RECIPES, TABLE_RECIPE_INGREDIENTS, TABLE_SEQUENCES,
    TABLE_SHOPPING_CART, TABLE_SHORT_LINKS, TABLE_SUBSCRIPTIONS, TABLE_TAGS, TABLE_TAG_NAMES,
    TABLE_TAG_SLUGS, TABLE_TOKENS, TABLE_USERS, TABLE_USER_EMAILS, TABLE_USER_USERNAMES,
};
use crate::error::AppError;
use crate::model::{Caller, IngredientRecord, RecipePayload, RecipeRecord, TagRecord, UserRecord};
use crate::query::{load, load_all};
use crate::validation::{
    format_ids, validate_recipe_create, validate_recipe_update, NewUser, ValidationErrors,
};

const SEQ_USERS: &str = "users";
const SEQ_TAGS: &str = "tags";
const SEQ_INGREDIENTS: &str = "ingredients";
const SEQ_RECIPES: &str = "recipes";

/// Length of issued API tokens
pub const TOKEN_LEN: usize = 40;

fn next_id(txn: &WriteTransaction, sequence: &str) -> Result<u64, AppError> {
    let mut table = txn.open_table(TABLE_SEQUENCES)?;
    let next = table.get(sequence)?.map(|last| last.value()).unwrap_or(0) + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

fn save<T: Serialize>(
    table: &mut Table<'_, u64, &'static str>,
    id: u64,
    record: &T,
) -> Result<(), AppError> {
    let json = serde_json::to_string(record)?;
    table.insert(id, json.as_str())?;
    Ok(())
}

/// Removes every `"{left}:{right}"` key for which `matches(left, right)` holds
fn remove_pairs<V>(
    table: &mut Table<'_, &'static str, V>,
    matches: impl Fn(u64, u64) -> bool,
) -> Result<usize, AppError>
where
    V: redb::Value + 'static,
{
    let mut doomed = Vec::new();
    for entry in table.iter()? {
        let (key, _) = entry?;
        let key = key.value();
        if split_pair_key(key).is_some_and(|(left, right)| matches(left, right)) {
            doomed.push(key.to_string());
        }
    }
    for key in &doomed {
        table.remove(key.as_str())?;
    }
    Ok(doomed.len())
}

fn ingredient_key(name: &str, measurement_unit: &str) -> String {
    format!("{name}\u{1f}{measurement_unit}")
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Creates a user and issues an API token for them
///
/// Email (compared case-insensitively) and username must both be unused,
/// otherwise the call fails with `Conflict`.
pub fn register_user(db: &Database, new_user: NewUser) -> Result<(UserRecord, String), AppError> {
    let write_txn = db.begin_write()?;
    let email_key = new_user.email.to_lowercase();

    let (user, token) = {
        let mut emails = write_txn.open_table(TABLE_USER_EMAILS)?;
        let mut usernames = write_txn.open_table(TABLE_USER_USERNAMES)?;

        if emails.get(email_key.as_str())?.is_some() {
            return Err(AppError::Conflict(
                "A user with this email already exists.".to_string(),
            ));
        }
        if usernames.get(new_user.username.as_str())?.is_some() {
            return Err(AppError::Conflict(
                "A user with this username already exists.".to_string(),
            ));
        }

        let id = next_id(&write_txn, SEQ_USERS)?;
        let user = UserRecord {
            id,
            email: new_user.email,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            avatar: None,
            date_joined: Utc::now(),
        };

        emails.insert(email_key.as_str(), id)?;
        usernames.insert(user.username.as_str(), id)?;

        let mut users = write_txn.open_table(TABLE_USERS)?;
        save(&mut users, id, &user)?;

        let token = generate_token();
        let mut tokens = write_txn.open_table(TABLE_TOKENS)?;
        tokens.insert(token.as_str(), id)?;

        (user, token)
    };

    write_txn.commit()?;
    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((user, token))
}

/// User id owning an API token, if the token is known
pub fn resolve_token(db: &Database, token: &str) -> Result<Option<u64>, AppError> {
    let read_txn = db.begin_read()?;
    let tokens = read_txn.open_table(TABLE_TOKENS)?;
    let user_id = tokens.get(token)?.map(|id| id.value());
    Ok(user_id)
}

/// Sets (`Some`) or clears (`None`) the avatar reference of a user
pub fn set_avatar(
    db: &Database,
    user_id: u64,
    avatar: Option<String>,
) -> Result<UserRecord, AppError> {
    let write_txn = db.begin_write()?;
    let user = {
        let mut users = write_txn.open_table(TABLE_USERS)?;
        let mut user: UserRecord = load(&users, user_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        user.avatar = avatar;
        save(&mut users, user_id, &user)?;
        user
    };
    write_txn.commit()?;
    debug!(user_id, has_avatar = user.avatar.is_some(), "avatar updated");
    Ok(user)
}

/// Deletes a user together with everything they own
///
/// Their recipes (with each recipe's links and relations), favorites, cart
/// entries, subscriptions in both directions, tokens and unique index
/// entries all go in the same transaction.
pub fn delete_user(db: &Database, user_id: u64) -> Result<(), AppError> {
    let write_txn = db.begin_write()?;

    let user: UserRecord = {
        let users = write_txn.open_table(TABLE_USERS)?;
        load(&users, user_id)?.ok_or_else(|| AppError::NotFound("User not found".to_string()))?
    };

    let owned: Vec<RecipeRecord> = {
        let recipes = write_txn.open_table(TABLE_RECIPES)?;
        load_all::<RecipeRecord, _>(&recipes)?
            .into_iter()
            .filter(|recipe| recipe.author == user_id)
            .collect()
    };
    for recipe in &owned {
        delete_recipe_rows(&write_txn, recipe)?;
    }

    {
        let mut favorites = write_txn.open_table(TABLE_FAVORITES)?;
        remove_pairs(&mut favorites, |user, _| user == user_id)?;
        let mut cart = write_txn.open_table(TABLE_SHOPPING_CART)?;
        remove_pairs(&mut cart, |user, _| user == user_id)?;
        let mut subscriptions = write_txn.open_table(TABLE_SUBSCRIPTIONS)?;
        remove_pairs(&mut subscriptions, |user, author| {
            user == user_id || author == user_id
        })?;

        let mut tokens = write_txn.open_table(TABLE_TOKENS)?;
        let mut doomed = Vec::new();
        for entry in tokens.iter()? {
            let (token, owner) = entry?;
            if owner.value() == user_id {
                doomed.push(token.value().to_string());
            }
        }
        for token in &doomed {
            tokens.remove(token.as_str())?;
        }

        let mut emails = write_txn.open_table(TABLE_USER_EMAILS)?;
        emails.remove(user.email.to_lowercase().as_str())?;
        let mut usernames = write_txn.open_table(TABLE_USER_USERNAMES)?;
        usernames.remove(user.username.as_str())?;
        let mut users = write_txn.open_table(TABLE_USERS)?;
        users.remove(user_id)?;
    }

    write_txn.commit()?;
    info!(user_id, recipes = owned.len(), "user deleted");
    Ok(())
}

/// Creates a tag; name and slug must both be unused
pub fn create_tag(db: &Database, name: &str, slug: &str) -> Result<TagRecord, AppError> {
    let write_txn = db.begin_write()?;
    let tag = {
        let mut names = write_txn.open_table(TABLE_TAG_NAMES)?;
        let mut slugs = write_txn.open_table(TABLE_TAG_SLUGS)?;
        if names.get(name)?.is_some() || slugs.get(slug)?.is_some() {
            return Err(AppError::Conflict(format!(
                "Tag with name {name:?} or slug {slug:?} already exists."
            )));
        }

        let id = next_id(&write_txn, SEQ_TAGS)?;
        let tag = TagRecord {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
        };
        names.insert(name, id)?;
        slugs.insert(slug, id)?;
        let mut tags = write_txn.open_table(TABLE_TAGS)?;
        save(&mut tags, id, &tag)?;
        tag
    };
    write_txn.commit()?;
    debug!(tag_id = tag.id, slug = %tag.slug, "tag created");
    Ok(tag)
}

/// Returns the tag with `slug`, creating it when absent
pub fn get_or_create_tag(db: &Database, name: &str, slug: &str) -> Result<TagRecord, AppError> {
    let existing = {
        let read_txn = db.begin_read()?;
        let slugs = read_txn.open_table(TABLE_TAG_SLUGS)?;
        let tags = read_txn.open_table(TABLE_TAGS)?;
        let id = slugs.get(slug)?.map(|id| id.value());
        match id {
            Some(id) => load::<TagRecord, _>(&tags, id)?,
            None => None,
        }
    };
    match existing {
        Some(tag) => Ok(tag),
        None => create_tag(db, name, slug),
    }
}

/// Creates an ingredient; the (name, measurement unit) pair must be unused
pub fn create_ingredient(
    db: &Database,
    name: &str,
    measurement_unit: &str,
) -> Result<IngredientRecord, AppError> {
    let write_txn = db.begin_write()?;
    let ingredient = insert_ingredient(&write_txn, name, measurement_unit)?.ok_or_else(|| {
        AppError::Conflict(format!(
            "Ingredient {name:?} measured in {measurement_unit:?} already exists."
        ))
    })?;
    write_txn.commit()?;
    Ok(ingredient)
}

/// Bulk-inserts ingredients in one transaction, skipping existing pairs
///
/// Returns how many ingredients were actually added.
pub fn insert_ingredients(db: &Database, items: &[(String, String)]) -> Result<usize, AppError> {
    let write_txn = db.begin_write()?;
    let mut added = 0;
    for (name, measurement_unit) in items {
        if insert_ingredient(&write_txn, name, measurement_unit)?.is_some() {
            added += 1;
        }
    }
    write_txn.commit()?;
    Ok(added)
}

fn insert_ingredient(
    write_txn: &WriteTransaction,
    name: &str,
    measurement_unit: &str,
) -> Result<Option<IngredientRecord>, AppError> {
    let key = ingredient_key(name, measurement_unit);
    let mut keys = write_txn.open_table(TABLE_INGREDIENT_KEYS)?;
    if keys.get(key.as_str())?.is_some() {
        return Ok(None);
    }

    let id = next_id(write_txn, SEQ_INGREDIENTS)?;
    let ingredient = IngredientRecord {
        id,
        name: name.to_string(),
        measurement_unit: measurement_unit.to_string(),
    };
    keys.insert(key.as_str(), id)?;
    let mut ingredients = write_txn.open_table(TABLE_INGREDIENTS)?;
    save(&mut ingredients, id, &ingredient)?;
    Ok(Some(ingredient))
}

/// Storage-level check that every referenced tag and ingredient exists
fn check_references(
    write_txn: &WriteTransaction,
    tags: Option<&[u64]>,
    ingredients: Option<&[(u64, u32)]>,
) -> Result<(), AppError> {
    let mut errors = ValidationErrors::new();

    if let Some(tags) = tags {
        let table = write_txn.open_table(TABLE_TAGS)?;
        let mut missing = Vec::new();
        for &id in tags {
            if table.get(id)?.is_none() {
                missing.push(id);
            }
        }
        if !missing.is_empty() {
            errors.add("tags", format!("Unknown tags: {}", format_ids(&missing)));
        }
    }

    if let Some(ingredients) = ingredients {
        let table = write_txn.open_table(TABLE_INGREDIENTS)?;
        let mut missing = Vec::new();
        for &(id, _) in ingredients {
            if table.get(id)?.is_none() {
                missing.push(id);
            }
        }
        if !missing.is_empty() {
            errors.add(
                "ingredients",
                format!("Unknown ingredients: {}", format_ids(&missing)),
            );
        }
    }

    errors.into_result(()).map_err(AppError::from)
}

/// Deletes all ingredient links of a recipe and writes `ingredients` instead
fn replace_ingredient_links(
    write_txn: &WriteTransaction,
    recipe_id: u64,
    ingredients: &[(u64, u32)],
) -> Result<(), AppError> {
    let mut links = write_txn.open_table(TABLE_RECIPE_INGREDIENTS)?;

    let (start, end) = prefix_bounds(recipe_id);
    let mut stale = Vec::new();
    for entry in links.range(start.as_str()..end.as_str())? {
        let (key, _) = entry?;
        stale.push(key.value().to_string());
    }
    for key in &stale {
        links.remove(key.as_str())?;
    }

    for &(ingredient_id, amount) in ingredients {
        links.insert(pair_key(recipe_id, ingredient_id).as_str(), amount)?;
    }
    Ok(())
}

/// Removes a recipe row and everything that references it
fn delete_recipe_rows(write_txn: &WriteTransaction, recipe: &RecipeRecord) -> Result<(), AppError> {
    replace_ingredient_links(write_txn, recipe.id, &[])?;

    let mut favorites = write_txn.open_table(TABLE_FAVORITES)?;
    remove_pairs(&mut favorites, |_, recipe_id| recipe_id == recipe.id)?;
    let mut cart = write_txn.open_table(TABLE_SHOPPING_CART)?;
    remove_pairs(&mut cart, |_, recipe_id| recipe_id == recipe.id)?;

    if let Some(code) = &recipe.short_link {
        let mut short_links = write_txn.open_table(TABLE_SHORT_LINKS)?;
        short_links.remove(code.as_str())?;
    }

    let mut recipes = write_txn.open_table(TABLE_RECIPES)?;
    recipes.remove(recipe.id)?;
    Ok(())
}

/// Loads a recipe for mutation and checks that `user_id` is its author
fn recipe_for_author(
    write_txn: &WriteTransaction,
    recipe_id: u64,
    user_id: u64,
) -> Result<RecipeRecord, AppError> {
    let recipes = write_txn.open_table(TABLE_RECIPES)?;
    let recipe: RecipeRecord = load(&recipes, recipe_id)?
        .ok_or_else(|| AppError::NotFound("Recipe not found".to_string()))?;
    if recipe.author != user_id {
        return Err(AppError::forbidden());
    }
    Ok(recipe)
}

/// Creates a recipe with its tags and ingredient links in one transaction
///
/// Returns the new recipe id.
pub fn create_recipe(
    db: &Database,
    caller: &Caller,
    payload: &RecipePayload,
) -> Result<u64, AppError> {
    let author = caller.require_user()?;
    let new_recipe = validate_recipe_create(payload)?;

    let write_txn = db.begin_write()?;
    check_references(
        &write_txn,
        Some(new_recipe.tags.as_slice()),
        Some(new_recipe.ingredients.as_slice()),
    )?;

    let id = next_id(&write_txn, SEQ_RECIPES)?;
    let record = RecipeRecord {
        id,
        author,
        name: new_recipe.name,
        image: new_recipe.image,
        text: new_recipe.text,
        cooking_time: new_recipe.cooking_time,
        tags: new_recipe.tags,
        pub_date: Utc::now(),
        short_link: None,
    };
    {
        let mut recipes = write_txn.open_table(TABLE_RECIPES)?;
        save(&mut recipes, id, &record)?;
    }
    replace_ingredient_links(&write_txn, id, &new_recipe.ingredients)?;

    write_txn.commit()?;
    info!(recipe_id = id, author, "recipe created");
    Ok(id)
}

/// Applies a partial update to a recipe owned by the caller
///
/// A supplied tag list replaces the stored one; a supplied ingredient list
/// replaces every existing link.
pub fn update_recipe(
    db: &Database,
    caller: &Caller,
    recipe_id: u64,
    payload: &RecipePayload,
) -> Result<(), AppError> {
    let user_id = caller.require_user()?;

    let write_txn = db.begin_write()?;
    let mut recipe = recipe_for_author(&write_txn, recipe_id, user_id)?;

    let changes = validate_recipe_update(payload)?;
    check_references(&write_txn, changes.tags.as_deref(), changes.ingredients.as_deref())?;

    if let Some(name) = changes.name {
        recipe.name = name;
    }
    if let Some(image) = changes.image {
        recipe.image = image;
    }
    if let Some(text) = changes.text {
        recipe.text = text;
    }
    if let Some(cooking_time) = changes.cooking_time {
        recipe.cooking_time = cooking_time;
    }
    if let Some(tags) = changes.tags {
        recipe.tags = tags;
    }
    {
        let mut recipes = write_txn.open_table(TABLE_RECIPES)?;
        save(&mut recipes, recipe_id, &recipe)?;
    }
    if let Some(ingredients) = &changes.ingredients {
        replace_ingredient_links(&write_txn, recipe_id, ingredients)?;
    }

    write_txn.commit()?;
    info!(recipe_id, "recipe updated");
    Ok(())
}

/// Deletes a recipe owned by the caller, cascading to links and relations
pub fn delete_recipe(db: &Database, caller: &Caller, recipe_id: u64) -> Result<(), AppError> {
    let user_id = caller.require_user()?;

    let write_txn = db.begin_write()?;
    let recipe = recipe_for_author(&write_txn, recipe_id, user_id)?;
    delete_recipe_rows(&write_txn, &recipe)?;
    write_txn.commit()?;

    info!(recipe_id, "recipe deleted");
    Ok(())
}
