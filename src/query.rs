//! Read-side views over a consistent database snapshot
//!
//! A [`Snapshot`] opens every table once inside a single read transaction,
//! so a response assembled from several tables (a recipe with its author,
//! tags, ingredients and the caller's relation flags) never mixes states.
//! Nothing in this module writes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;

use crate::database::{
    prefix_bounds, split_pair_key, TABLE_FAVORITES, TABLE_INGREDIENTS, TABLE_RECIPES,
    TABLE_RECIPE_INGREDIENTS, TABLE_SHOPPING_CART, TABLE_SHORT_LINKS, TABLE_SUBSCRIPTIONS,
    TABLE_TAGS, TABLE_TAG_SLUGS, TABLE_USERS,
};
use crate::error::AppError;
use crate::model::{
    Caller, IngredientRecord, RecipeIngredientView, RecipeRecord, RecipeView, ShortRecipe,
    SubscriptionView, TagRecord, UserRecord, UserView,
};
use crate::validation::ValidationErrors;

/// Loads and decodes one JSON record from an id-keyed table
pub(crate) fn load<T, R>(table: &R, id: u64) -> Result<Option<T>, AppError>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static str>,
{
    match table.get(id)? {
        Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
        None => Ok(None),
    }
}

/// Loads and decodes every record of an id-keyed table, in id order
pub(crate) fn load_all<T, R>(table: &R) -> Result<Vec<T>, AppError>
where
    T: DeserializeOwned,
    R: ReadableTable<u64, &'static str>,
{
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        records.push(serde_json::from_str(value.value())?);
    }
    Ok(records)
}

/// Right-hand ids of every `"{left}:{right}"` key in a relation table
pub(crate) fn related_ids<R, V>(table: &R, left: u64) -> Result<Vec<u64>, AppError>
where
    R: ReadableTable<&'static str, V>,
    V: redb::Value + 'static,
{
    let (start, end) = prefix_bounds(left);
    let mut ids = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (key, _) = entry?;
        if let Some((_, right)) = split_pair_key(key.value()) {
            ids.push(right);
        }
    }
    Ok(ids)
}

/// Explicit existence query for a `(left, right)` relation row
pub(crate) fn relation_exists<R, V>(table: &R, left: u64, right: u64) -> Result<bool, AppError>
where
    R: ReadableTable<&'static str, V>,
    V: redb::Value + 'static,
{
    let key = crate::database::pair_key(left, right);
    Ok(table.get(key.as_str())?.is_some())
}

/// Ingredient links of one recipe as `(ingredient_id, amount)`
pub(crate) fn ingredient_links<R>(table: &R, recipe_id: u64) -> Result<Vec<(u64, u32)>, AppError>
where
    R: ReadableTable<&'static str, u32>,
{
    let (start, end) = prefix_bounds(recipe_id);
    let mut links = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (key, amount) = entry?;
        if let Some((_, ingredient_id)) = split_pair_key(key.value()) {
            links.push((ingredient_id, amount.value()));
        }
    }
    Ok(links)
}

/// Filters accepted by the recipe listing
///
/// `is_favorited` and `is_in_shopping_cart` only take effect for
/// authenticated callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<u64>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// Recipe listing query: filters plus pagination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeQuery {
    pub filter: RecipeFilter,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl RecipeQuery {
    /// Builds the query from raw query-string pairs, keeping repeated `tags`
    ///
    /// # Example
    ///
    /// `?author=3&tags=breakfast&tags=lunch&is_favorited=1&page=2`
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ValidationErrors> {
        let mut query = Self::default();
        let mut errors = ValidationErrors::new();

        for (key, value) in pairs {
            match key.as_str() {
                "author" => match value.parse() {
                    Ok(author) => query.filter.author = Some(author),
                    Err(_) => errors.add("author", "Enter a number."),
                },
                "tags" => {
                    if !value.is_empty() && !query.filter.tags.contains(value) {
                        query.filter.tags.push(value.clone());
                    }
                }
                "is_favorited" => match parse_flag(value) {
                    Some(flag) => query.filter.is_favorited = flag,
                    None => errors.add("is_favorited", "Enter a valid boolean."),
                },
                "is_in_shopping_cart" => match parse_flag(value) {
                    Some(flag) => query.filter.is_in_shopping_cart = flag,
                    None => errors.add("is_in_shopping_cart", "Enter a valid boolean."),
                },
                "page" => match value.parse() {
                    Ok(page) => query.page = Some(page),
                    Err(_) => errors.add("page", "Invalid page."),
                },
                "limit" => match value.parse() {
                    Ok(limit) => query.limit = Some(limit),
                    Err(_) => errors.add("limit", "Invalid limit."),
                },
                _ => {}
            }
        }

        errors.into_result(query)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" | "True" => Some(true),
        "0" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Parses `recipes_limit`; anything that is not a non-negative integer is ignored
pub fn parse_recipes_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse().ok())
}

/// One consolidated line of the shopping list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: u64,
}

impl fmt::Display for ShoppingListLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {}",
            self.name, self.measurement_unit, self.total_amount
        )
    }
}

/// Renders the downloadable plain-text shopping list, one line per ingredient
pub fn render_shopping_list(lines: &[ShoppingListLine]) -> String {
    lines
        .iter()
        .map(ShoppingListLine::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Snapshot {
    users: ReadOnlyTable<u64, &'static str>,
    tags: ReadOnlyTable<u64, &'static str>,
    tag_slugs: ReadOnlyTable<&'static str, u64>,
    ingredients: ReadOnlyTable<u64, &'static str>,
    recipes: ReadOnlyTable<u64, &'static str>,
    recipe_ingredients: ReadOnlyTable<&'static str, u32>,
    favorites: ReadOnlyTable<&'static str, i64>,
    shopping_cart: ReadOnlyTable<&'static str, i64>,
    subscriptions: ReadOnlyTable<&'static str, i64>,
    short_links: ReadOnlyTable<&'static str, u64>,
    _txn: ReadTransaction,
}

impl Snapshot {
    pub fn open(db: &Database) -> Result<Self, AppError> {
        let txn = db.begin_read()?;
        Ok(Self {
            users: txn.open_table(TABLE_USERS)?,
            tags: txn.open_table(TABLE_TAGS)?,
            tag_slugs: txn.open_table(TABLE_TAG_SLUGS)?,
            ingredients: txn.open_table(TABLE_INGREDIENTS)?,
            recipes: txn.open_table(TABLE_RECIPES)?,
            recipe_ingredients: txn.open_table(TABLE_RECIPE_INGREDIENTS)?,
            favorites: txn.open_table(TABLE_FAVORITES)?,
            shopping_cart: txn.open_table(TABLE_SHOPPING_CART)?,
            subscriptions: txn.open_table(TABLE_SUBSCRIPTIONS)?,
            short_links: txn.open_table(TABLE_SHORT_LINKS)?,
            _txn: txn,
        })
    }

    pub fn user(&self, id: u64) -> Result<Option<UserRecord>, AppError> {
        load(&self.users, id)
    }

    pub fn require_user(&self, id: u64) -> Result<UserRecord, AppError> {
        self.user(id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// All users ordered by last name, then first name
    pub fn users(&self) -> Result<Vec<UserRecord>, AppError> {
        let mut users: Vec<UserRecord> = load_all(&self.users)?;
        users.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });
        Ok(users)
    }

    pub fn recipe(&self, id: u64) -> Result<Option<RecipeRecord>, AppError> {
        load(&self.recipes, id)
    }

    pub fn require_recipe(&self, id: u64) -> Result<RecipeRecord, AppError> {
        self.recipe(id)?
            .ok_or_else(|| AppError::NotFound("Recipe not found".to_string()))
    }

    pub fn tag(&self, id: u64) -> Result<TagRecord, AppError> {
        load(&self.tags, id)?.ok_or_else(|| AppError::NotFound("Tag not found".to_string()))
    }

    /// All tags ordered by name
    pub fn tags(&self) -> Result<Vec<TagRecord>, AppError> {
        let mut tags: Vec<TagRecord> = load_all(&self.tags)?;
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    pub fn ingredient(&self, id: u64) -> Result<IngredientRecord, AppError> {
        load(&self.ingredients, id)?
            .ok_or_else(|| AppError::NotFound("Ingredient not found".to_string()))
    }

    /// Ingredients whose name starts with `prefix`, ignoring case, ordered by name
    pub fn search_ingredients(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<IngredientRecord>, AppError> {
        let prefix = prefix.map(str::to_lowercase).filter(|p| !p.is_empty());
        let mut found: Vec<IngredientRecord> = load_all::<IngredientRecord, _>(&self.ingredients)?
            .into_iter()
            .filter(|ingredient| match &prefix {
                Some(prefix) => ingredient.name.to_lowercase().starts_with(prefix.as_str()),
                None => true,
            })
            .collect();
        found.sort_by(|a, b| {
            (&a.name, &a.measurement_unit).cmp(&(&b.name, &b.measurement_unit))
        });
        Ok(found)
    }

    pub fn is_favorited(&self, user_id: u64, recipe_id: u64) -> Result<bool, AppError> {
        relation_exists(&self.favorites, user_id, recipe_id)
    }

    pub fn is_in_shopping_cart(&self, user_id: u64, recipe_id: u64) -> Result<bool, AppError> {
        relation_exists(&self.shopping_cart, user_id, recipe_id)
    }

    pub fn is_subscribed(&self, user_id: u64, author_id: u64) -> Result<bool, AppError> {
        relation_exists(&self.subscriptions, user_id, author_id)
    }

    pub fn user_view(&self, caller: &Caller, user: &UserRecord) -> Result<UserView, AppError> {
        let is_subscribed = match caller.user_id() {
            Some(caller_id) => self.is_subscribed(caller_id, user.id)?,
            None => false,
        };
        Ok(UserView {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
            avatar: user.avatar.clone(),
        })
    }

    /// Ingredients of a recipe with their amounts, ordered by name
    pub fn recipe_ingredients(
        &self,
        recipe_id: u64,
    ) -> Result<Vec<RecipeIngredientView>, AppError> {
        let mut views = Vec::new();
        for (ingredient_id, amount) in ingredient_links(&self.recipe_ingredients, recipe_id)? {
            let ingredient = self.ingredient(ingredient_id)?;
            views.push(RecipeIngredientView {
                id: ingredient.id,
                name: ingredient.name,
                measurement_unit: ingredient.measurement_unit,
                amount,
            });
        }
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    pub fn recipe_view(
        &self,
        caller: &Caller,
        recipe: &RecipeRecord,
    ) -> Result<RecipeView, AppError> {
        let author = self.require_user(recipe.author)?;

        let mut tags = recipe
            .tags
            .iter()
            .map(|&id| self.tag(id))
            .collect::<Result<Vec<_>, _>>()?;
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        let (is_favorited, is_in_shopping_cart) = match caller.user_id() {
            Some(user_id) => (
                self.is_favorited(user_id, recipe.id)?,
                self.is_in_shopping_cart(user_id, recipe.id)?,
            ),
            None => (false, false),
        };

        Ok(RecipeView {
            id: recipe.id,
            tags,
            author: self.user_view(caller, &author)?,
            ingredients: self.recipe_ingredients(recipe.id)?,
            name: recipe.name.clone(),
            image: recipe.image.clone(),
            text: recipe.text.clone(),
            cooking_time: recipe.cooking_time,
            is_favorited,
            is_in_shopping_cart,
        })
    }

    /// Recipes matching every supplied filter, newest first
    ///
    /// Tag filtering keeps a recipe carrying at least one of the requested
    /// slugs; each recipe appears at most once. The favorite and cart flags
    /// are ignored for anonymous callers.
    pub fn list_recipes(
        &self,
        caller: &Caller,
        filter: &RecipeFilter,
    ) -> Result<Vec<RecipeRecord>, AppError> {
        let tag_ids: Option<BTreeSet<u64>> = if filter.tags.is_empty() {
            None
        } else {
            let mut ids = BTreeSet::new();
            for slug in &filter.tags {
                if let Some(id) = self.tag_slugs.get(slug.as_str())? {
                    ids.insert(id.value());
                }
            }
            Some(ids)
        };

        let favorites = match caller.user_id() {
            Some(user_id) if filter.is_favorited => Some(
                related_ids(&self.favorites, user_id)?
                    .into_iter()
                    .collect::<BTreeSet<_>>(),
            ),
            _ => None,
        };

        let in_cart = match caller.user_id() {
            Some(user_id) if filter.is_in_shopping_cart => Some(
                related_ids(&self.shopping_cart, user_id)?
                    .into_iter()
                    .collect::<BTreeSet<_>>(),
            ),
            _ => None,
        };

        let mut recipes: Vec<RecipeRecord> = load_all::<RecipeRecord, _>(&self.recipes)?
            .into_iter()
            .filter(|recipe| {
                filter.author.is_none_or(|author| recipe.author == author)
                    && tag_ids
                        .as_ref()
                        .is_none_or(|ids| recipe.tags.iter().any(|tag| ids.contains(tag)))
                    && favorites.as_ref().is_none_or(|ids| ids.contains(&recipe.id))
                    && in_cart.as_ref().is_none_or(|ids| ids.contains(&recipe.id))
            })
            .collect();

        sort_newest_first(&mut recipes);
        Ok(recipes)
    }

    /// Recipes in the shopping cart of `user_id`, newest first
    pub fn shopping_cart_recipes(&self, user_id: u64) -> Result<Vec<ShortRecipe>, AppError> {
        let mut recipes = Vec::new();
        for recipe_id in related_ids(&self.shopping_cart, user_id)? {
            if let Some(recipe) = self.recipe(recipe_id)? {
                recipes.push(recipe);
            }
        }
        sort_newest_first(&mut recipes);
        Ok(recipes.iter().map(ShortRecipe::from).collect())
    }

    /// Consolidated shopping list for `user_id`
    ///
    /// Amounts from every recipe in the cart are summed per
    /// (ingredient name, measurement unit) and ordered by name.
    pub fn shopping_list(&self, user_id: u64) -> Result<Vec<ShoppingListLine>, AppError> {
        let mut totals: BTreeMap<(String, String), u64> = BTreeMap::new();

        for recipe_id in related_ids(&self.shopping_cart, user_id)? {
            for (ingredient_id, amount) in ingredient_links(&self.recipe_ingredients, recipe_id)? {
                let ingredient = self.ingredient(ingredient_id)?;
                *totals
                    .entry((ingredient.name, ingredient.measurement_unit))
                    .or_default() += u64::from(amount);
            }
        }

        Ok(totals
            .into_iter()
            .map(|((name, measurement_unit), total_amount)| ShoppingListLine {
                name,
                measurement_unit,
                total_amount,
            })
            .collect())
    }

    /// Recipe id behind a short link code
    pub fn resolve_short_link(&self, code: &str) -> Result<u64, AppError> {
        match self.short_links.get(code)? {
            Some(recipe_id) => Ok(recipe_id.value()),
            None => Err(AppError::NotFound("Short link not found".to_string())),
        }
    }

    /// Recipes of one author, newest first
    pub fn author_recipes(&self, author_id: u64) -> Result<Vec<RecipeRecord>, AppError> {
        let mut recipes: Vec<RecipeRecord> = load_all::<RecipeRecord, _>(&self.recipes)?
            .into_iter()
            .filter(|recipe| recipe.author == author_id)
            .collect();
        sort_newest_first(&mut recipes);
        Ok(recipes)
    }

    /// A followed author with their recipe count and (optionally truncated) recipes
    pub fn subscription_view(
        &self,
        caller: &Caller,
        author: &UserRecord,
        recipes_limit: Option<usize>,
    ) -> Result<SubscriptionView, AppError> {
        let recipes = self.author_recipes(author.id)?;
        let recipes_count = recipes.len();
        let shown = recipes_limit.unwrap_or(recipes_count);

        Ok(SubscriptionView {
            author: self.user_view(caller, author)?,
            recipes: recipes.iter().take(shown).map(ShortRecipe::from).collect(),
            recipes_count,
        })
    }

    /// Authors followed by `user_id`, ordered by last name, then first name
    pub fn subscriptions(
        &self,
        user_id: u64,
        recipes_limit: Option<usize>,
    ) -> Result<Vec<SubscriptionView>, AppError> {
        let caller = Caller::User(user_id);
        let mut authors = Vec::new();
        for author_id in related_ids(&self.subscriptions, user_id)? {
            if let Some(author) = self.user(author_id)? {
                authors.push(author);
            }
        }
        authors.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });

        authors
            .iter()
            .map(|author| self.subscription_view(&caller, author, recipes_limit))
            .collect()
    }
}

fn sort_newest_first(recipes: &mut [RecipeRecord]) {
    recipes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
}
