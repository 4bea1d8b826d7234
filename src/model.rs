//! Data models for the recipe service
//!
//! This module defines the persisted records, the request payloads accepted
//! by the API and the response views rendered from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Identity of whoever issued the current request
///
/// Anonymous callers are a value of their own rather than a missing user, so
/// every operation states explicitly how it treats them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(u64),
}

impl Caller {
    pub fn user_id(&self) -> Option<u64> {
        match self {
            Caller::Anonymous => None,
            Caller::User(id) => Some(*id),
        }
    }

    /// The caller's user id, or `Unauthorized` for anonymous callers
    pub fn require_user(&self) -> Result<u64, AppError> {
        self.user_id().ok_or(AppError::Unauthorized)
    }
}

/// A registered user as stored in `TABLE_USERS`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,

    /// Reference to the avatar image in media storage
    #[serde(default)]
    pub avatar: Option<String>,

    pub date_joined: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientRecord {
    pub id: u64,
    pub name: String,
    pub measurement_unit: String,
}

/// A recipe as stored in `TABLE_RECIPES`
///
/// Ingredient links live in `TABLE_RECIPE_INGREDIENTS`; tags are small enough
/// to be kept inline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeRecord {
    pub id: u64,
    pub author: u64,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: u32,
    pub tags: Vec<u64>,
    pub pub_date: DateTime<Utc>,

    /// Assigned on the first short link request, never changed afterwards
    #[serde(default)]
    pub short_link: Option<String>,
}

/// Request payload for registering a user
///
/// Fields are optional so that a missing one is reported by validation
/// under its own name.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Request payload for `PUT /api/users/me/avatar`
#[derive(Deserialize, Debug, Clone)]
pub struct AvatarRequest {
    pub avatar: Option<String>,
}

/// One `{ "id", "amount" }` entry of a recipe write request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: u64,
    pub amount: i64,
}

/// Request payload for creating (all fields) or updating (any subset) a recipe
///
/// Numbers are accepted as signed so that negative values reach validation
/// and produce a field error instead of a generic parse failure.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RecipePayload {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
    pub tags: Option<Vec<u64>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

/// Query parameters for paginated listings
///
/// # Example
/// Query string: `?page=2&limit=6&recipes_limit=3`
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    /// Page number, starts from 1
    pub page: Option<usize>,

    /// Items per page, capped at 100
    pub limit: Option<usize>,

    /// Truncates each author's recipe list in subscription views; kept as a
    /// string because non-numeric values are ignored rather than rejected
    pub recipes_limit: Option<String>,
}

/// Query parameters for the ingredient search
#[derive(Deserialize, Debug, Default)]
pub struct IngredientSearch {
    pub name: Option<String>,
}

/// Public view of a user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

/// Response returned after a successful registration
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisteredUser {
    pub id: u64,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,

    /// Key to send back as `Authorization: Token <key>`
    pub auth_token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredientView {
    pub id: u64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: u32,
}

/// Full recipe representation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeView {
    pub id: u64,
    pub tags: Vec<TagRecord>,
    pub author: UserView,
    pub ingredients: Vec<RecipeIngredientView>,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: u32,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// Condensed recipe representation used by favorites, carts and subscriptions
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShortRecipe {
    pub id: u64,
    pub name: String,
    pub image: String,
    pub cooking_time: u32,
}

impl From<&RecipeRecord> for ShortRecipe {
    fn from(recipe: &RecipeRecord) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: recipe.image.clone(),
            cooking_time: recipe.cooking_time,
        }
    }
}

/// A followed author together with their recipes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserView,
    pub recipes: Vec<ShortRecipe>,
    pub recipes_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShortLinkResponse {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

/// Paginated response envelope
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Page<T> {
    /// Total number of items matching the query
    pub count: usize,
    pub page: usize,
    pub limit: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Cuts `items` down to the requested page
    pub fn paginate(
        items: Vec<T>,
        page: Option<usize>,
        limit: Option<usize>,
        default_limit: usize,
    ) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(default_limit)
            .clamp(1, crate::config::MAX_PAGE_SIZE);
        let count = items.len();
        let offset = (page - 1).saturating_mul(limit);

        let data = items.into_iter().skip(offset).take(limit).collect();

        Self {
            count,
            page,
            limit,
            data,
        }
    }
}
