//! HTTP request handlers for the recipe API
//!
//! Handlers stay thin: they extract the caller and the request data, hand
//! them to the store, query or relation layer, and render the result. Every
//! failure is an [`AppError`], which knows its own status code and body.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    Extension, Json,
};

use crate::database::AppState;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::model::{
    AvatarRequest, Caller, IngredientRecord, IngredientSearch, ListParams, Page, RecipePayload,
    RecipeView, RegisterRequest, RegisteredUser, ShortLinkResponse, ShortRecipe, SubscriptionView,
    TagRecord, UserView,
};
use crate::query::{parse_recipes_limit, render_shopping_list, RecipeQuery, Snapshot};
use crate::relation::{self, RecipeRelation};
use crate::store;
use crate::validation::{validate_registration, ValidationErrors};

/// Registers a new user
///
/// # Request Body
///
/// ```json
/// {
///   "email": "anna@example.com",
///   "username": "anna",
///   "first_name": "Anna",
///   "last_name": "Smith"
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - the profile plus `auth_token` for the `Authorization` header
/// - **400 Bad Request** - field validation failed
/// - **409 Conflict** - email or username already taken
pub async fn register_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_user = validate_registration(&payload)?;
    let (user, auth_token) = store::register_user(&state.db, new_user)?;

    let response = RegisteredUser {
        id: user.id,
        email: user.email,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        auth_token,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Paginated list of users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<UserView>>, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    let users = snapshot
        .users()?
        .iter()
        .map(|user| snapshot.user_view(&caller, user))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Page::paginate(
        users,
        params.page,
        params.limit,
        state.config.page_size,
    )))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<UserView>, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    let user = snapshot.require_user(id)?;
    Ok(Json(snapshot.user_view(&caller, &user)?))
}

/// Profile of the authenticated caller
pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<UserView>, AppError> {
    let user_id = caller.require_user()?;
    let snapshot = Snapshot::open(&state.db)?;
    let user = snapshot.require_user(user_id)?;
    Ok(Json(snapshot.user_view(&caller, &user)?))
}

/// Deletes the caller's account and everything it owns
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<StatusCode, AppError> {
    let user_id = caller.require_user()?;
    store::delete_user(&state.db, user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Sets the caller's avatar
///
/// The avatar is a reference understood by media storage (typically a
/// base64 data URI); it is stored as given.
pub async fn set_avatar(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<AvatarRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = caller.require_user()?;
    let avatar = payload
        .avatar
        .filter(|avatar| !avatar.trim().is_empty())
        .ok_or_else(|| ValidationErrors::single("avatar", "This field is required."))?;

    let user = store::set_avatar(&state.db, user_id, Some(avatar))?;
    Ok(Json(serde_json::json!({ "avatar": user.avatar })))
}

pub async fn delete_avatar(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<StatusCode, AppError> {
    let user_id = caller.require_user()?;
    store::set_avatar(&state.db, user_id, None)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Authors the caller follows
///
/// # Query Parameters
///
/// - `page`, `limit` - pagination over authors
/// - `recipes_limit` - truncates each author's recipe list; non-numeric values are ignored
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Page<SubscriptionView>>, AppError> {
    let user_id = caller.require_user()?;
    let recipes_limit = parse_recipes_limit(params.recipes_limit.as_deref());

    let snapshot = Snapshot::open(&state.db)?;
    let subscriptions = snapshot.subscriptions(user_id, recipes_limit)?;

    Ok(Json(Page::paginate(
        subscriptions,
        params.page,
        params.limit,
        state.config.page_size,
    )))
}

/// Subscribes the caller to the author `id`
///
/// # Response
///
/// - **201 Created** - the author with their recipes
/// - **400 Bad Request** - subscribing to oneself
/// - **404 Not Found** - no such author
/// - **409 Conflict** - already subscribed
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let recipes_limit = parse_recipes_limit(params.recipes_limit.as_deref());
    let view = relation::subscribe(&state.db, &caller, id, recipes_limit)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<StatusCode, AppError> {
    relation::unsubscribe(&state.db, &caller, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagRecord>>, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    Ok(Json(snapshot.tags()?))
}

pub async fn get_tag(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<TagRecord>, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    Ok(Json(snapshot.tag(id)?))
}

/// Ingredient list, optionally filtered by a case-insensitive name prefix
///
/// `GET /api/ingredients?name=fl` returns "Flour" and "flax seeds" but not "Cauliflower".
pub async fn list_ingredients(
    State(state): State<AppState>,
    ApiQuery(search): ApiQuery<IngredientSearch>,
) -> Result<Json<Vec<IngredientRecord>>, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    Ok(Json(snapshot.search_ingredients(search.name.as_deref())?))
}

pub async fn get_ingredient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<IngredientRecord>, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    Ok(Json(snapshot.ingredient(id)?))
}

/// Filtered, paginated recipe listing, newest first
///
/// # Query Parameters
///
/// - `author` - author id
/// - `tags` - tag slug, may repeat (`?tags=breakfast&tags=lunch`); matches recipes with any of them
/// - `is_favorited`, `is_in_shopping_cart` - `1`/`0`; ignored for anonymous callers
/// - `page`, `limit` - pagination
pub async fn list_recipes(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiQuery(pairs): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Page<RecipeView>>, AppError> {
    let query = RecipeQuery::from_pairs(&pairs)?;

    let snapshot = Snapshot::open(&state.db)?;
    let recipes = snapshot.list_recipes(&caller, &query.filter)?;
    let page = Page::paginate(recipes, query.page, query.limit, state.config.page_size);

    let data = page
        .data
        .iter()
        .map(|recipe| snapshot.recipe_view(&caller, recipe))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(Page {
        count: page.count,
        page: page.page,
        limit: page.limit,
        data,
    }))
}

/// Creates a recipe authored by the caller
///
/// # Request Body
///
/// ```json
/// {
///   "ingredients": [{ "id": 1123, "amount": 10 }],
///   "tags": [1, 2],
///   "image": "data:image/png;base64,iVBORw0KGgo...",
///   "name": "Pancakes",
///   "text": "Mix and fry.",
///   "cooking_time": 20
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - the full recipe
/// - **400 Bad Request** - validation failed, nothing was stored
/// - **401 Unauthorized** - anonymous caller
pub async fn create_recipe(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<impl IntoResponse, AppError> {
    let recipe_id = store::create_recipe(&state.db, &caller, &payload)?;
    let view = recipe_view(&state, &caller, recipe_id)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<RecipeView>, AppError> {
    Ok(Json(recipe_view(&state, &caller, id)?))
}

/// Partially updates a recipe; only its author may do so
pub async fn update_recipe(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
    ApiJson(payload): ApiJson<RecipePayload>,
) -> Result<Json<RecipeView>, AppError> {
    store::update_recipe(&state.db, &caller, id, &payload)?;
    Ok(Json(recipe_view(&state, &caller, id)?))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<StatusCode, AppError> {
    store::delete_recipe(&state.db, &caller, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<impl IntoResponse, AppError> {
    let recipe = relation::add_recipe_relation(&state.db, &caller, RecipeRelation::Favorite, id)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<StatusCode, AppError> {
    relation::remove_recipe_relation(&state.db, &caller, RecipeRelation::Favorite, id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_to_shopping_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<impl IntoResponse, AppError> {
    let recipe =
        relation::add_recipe_relation(&state.db, &caller, RecipeRelation::ShoppingCart, id)?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

pub async fn remove_from_shopping_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    ApiPath(id): ApiPath<u64>,
) -> Result<StatusCode, AppError> {
    relation::remove_recipe_relation(&state.db, &caller, RecipeRelation::ShoppingCart, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists the recipes in the caller's shopping cart
///
/// # Response
///
/// - **200 OK** - condensed recipes, newest first
/// - **401 Unauthorized** - anonymous caller
pub async fn list_shopping_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<ShortRecipe>>, AppError> {
    let user_id = caller.require_user()?;
    let snapshot = Snapshot::open(&state.db)?;
    Ok(Json(snapshot.shopping_cart_recipes(user_id)?))
}

/// Downloads the caller's consolidated shopping list as `shopping_list.txt`
///
/// Each line reads `"{name} ({unit}) - {total}"`, ordered by ingredient name.
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = caller.require_user()?;
    let snapshot = Snapshot::open(&state.db)?;
    let lines = snapshot.shopping_list(user_id)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shopping_list.txt\"",
            ),
        ],
        render_shopping_list(&lines),
    ))
}

/// Returns the recipe's short link, assigning a code on first request
pub async fn get_link(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> Result<Json<ShortLinkResponse>, AppError> {
    let code = relation::recipe_short_link(&state.db, id)?;
    Ok(Json(ShortLinkResponse {
        short_link: format!("{}/s/{}", state.config.public_url, code),
    }))
}

/// Redirects a short link to the recipe page
///
/// # Response
///
/// - **307 Temporary Redirect** - to `/recipes/{id}/`
/// - **404 Not Found** - unknown code
pub async fn redirect_short_link(
    State(state): State<AppState>,
    ApiPath(code): ApiPath<String>,
) -> Result<Redirect, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    let recipe_id = snapshot.resolve_short_link(&code)?;
    Ok(Redirect::temporary(&format!("/recipes/{recipe_id}/")))
}

fn recipe_view(state: &AppState, caller: &Caller, recipe_id: u64) -> Result<RecipeView, AppError> {
    let snapshot = Snapshot::open(&state.db)?;
    let recipe = snapshot.require_recipe(recipe_id)?;
    snapshot.recipe_view(caller, &recipe)
}
