//! Route definitions for the recipe API
//!
//! This module maps every HTTP route to its handler and attaches the caller
//! identity middleware to all of them.

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;

use crate::database::AppState;
use crate::handler::{
    add_favorite, add_to_shopping_cart, create_recipe, delete_avatar, delete_me, delete_recipe,
    download_shopping_cart, get_ingredient, get_link, get_recipe, get_tag, get_user,
    list_ingredients, list_recipes, list_shopping_cart, list_subscriptions, list_tags, list_users,
    me, redirect_short_link, register_user, remove_favorite, remove_from_shopping_cart,
    set_avatar, subscribe, unsubscribe, update_recipe,
};
use crate::middleware::caller_middleware;

/// Creates and configures the Axum application router with all routes
///
/// # Route Definitions
///
/// - `GET /s/{code}` - short link redirect
/// - `/api/users` - registration, profiles, avatar, subscriptions
/// - `/api/tags`, `/api/ingredients` - read-only reference data
/// - `/api/recipes` - recipe CRUD, favorites, shopping cart, short links
///
/// # Example Usage
///
/// ```no_run
/// # use foodgram::config::Config;
/// # use foodgram::database::{init_db, AppState};
/// # use foodgram::route::create_app;
/// # let db = init_db("data.db").unwrap();
/// let state = AppState::new(db, Config::default());
/// let app = create_app(state);
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Public short link redirect
        .route("/s/{code}", get(redirect_short_link))
        // Users, avatars and subscriptions
        .route("/api/users", get(list_users).post(register_user))
        .route("/api/users/me", get(me).delete(delete_me))
        .route("/api/users/me/avatar", put(set_avatar).delete(delete_avatar))
        .route("/api/users/subscriptions", get(list_subscriptions))
        .route("/api/users/{id}", get(get_user))
        .route(
            "/api/users/{id}/subscribe",
            post(subscribe).delete(unsubscribe),
        )
        // Reference data
        .route("/api/tags", get(list_tags))
        .route("/api/tags/{id}", get(get_tag))
        .route("/api/ingredients", get(list_ingredients))
        .route("/api/ingredients/{id}", get(get_ingredient))
        // Recipes
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/shopping_cart", get(list_shopping_cart))
        .route(
            "/api/recipes/download_shopping_cart",
            get(download_shopping_cart),
        )
        .route(
            "/api/recipes/{id}",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route("/api/recipes/{id}/get-link", get(get_link))
        .route(
            "/api/recipes/{id}/favorite",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/api/recipes/{id}/shopping_cart",
            post(add_to_shopping_cart).delete(remove_from_shopping_cart),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            caller_middleware,
        ))
        .with_state(state)
}
