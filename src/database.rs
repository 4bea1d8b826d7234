//! Database initialization and table definitions
//!
//! Every entity lives in its own redb table keyed by a numeric id, with the
//! record itself stored as a JSON string. Unique constraints are enforced
//! through index tables keyed by the unique value, and many-to-many relations
//! are stored under composite `"{left}:{right}"` keys so a pair can only
//! exist once.

use redb::{Database, TableDefinition};
use std::sync::Arc;

use crate::config::Config;

/// Users by id (JSON-serialized `UserRecord`)
pub const TABLE_USERS: TableDefinition<u64, &str> = TableDefinition::new("users_v1");

/// Unique index: email -> user id
pub const TABLE_USER_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("user_emails_v1");

/// Unique index: username -> user id
pub const TABLE_USER_USERNAMES: TableDefinition<&str, u64> =
    TableDefinition::new("user_usernames_v1");

/// API tokens: token key -> user id
pub const TABLE_TOKENS: TableDefinition<&str, u64> = TableDefinition::new("tokens_v1");

/// Tags by id (JSON-serialized `TagRecord`)
pub const TABLE_TAGS: TableDefinition<u64, &str> = TableDefinition::new("tags_v1");

/// Unique index: tag name -> tag id
pub const TABLE_TAG_NAMES: TableDefinition<&str, u64> = TableDefinition::new("tag_names_v1");

/// Unique index: tag slug -> tag id
pub const TABLE_TAG_SLUGS: TableDefinition<&str, u64> = TableDefinition::new("tag_slugs_v1");

/// Ingredients by id (JSON-serialized `IngredientRecord`)
pub const TABLE_INGREDIENTS: TableDefinition<u64, &str> = TableDefinition::new("ingredients_v1");

/// Unique index: "{name}\u{1f}{measurement_unit}" -> ingredient id
pub const TABLE_INGREDIENT_KEYS: TableDefinition<&str, u64> =
    TableDefinition::new("ingredient_keys_v1");

/// Recipes by id (JSON-serialized `RecipeRecord`, tag ids included)
pub const TABLE_RECIPES: TableDefinition<u64, &str> = TableDefinition::new("recipes_v1");

/// Recipe ingredient links
///
/// Key: "{recipe_id}:{ingredient_id}"
/// Value: amount
pub const TABLE_RECIPE_INGREDIENTS: TableDefinition<&str, u32> =
    TableDefinition::new("recipe_ingredients_v1");

/// Favorites
///
/// Key: "{user_id}:{recipe_id}"
/// Value: creation timestamp in microseconds
pub const TABLE_FAVORITES: TableDefinition<&str, i64> = TableDefinition::new("favorites_v1");

/// Shopping cart entries, same layout as `TABLE_FAVORITES`
pub const TABLE_SHOPPING_CART: TableDefinition<&str, i64> =
    TableDefinition::new("shopping_cart_v1");

/// Subscriptions
///
/// Key: "{user_id}:{author_id}"
/// Value: creation timestamp in microseconds
pub const TABLE_SUBSCRIPTIONS: TableDefinition<&str, i64> =
    TableDefinition::new("subscriptions_v1");

/// Short link mapping: code -> recipe id
pub const TABLE_SHORT_LINKS: TableDefinition<&str, u64> = TableDefinition::new("short_links_v1");

/// Id sequences: sequence name -> last issued id
pub const TABLE_SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences_v1");

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe reference to the embedded database
    pub db: Arc<Database>,

    /// Configuration loaded at startup
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
        }
    }
}

/// Initializes the embedded database and creates required tables
///
/// # Example
///
/// ```no_run
/// # use foodgram::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_USERS)?;
        write_txn.open_table(TABLE_USER_EMAILS)?;
        write_txn.open_table(TABLE_USER_USERNAMES)?;
        write_txn.open_table(TABLE_TOKENS)?;
        write_txn.open_table(TABLE_TAGS)?;
        write_txn.open_table(TABLE_TAG_NAMES)?;
        write_txn.open_table(TABLE_TAG_SLUGS)?;
        write_txn.open_table(TABLE_INGREDIENTS)?;
        write_txn.open_table(TABLE_INGREDIENT_KEYS)?;
        write_txn.open_table(TABLE_RECIPES)?;
        write_txn.open_table(TABLE_RECIPE_INGREDIENTS)?;
        write_txn.open_table(TABLE_FAVORITES)?;
        write_txn.open_table(TABLE_SHOPPING_CART)?;
        write_txn.open_table(TABLE_SUBSCRIPTIONS)?;
        write_txn.open_table(TABLE_SHORT_LINKS)?;
        write_txn.open_table(TABLE_SEQUENCES)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Composite key for relation tables: "{left}:{right}"
pub fn pair_key(left: u64, right: u64) -> String {
    format!("{left}:{right}")
}

/// Splits a composite relation key back into its two ids
pub fn split_pair_key(key: &str) -> Option<(u64, u64)> {
    let (left, right) = key.split_once(':')?;
    Some((left.parse().ok()?, right.parse().ok()?))
}

/// Range bounds covering every composite key whose left half is `left`
///
/// The character '{' sorts after ':' and every digit, so
/// `"{left}:".."{left}:{"` matches exactly the keys starting with `"{left}:"`.
pub fn prefix_bounds(left: u64) -> (String, String) {
    (format!("{left}:"), format!("{left}:{{"))
}
