//! Write-request validation
//!
//! Every check here is a plain function that either returns a typed, validated
//! value or a [`ValidationErrors`] report keyed by field name. Checks run in a
//! fixed order: field-level rules first, then cross-field rules (duplicates),
//! and only then the storage-level checks performed by the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::{IngredientAmount, RecipePayload, RegisterRequest};

pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_PERSON_NAME_LEN: usize = 150;
pub const MAX_RECIPE_NAME_LEN: usize = 256;
pub const MIN_COOKING_TIME: i64 = 1;
pub const MIN_AMOUNT: i64 = 1;

/// Key used for errors that do not belong to a single field
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

static USERNAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[\w.@+-]+\z").ok());

/// Field-keyed collection of human-readable validation messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a report holding a single message
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages recorded for `field`, if any
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `Ok(value)` when nothing was recorded, otherwise the report itself
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A registration request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// A recipe creation request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipe {
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: u32,
    pub tags: Vec<u64>,
    pub ingredients: Vec<(u64, u32)>,
}

/// A recipe update request that passed validation; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<u32>,
    pub tags: Option<Vec<u64>>,
    pub ingredients: Option<Vec<(u64, u32)>>,
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.eq_ignore_ascii_case("me") {
        return Err("Username \"me\" is not allowed.".to_string());
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(format!(
            "Ensure this field has no more than {MAX_USERNAME_LEN} characters."
        ));
    }
    if !USERNAME_RE
        .as_ref()
        .is_some_and(|re| re.is_match(username))
    {
        return Err("Username contains disallowed characters.".to_string());
    }
    Ok(())
}

pub fn validate_registration(request: &RegisterRequest) -> Result<NewUser, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let email = required(&mut errors, "email", request.email.as_deref()).and_then(|email| {
        let email = email.trim();
        if email.is_empty() {
            errors.add("email", "This field may not be blank.");
            None
        } else if email.chars().count() > MAX_EMAIL_LEN {
            errors.add(
                "email",
                format!("Ensure this field has no more than {MAX_EMAIL_LEN} characters."),
            );
            None
        } else if !is_plausible_email(email) {
            errors.add("email", "Enter a valid email address.");
            None
        } else {
            Some(email.to_string())
        }
    });

    let username = required(&mut errors, "username", request.username.as_deref()).and_then(
        |username| match validate_username(username) {
            Ok(()) => Some(username.to_string()),
            Err(message) => {
                errors.add("username", message);
                None
            }
        },
    );

    let mut names = [("first_name", &request.first_name), ("last_name", &request.last_name)]
        .map(|(field, value)| {
            required(&mut errors, field, value.as_deref()).and_then(|value| {
                required_text(value, MAX_PERSON_NAME_LEN)
                    .map_err(|message| errors.add(field, message))
                    .ok()
            })
        })
        .into_iter();

    match (email, username, names.next().flatten(), names.next().flatten()) {
        (Some(email), Some(username), Some(first_name), Some(last_name)) if errors.is_empty() => {
            Ok(NewUser {
                email,
                username,
                first_name,
                last_name,
            })
        }
        _ => Err(errors),
    }
}

/// Validates a full recipe for creation; every field is required
pub fn validate_recipe_create(payload: &RecipePayload) -> Result<NewRecipe, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let changes = parse_recipe_fields(payload, &mut errors);

    let required = [
        ("name", payload.name.is_none()),
        ("text", payload.text.is_none()),
        ("cooking_time", payload.cooking_time.is_none()),
        ("tags", payload.tags.is_none()),
        ("ingredients", payload.ingredients.is_none()),
    ];
    for (field, missing) in required {
        if missing {
            errors.add(field, "This field is required.");
        }
    }
    // An empty image is reported by parse_recipe_fields already.
    if payload.image.is_none() {
        errors.add("image", "Field \"image\" may not be empty.");
    }

    match changes {
        RecipeChanges {
            name: Some(name),
            image: Some(image),
            text: Some(text),
            cooking_time: Some(cooking_time),
            tags: Some(tags),
            ingredients: Some(ingredients),
        } if errors.is_empty() => Ok(NewRecipe {
            name,
            image,
            text,
            cooking_time,
            tags,
            ingredients,
        }),
        _ => Err(errors),
    }
}

/// Validates a partial recipe update; omitted fields are left untouched
pub fn validate_recipe_update(payload: &RecipePayload) -> Result<RecipeChanges, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let changes = parse_recipe_fields(payload, &mut errors);
    errors.into_result(changes)
}

/// Rejects a subscription to oneself
pub fn validate_subscription(user_id: u64, author_id: u64) -> Result<(), ValidationErrors> {
    if user_id == author_id {
        return Err(ValidationErrors::single(
            NON_FIELD_ERRORS,
            "You cannot subscribe to yourself.",
        ));
    }
    Ok(())
}

/// Identifiers listed more than once, in ascending order
pub fn find_duplicates(ids: impl IntoIterator<Item = u64>) -> Vec<u64> {
    let mut seen = BTreeSet::new();
    let mut duplicated = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            duplicated.insert(id);
        }
    }
    duplicated.into_iter().collect()
}

pub fn format_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_recipe_fields(payload: &RecipePayload, errors: &mut ValidationErrors) -> RecipeChanges {
    let name = payload.name.as_deref().and_then(|name| {
        required_text(name, MAX_RECIPE_NAME_LEN)
            .map_err(|message| errors.add("name", message))
            .ok()
    });

    let text = payload.text.as_deref().and_then(|text| {
        required_text(text, usize::MAX)
            .map_err(|message| errors.add("text", message))
            .ok()
    });

    let image = payload.image.as_deref().and_then(|image| {
        if image.trim().is_empty() {
            errors.add("image", "Field \"image\" may not be empty.");
            None
        } else {
            Some(image.to_string())
        }
    });

    let cooking_time = payload.cooking_time.and_then(|minutes| {
        match bounded(minutes, MIN_COOKING_TIME) {
            Ok(minutes) => Some(minutes),
            Err(OutOfRange::TooSmall) => {
                errors.add(
                    "cooking_time",
                    format!("Cooking time must be at least {MIN_COOKING_TIME} minute(s)."),
                );
                None
            }
            Err(OutOfRange::TooLarge) => {
                errors.add("cooking_time", too_large_message());
                None
            }
        }
    });

    let tags = payload.tags.as_ref().and_then(|tags| parse_tags(tags, errors));
    let ingredients = payload
        .ingredients
        .as_ref()
        .and_then(|items| parse_ingredients(items, errors));

    RecipeChanges {
        name,
        image,
        text,
        cooking_time,
        tags,
        ingredients,
    }
}

fn parse_tags(tags: &[u64], errors: &mut ValidationErrors) -> Option<Vec<u64>> {
    if tags.is_empty() {
        errors.add("tags", "At least one tag is required.");
        return None;
    }
    let duplicates = find_duplicates(tags.iter().copied());
    if !duplicates.is_empty() {
        errors.add("tags", format!("Duplicates: {}", format_ids(&duplicates)));
        return None;
    }
    Some(tags.to_vec())
}

fn parse_ingredients(
    items: &[IngredientAmount],
    errors: &mut ValidationErrors,
) -> Option<Vec<(u64, u32)>> {
    if items.is_empty() {
        errors.add("ingredients", "A recipe needs at least one ingredient.");
        return None;
    }

    let mut parsed = Vec::with_capacity(items.len());
    let mut valid = true;
    for item in items {
        match bounded(item.amount, MIN_AMOUNT) {
            Ok(amount) => parsed.push((item.id, amount)),
            Err(OutOfRange::TooSmall) => {
                errors.add(
                    "ingredients",
                    format!(
                        "Amount of ingredient {} must be at least {MIN_AMOUNT}.",
                        item.id
                    ),
                );
                valid = false;
            }
            Err(OutOfRange::TooLarge) => {
                errors.add("ingredients", too_large_message());
                valid = false;
            }
        }
    }

    let duplicates = find_duplicates(items.iter().map(|item| item.id));
    if !duplicates.is_empty() {
        errors.add(
            "ingredients",
            format!("Duplicates: {}", format_ids(&duplicates)),
        );
        valid = false;
    }

    valid.then_some(parsed)
}

fn required_text(value: &str, max_len: usize) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("This field may not be blank.".to_string());
    }
    if trimmed.chars().count() > max_len {
        return Err(format!(
            "Ensure this field has no more than {max_len} characters."
        ));
    }
    Ok(trimmed.to_string())
}

/// Records "This field is required." when `value` is absent
fn required<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    if value.is_none() {
        errors.add(field, "This field is required.");
    }
    value
}

/// Why a number was rejected by [`bounded`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutOfRange {
    TooSmall,
    TooLarge,
}

/// Narrows `value` to `u32`, requiring at least `min`
fn bounded(value: i64, min: i64) -> Result<u32, OutOfRange> {
    if value < min {
        return Err(OutOfRange::TooSmall);
    }
    u32::try_from(value).map_err(|_| OutOfRange::TooLarge)
}

fn too_large_message() -> String {
    format!("Ensure this value is less than or equal to {}.", u32::MAX)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(id: u64, amount: i64) -> IngredientAmount {
        IngredientAmount { id, amount }
    }

    fn full_payload() -> RecipePayload {
        RecipePayload {
            name: Some("Pancakes".to_string()),
            image: Some("data:image/png;base64,AAAA".to_string()),
            text: Some("Mix and fry.".to_string()),
            cooking_time: Some(20),
            tags: Some(vec![1, 2]),
            ingredients: Some(vec![ingredient(5, 200), ingredient(6, 2)]),
        }
    }

    #[test]
    fn username_me_is_rejected_in_any_case() {
        assert!(validate_username("me").is_err());
        assert!(validate_username("ME").is_err());
        assert!(validate_username("Me").is_err());
        assert!(validate_username("meme").is_ok());
    }

    #[test]
    fn username_character_set() {
        assert!(validate_username("chef.anna+bake@home-1").is_ok());
        assert!(validate_username("шеф_повар").is_ok());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("semi;colon").is_err());
        assert!(validate_username("").is_err());
        assert!(validate_username("trailing\n").is_err());
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let request = RegisterRequest {
            email: Some("not-an-email".to_string()),
            username: Some("me".to_string()),
            first_name: Some(" ".to_string()),
            last_name: Some("Smith".to_string()),
        };
        let errors = validate_registration(&request).unwrap_err();
        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(fields, vec!["email", "first_name", "username"]);
    }

    #[test]
    fn registration_reports_missing_fields_by_name() {
        let request = RegisterRequest {
            email: Some("anna@example.com".to_string()),
            username: Some("anna".to_string()),
            ..RegisterRequest::default()
        };
        let errors = validate_registration(&request).unwrap_err();
        assert_eq!(errors.field("first_name").unwrap(), ["This field is required."]);
        assert_eq!(errors.field("last_name").unwrap(), ["This field is required."]);
        assert!(errors.field("email").is_none());
    }

    #[test]
    fn complete_registration_is_trimmed() {
        let request = RegisterRequest {
            email: Some(" anna@example.com ".to_string()),
            username: Some("anna".to_string()),
            first_name: Some(" Anna ".to_string()),
            last_name: Some("Smith".to_string()),
        };
        let user = validate_registration(&request).unwrap();
        assert_eq!(user.email, "anna@example.com");
        assert_eq!(user.first_name, "Anna");
    }

    #[test]
    fn full_recipe_passes() {
        let recipe = validate_recipe_create(&full_payload()).unwrap();
        assert_eq!(recipe.cooking_time, 20);
        assert_eq!(recipe.ingredients, vec![(5, 200), (6, 2)]);
    }

    #[test]
    fn empty_tags_and_ingredients_are_rejected() {
        let payload = RecipePayload {
            tags: Some(vec![]),
            ingredients: Some(vec![]),
            ..full_payload()
        };
        let errors = validate_recipe_create(&payload).unwrap_err();
        assert!(errors.field("tags").is_some());
        assert!(errors.field("ingredients").is_some());
    }

    #[test]
    fn duplicate_ingredient_ids_are_reported() {
        let payload = RecipePayload {
            ingredients: Some(vec![ingredient(5, 1), ingredient(7, 1), ingredient(5, 3)]),
            ..full_payload()
        };
        let errors = validate_recipe_create(&payload).unwrap_err();
        let messages = errors.field("ingredients").unwrap();
        assert_eq!(messages, ["Duplicates: 5"]);
    }

    #[test]
    fn duplicate_tags_are_reported() {
        let payload = RecipePayload {
            tags: Some(vec![3, 1, 3, 1]),
            ..full_payload()
        };
        let errors = validate_recipe_create(&payload).unwrap_err();
        assert_eq!(errors.field("tags").unwrap(), ["Duplicates: 1, 3"]);
    }

    #[test]
    fn non_positive_amount_and_cooking_time() {
        let payload = RecipePayload {
            cooking_time: Some(0),
            ingredients: Some(vec![ingredient(5, 0), ingredient(6, -2)]),
            ..full_payload()
        };
        let errors = validate_recipe_create(&payload).unwrap_err();
        assert!(errors.field("cooking_time").is_some());
        assert_eq!(errors.field("ingredients").unwrap().len(), 2);
    }

    #[test]
    fn values_beyond_u32_report_the_upper_bound() {
        let payload = RecipePayload {
            cooking_time: Some(i64::from(u32::MAX) + 1),
            ingredients: Some(vec![ingredient(5, i64::MAX)]),
            ..full_payload()
        };
        let errors = validate_recipe_create(&payload).unwrap_err();
        let expected = ["Ensure this value is less than or equal to 4294967295."];
        assert_eq!(errors.field("cooking_time").unwrap(), expected);
        assert_eq!(errors.field("ingredients").unwrap(), expected);

        let payload = RecipePayload {
            cooking_time: Some(i64::from(u32::MAX)),
            ..full_payload()
        };
        assert_eq!(validate_recipe_create(&payload).unwrap().cooking_time, u32::MAX);
    }

    #[test]
    fn image_is_required_on_create_only() {
        let missing = RecipePayload {
            image: None,
            ..full_payload()
        };
        assert!(validate_recipe_create(&missing)
            .unwrap_err()
            .field("image")
            .is_some());

        let blank = RecipePayload {
            image: Some(String::new()),
            ..full_payload()
        };
        assert!(validate_recipe_create(&blank).is_err());

        let update = RecipePayload {
            image: None,
            ..full_payload()
        };
        let changes = validate_recipe_update(&update).unwrap();
        assert_eq!(changes.image, None);
        assert_eq!(changes.tags, Some(vec![1, 2]));
    }

    #[test]
    fn update_still_rejects_empty_tag_list() {
        let payload = RecipePayload {
            tags: Some(vec![]),
            ..RecipePayload::default()
        };
        assert!(validate_recipe_update(&payload).is_err());
    }

    #[test]
    fn self_subscription_is_rejected() {
        assert!(validate_subscription(4, 4).is_err());
        assert!(validate_subscription(4, 5).is_ok());
    }
}
