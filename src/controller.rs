// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{Ingredient, IngredientId, Recipe, RecipeId};
use diesel::prelude::BelongingToDsl as _;
use diesel::prelude::Connection as _;
use diesel::prelude::GroupedBy as _;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};

const NAME_LIMIT: usize = 50;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn required(field: &'static str) -> Self {
        Self {
            field,
            message: "this field is required".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("recipe not found")]
    NotFound,
    #[error("invalid recipe payload")]
    Invalid(Vec<FieldError>),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Deserialize)]
pub struct IngredientPayload {
    pub name: String,
}

/// Request body for create (POST), full replace (PUT), and partial update
/// (PATCH). Which fields must be present depends on the operation, so they
/// are all optional here and checked by the controller.
#[derive(Debug, Default, Deserialize)]
pub struct RecipePayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub ingredients: Option<Vec<IngredientPayload>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFilter {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngredientResponse {
    pub id: IngredientId,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: RecipeId,
    pub name: String,
    pub description: String,
    pub ingredients: Vec<IngredientResponse>,
}

impl RecipeResponse {
    fn new(recipe: Recipe, ingredients: Vec<Ingredient>) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            description: recipe.description,
            ingredients: ingredients
                .into_iter()
                .map(|i| IngredientResponse {
                    id: i.id,
                    name: i.name,
                })
                .collect(),
        }
    }
}

fn check_name(field: &'static str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError {
            field,
            message: "may not be blank".into(),
        });
    } else if value.chars().count() > NAME_LIMIT {
        errors.push(FieldError {
            field,
            message: format!("may not be longer than {NAME_LIMIT} characters"),
        });
    }
}

struct FullRecipe {
    name: String,
    description: String,
    ingredients: Vec<String>,
}

/// Validation for create and full replace: name and description must be
/// present and a recipe needs at least one ingredient.
fn validate_full(payload: RecipePayload) -> Result<FullRecipe> {
    let mut errors = Vec::new();
    match &payload.name {
        Some(value) => check_name("name", value, &mut errors),
        None => errors.push(FieldError::required("name")),
    }
    if payload.description.is_none() {
        errors.push(FieldError::required("description"));
    }

    let ingredients: Vec<String> = payload
        .ingredients
        .unwrap_or_default()
        .into_iter()
        .map(|i| i.name)
        .collect();
    if ingredients.is_empty() {
        errors.push(FieldError {
            field: "ingredients",
            message: "a recipe needs at least one ingredient".into(),
        });
    }
    for name in &ingredients {
        check_name("ingredients", name, &mut errors);
    }

    match (payload.name, payload.description) {
        (Some(name), Some(description)) if errors.is_empty() => Ok(FullRecipe {
            name,
            description,
            ingredients,
        }),
        _ => Err(Error::Invalid(errors)),
    }
}

fn validate_partial(payload: &RecipePayload) -> Result<()> {
    let mut errors = Vec::new();
    if let Some(value) = &payload.name {
        check_name("name", value, &mut errors);
    }
    if let Some(list) = &payload.ingredients {
        for ingredient in list {
            check_name("ingredients", &ingredient.name, &mut errors);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Invalid(errors))
    }
}

pub fn list_recipes(
    conn: &mut database::Connection,
    filter: ListFilter,
) -> Result<Vec<RecipeResponse>> {
    use database::schema::recipes::dsl::*;
    use diesel::expression_methods::TextExpressionMethods as _;

    let mut query = recipes
        .select(Recipe::as_select())
        .order(id.asc())
        .into_boxed();
    if let Some(substring) = &filter.name {
        query = query.filter(name.like(format!("%{substring}%")));
    }
    let found: Vec<Recipe> = query.load(conn)?;

    let owned: Vec<Ingredient> = Ingredient::belonging_to(&found)
        .select(Ingredient::as_select())
        .order(database::schema::ingredients::id.asc())
        .load(conn)?;

    Ok(owned
        .grouped_by(&found)
        .into_iter()
        .zip(found)
        .map(|(children, recipe)| RecipeResponse::new(recipe, children))
        .collect())
}

pub fn create_recipe(
    conn: &mut database::Connection,
    payload: RecipePayload,
) -> Result<RecipeResponse> {
    let full = validate_full(payload)?;
    conn.transaction(|conn| {
        let recipe = insert_recipe(conn, &full)?;
        let created = replace_ingredients(conn, recipe.id, &full.ingredients)?;
        Ok(RecipeResponse::new(recipe, created))
    })
}

pub fn get_recipe(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<RecipeResponse> {
    let recipe = find_recipe(conn, recipe_id)?;
    let owned = ingredients_for(conn, recipe_id)?;
    Ok(RecipeResponse::new(recipe, owned))
}

/// Full replace. Scalar fields are updated first and then the ingredient
/// set is deleted and recreated, all in one transaction.
pub fn replace_recipe(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
    payload: RecipePayload,
) -> Result<RecipeResponse> {
    let full = validate_full(payload)?;
    conn.transaction(|conn| {
        let recipe = update_fields(
            conn,
            recipe_id,
            Some(&full.name),
            Some(&full.description),
        )?;
        let created = replace_ingredients(conn, recipe_id, &full.ingredients)?;
        Ok(RecipeResponse::new(recipe, created))
    })
}

/// Partial update. Only fields present in the payload are touched; the
/// ingredient set is replaced only when one is supplied, and an explicit
/// empty list clears it.
pub fn update_recipe(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
    payload: RecipePayload,
) -> Result<RecipeResponse> {
    validate_partial(&payload)?;
    conn.transaction(|conn| {
        let mut recipe = find_recipe(conn, recipe_id)?;
        if payload.name.is_some() || payload.description.is_some() {
            recipe = update_fields(
                conn,
                recipe_id,
                payload.name.as_deref(),
                payload.description.as_deref(),
            )?;
        }
        let owned = match payload.ingredients {
            Some(list) => {
                let names: Vec<String> = list.into_iter().map(|i| i.name).collect();
                replace_ingredients(conn, recipe_id, &names)?
            }
            None => ingredients_for(conn, recipe_id)?,
        };
        Ok(RecipeResponse::new(recipe, owned))
    })
}

pub fn delete_recipe(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<()> {
    use database::schema::recipes::dsl::*;
    use diesel::delete;

    // ON DELETE CASCADE takes the ingredients with it
    let deleted = delete(recipes.filter(id.eq(recipe_id))).execute(conn)?;
    if deleted == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

fn find_recipe(conn: &mut database::Connection, lookup: RecipeId) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .select(Recipe::as_select())
        .filter(id.eq(lookup))
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound)
}

fn ingredients_for(conn: &mut database::Connection, owner: RecipeId) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .filter(recipe_id.eq(owner))
        .order(id.asc())
        .load(conn)?)
}

fn insert_recipe(conn: &mut database::Connection, full: &FullRecipe) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;
    use diesel::insert_into;

    Ok(insert_into(recipes)
        .values((name.eq(full.name.as_str()), description.eq(full.description.as_str())))
        .returning(Recipe::as_returning())
        .get_result(conn)?)
}

fn update_fields(
    conn: &mut database::Connection,
    target: RecipeId,
    new_name: Option<&str>,
    new_description: Option<&str>,
) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;
    use diesel::update;

    update(recipes.filter(id.eq(target)))
        .set((
            new_name.map(|v| name.eq(v.to_owned())),
            new_description.map(|v| description.eq(v.to_owned())),
        ))
        .returning(Recipe::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or(Error::NotFound)
}

fn replace_ingredients(
    conn: &mut database::Connection,
    owner: RecipeId,
    names: &[String],
) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use diesel::{delete, insert_into};

    delete(ingredients.filter(recipe_id.eq(owner))).execute(conn)?;
    let mut created = Vec::with_capacity(names.len());
    for ingredient_name in names {
        created.push(
            insert_into(ingredients)
                .values((name.eq(ingredient_name.as_str()), recipe_id.eq(owner)))
                .returning(Ingredient::as_returning())
                .get_result(conn)?,
        );
    }
    Ok(created)
}
