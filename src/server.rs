// Copyright 2023 Remi Bernotavicius

use crate::controller::{self, ListFilter, RecipePayload, RecipeResponse};
use crate::database;
use crate::database::models::RecipeId;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

pub fn create_router(pool: database::Pool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recipe", get(list_recipes).post(create_recipe))
        .route(
            "/recipe/:id",
            get(get_recipe)
                .put(replace_recipe)
                .patch(update_recipe)
                .delete(delete_recipe),
        )
        .with_state(pool)
}

async fn health_check() -> &'static str {
    "OK"
}

enum ApiError {
    Controller(controller::Error),
    Internal(String),
}

impl From<controller::Error> for ApiError {
    fn from(error: controller::Error) -> Self {
        Self::Controller(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Controller(controller::Error::Invalid(errors)) => {
                let fields: serde_json::Map<String, serde_json::Value> = errors
                    .into_iter()
                    .map(|e| (e.field.into(), e.message.into()))
                    .collect();
                let body = serde_json::json!({ "error": "invalid", "fields": fields });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Controller(controller::Error::NotFound) => {
                let body = serde_json::json!({
                    "error": "not_found",
                    "message": "no such recipe",
                });
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            Self::Controller(controller::Error::Database(e)) => internal_error(e.to_string()),
            Self::Internal(message) => internal_error(message),
        }
    }
}

fn internal_error(message: String) -> Response {
    log::error!("request failed: {message}");
    let body = serde_json::json!({
        "error": "internal",
        "message": "internal server error",
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Diesel is synchronous, so controller calls run on the blocking pool
/// with a connection checked out for the duration of the request.
async fn run_query<T, F>(pool: database::Pool, query: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut database::Connection) -> controller::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| ApiError::Internal(e.to_string()))?;
        query(&mut conn).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
}

async fn list_recipes(
    State(pool): State<database::Pool>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<Vec<RecipeResponse>>, ApiError> {
    let found = run_query(pool, move |conn| controller::list_recipes(conn, filter)).await?;
    Ok(Json(found))
}

async fn create_recipe(
    State(pool): State<database::Pool>,
    Json(payload): Json<RecipePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let recipe = run_query(pool, move |conn| controller::create_recipe(conn, payload)).await?;
    log::info!("created recipe {} ({})", recipe.id, recipe.name);
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(pool): State<database::Pool>,
    Path(id): Path<RecipeId>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = run_query(pool, move |conn| controller::get_recipe(conn, id)).await?;
    Ok(Json(recipe))
}

async fn replace_recipe(
    State(pool): State<database::Pool>,
    Path(id): Path<RecipeId>,
    Json(payload): Json<RecipePayload>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = run_query(pool, move |conn| {
        controller::replace_recipe(conn, id, payload)
    })
    .await?;
    log::info!("replaced recipe {id}");
    Ok(Json(recipe))
}

async fn update_recipe(
    State(pool): State<database::Pool>,
    Path(id): Path<RecipeId>,
    Json(payload): Json<RecipePayload>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = run_query(pool, move |conn| {
        controller::update_recipe(conn, id, payload)
    })
    .await?;
    log::info!("updated recipe {id}");
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(pool): State<database::Pool>,
    Path(id): Path<RecipeId>,
) -> Result<StatusCode, ApiError> {
    run_query(pool, move |conn| controller::delete_recipe(conn, id)).await?;
    log::info!("deleted recipe {id}");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt as _;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn pizza() -> Value {
        json!({
            "name": "Pizza",
            "description": "something about an oven",
            "ingredients": [{"name": "cheese"}, {"name": "no pineapple"}],
        })
    }

    async fn create(app: &Router, body: Value) -> Value {
        let (status, recipe) = send(app, Method::POST, "/recipe", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        recipe
    }

    #[tokio::test]
    async fn health_check() {
        let app = create_router(database::test_pool());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_recipe_with_ingredients() {
        let app = create_router(database::test_pool());
        let recipe = create(&app, pizza()).await;
        assert_eq!(recipe["name"], "Pizza");
        assert_eq!(recipe["ingredients"].as_array().unwrap().len(), 2);
        assert_eq!(recipe["ingredients"][0]["name"], "cheese");
    }

    #[tokio::test]
    async fn create_without_ingredients_is_rejected() {
        let app = create_router(database::test_pool());
        let (status, body) = send(
            &app,
            Method::POST,
            "/recipe",
            Some(json!({"name": "Pizza", "description": "something about an oven"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid");
        assert!(body["fields"]["ingredients"].is_string());
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_persisting() {
        let app = create_router(database::test_pool());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/recipe")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        let (_, listed) = send(&app, Method::GET, "/recipe", None).await;
        assert_eq!(listed.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn list_with_name_filter() {
        let app = create_router(database::test_pool());
        for name in ["A recipe name", "Another recipe", "What is this"] {
            create(
                &app,
                json!({
                    "name": name,
                    "description": "Some descriptive description",
                    "ingredients": [{"name": "salt"}],
                }),
            )
            .await;
        }

        let (status, listed) = send(&app, Method::GET, "/recipe?name=recip", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["A recipe name", "Another recipe"]);
    }

    #[tokio::test]
    async fn retrieve_by_id() {
        let app = create_router(database::test_pool());
        let recipe = create(&app, pizza()).await;
        let uri = format!("/recipe/{}", recipe["id"]);

        let (status, fetched) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Pizza");

        let (status, body) = send(&app, Method::GET, "/recipe/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn full_replace_swaps_the_ingredient_set() {
        let app = create_router(database::test_pool());
        let recipe = create(&app, pizza()).await;
        let uri = format!("/recipe/{}", recipe["id"]);

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({
                "name": "Pizza",
                "description": "oven stuff",
                "ingredients": [{"name": "dough"}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["description"], "oven stuff");

        let (_, fetched) = send(&app, Method::GET, &uri, None).await;
        let names: Vec<_> = fetched["ingredients"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["dough"]);
    }

    #[tokio::test]
    async fn put_without_valid_fields_is_rejected() {
        let app = create_router(database::test_pool());
        let recipe = create(&app, pizza()).await;
        let uri = format!("/recipe/{}", recipe["id"]);

        let (status, body) = send(&app, Method::PUT, &uri, Some(json!({"origins": "mars"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid");
    }

    #[tokio::test]
    async fn put_missing_recipe_is_not_found() {
        let app = create_router(database::test_pool());
        let (status, _) = send(&app, Method::PUT, "/recipe/999", Some(pizza())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_updates_only_supplied_fields() {
        let app = create_router(database::test_pool());
        let recipe = create(
            &app,
            json!({
                "name": "A recipe name",
                "description": "Some descriptive description",
                "ingredients": [{"name": "cheese"}],
            }),
        )
        .await;
        let uri = format!("/recipe/{}", recipe["id"]);

        let (status, updated) =
            send(&app, Method::PATCH, &uri, Some(json!({"name": "Pizza"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Pizza");
        assert_eq!(updated["description"], "Some descriptive description");
        assert_eq!(updated["ingredients"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_ingredients() {
        let pool = database::test_pool();
        let app = create_router(pool.clone());
        let recipe = create(&app, pizza()).await;
        let uri = format!("/recipe/{}", recipe["id"]);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let orphans: i64 = {
            use crate::database::schema::ingredients::dsl::*;
            use diesel::QueryDsl as _;
            use diesel::RunQueryDsl as _;

            ingredients
                .count()
                .get_result(&mut pool.get().unwrap())
                .unwrap()
        };
        assert_eq!(orphans, 0);
    }
}
