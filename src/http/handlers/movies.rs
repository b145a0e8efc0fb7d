//! Movie CRUD handlers.
//!
//! Updates go through the store's conditional-update path; an edit conflict
//! comes back as a 409 and is never retried here.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::data::movies::{sort_safelist, Filters, Movie};
use crate::http::errors::{validation, ApiError};
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMovieInput {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateMovieInput>,
) -> Result<Response, ApiError> {
    let mut movie = Movie {
        id: 0,
        created_at: Utc::now(),
        title: input.title,
        year: input.year,
        runtime: input.runtime,
        genres: input.genres,
        version: 0,
    };
    movie.validate().map_err(validation)?;

    state.stores.movies.insert(&mut movie).await?;

    let location = format!("/v1/movies/{}", movie.id);
    let mut response = (StatusCode::CREATED, Json(json!({ "movie": movie }))).into_response();
    response.headers_mut().insert(
        header::LOCATION,
        HeaderValue::try_from(location).map_err(|_| ApiError::Infrastructure)?,
    );
    Ok(response)
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let movie = state.stores.movies.get(id).await?;
    Ok(Json(json!({ "movie": movie })))
}

/// Partial update: absent fields keep their stored values.
#[derive(Debug, Deserialize)]
pub struct UpdateMovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateMovieInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut movie = state.stores.movies.get(id).await?;

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }
    movie.validate().map_err(validation)?;

    state.stores.movies.update(&mut movie).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.stores.movies.delete(id).await?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub title: Option<String>,
    /// Comma-separated genre list; a movie must carry all of them.
    pub genres: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let title = params.title.unwrap_or_default();
    let genres: Vec<String> = params
        .genres
        .map(|csv| {
            csv.split(',')
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let filters = Filters {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(20),
        sort: params.sort.unwrap_or_else(|| "id".to_string()),
        sort_safelist: sort_safelist(),
    };
    filters.validate().map_err(validation)?;

    let (movies, metadata) = state
        .stores
        .movies
        .get_all(&title, &genres, &filters)
        .await?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}
