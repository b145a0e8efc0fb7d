//! Postgres store implementations.
//!
//! Optimistic locking is expressed as a conditional UPDATE: the id match,
//! version match and version increment are one atomic statement, and a zero
//! row count is interpreted as an edit conflict.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::config::DbConfig;
use crate::data::movies::{Filters, Metadata, Movie, MovieStore};
use crate::data::permissions::{PermissionStore, Permissions};
use crate::data::tokens::{Token, TokenScope, TokenStore};
use crate::data::users::{User, UserStore};
use crate::data::{bounded, StoreError};

/// Open a connection pool and verify it with a ping.
pub async fn connect(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.dsn)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

pub struct PgMovieStore {
    pool: PgPool,
}

impl PgMovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let query = "
            INSERT INTO movies (title, year, runtime, genres)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version";

        let row = bounded(async {
            sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(&movie.genres)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        movie.id = row.try_get("id")?;
        movie.created_at = row.try_get("created_at")?;
        movie.version = row.try_get("version")?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        // ids are generated identities starting at 1; skip the round trip
        // for anything lower.
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let query = "
            SELECT id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE id = $1";

        bounded(async {
            sqlx::query_as::<_, Movie>(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let query = "
            UPDATE movies
            SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version";

        let row = bounded(async {
            sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime)
                .bind(&movie.genres)
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        match row {
            Some(row) => {
                movie.version = row.try_get("version")?;
                Ok(())
            }
            None => Err(StoreError::EditConflict),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let result = bounded(async {
            sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        // Sort column and direction come from the validated safelist, which
        // is what makes the interpolation safe.
        let query = format!(
            "SELECT count(*) OVER() AS total_records,
                    id, created_at, title, year, runtime, genres, version
             FROM movies
             WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
               AND (genres @> $2 OR $2 = '{{}}')
             ORDER BY {} {}, id ASC
             LIMIT $3 OFFSET $4",
            filters.sort_column(),
            filters.sort_direction(),
        );

        let rows = bounded(async {
            sqlx::query(&query)
                .bind(title)
                .bind(genres.to_vec())
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        let mut total_records = 0i64;
        let mut movies = Vec::with_capacity(rows.len());
        for row in rows {
            total_records = row.try_get("total_records")?;
            movies.push(Movie {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
                title: row.try_get("title")?,
                year: row.try_get("year")?,
                runtime: row.try_get("runtime")?,
                genres: row.try_get("genres")?,
                version: row.try_get("version")?,
            });
        }

        let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
        Ok((movies, metadata))
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_email(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.constraint() == Some("users_email_key") {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::from(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let query = "
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version";

        let row = bounded(async {
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .fetch_one(&self.pool)
                .await
                .map_err(map_unique_email)
        })
        .await?;

        user.id = row.try_get("id")?;
        user.created_at = row.try_get("created_at")?;
        user.version = row.try_get("version")?;
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let query = "
            SELECT id, created_at, name, email, password_hash, activated, version
            FROM users
            WHERE email = $1";

        bounded(async {
            sqlx::query_as::<_, User>(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let query = "
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4,
                version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version";

        let row = bounded(async {
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_unique_email)
        })
        .await?;

        match row {
            Some(row) => {
                user.version = row.try_get("version")?;
                Ok(())
            }
            None => Err(StoreError::EditConflict),
        }
    }

    async fn get_for_token(&self, scope: TokenScope, hash: &str) -> Result<User, StoreError> {
        // Scope and expiry are part of the lookup predicate, so a wrong-scope
        // or expired token is simply a miss.
        let query = "
            SELECT users.id, users.created_at, users.name, users.email,
                   users.password_hash, users.activated, users.version
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
              AND tokens.scope = $2
              AND tokens.expiry > now()";

        bounded(async {
            sqlx::query_as::<_, User>(query)
                .bind(hash)
                .bind(scope.as_str())
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }
}

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        let query = "
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)";

        bounded(async {
            sqlx::query(query)
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;
        Ok(())
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: i64,
    ) -> Result<(), StoreError> {
        bounded(async {
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;
        Ok(())
    }
}

pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionStore for PgPermissionStore {
    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let query = "
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions
                ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1";

        let rows = bounded(async {
            sqlx::query(query)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        let mut codes = Vec::with_capacity(rows.len());
        for row in rows {
            codes.push(row.try_get("code")?);
        }
        Ok(Permissions::new(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let query = "
            INSERT INTO users_permissions (user_id, permission_id)
            SELECT $1, permissions.id FROM permissions
            WHERE permissions.code = ANY($2)";
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

        bounded(async {
            sqlx::query(query)
                .bind(user_id)
                .bind(codes)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await?;
        Ok(())
    }
}
