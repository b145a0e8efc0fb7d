//! In-memory store implementations.
//!
//! One state table behind one mutex, shared by all four store traits. The
//! observable semantics match the Postgres implementations: conditional
//! updates compare-and-increment the version under the lock, deletion of a
//! missing id is a NotFound, and token resolution checks scope and expiry in
//! the same lookup. Used by the test suite and for dependency-free local
//! runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::data::movies::{Filters, Metadata, Movie, MovieStore};
use crate::data::permissions::{PermissionStore, Permissions};
use crate::data::tokens::{Token, TokenScope, TokenStore};
use crate::data::users::{User, UserStore};
use crate::data::StoreError;

#[derive(Default)]
struct State {
    movies: HashMap<i64, Movie>,
    next_movie_id: i64,
    users: HashMap<i64, User>,
    next_user_id: i64,
    tokens: Vec<StoredToken>,
    permissions: HashMap<i64, Vec<String>>,
}

struct StoredToken {
    hash: String,
    user_id: i64,
    expiry: chrono::DateTime<Utc>,
    scope: TokenScope,
}

pub struct MemStore {
    state: Mutex<State>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_movie_id: 1,
                next_user_id: 1,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mem store mutex poisoned")
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MovieStore for MemStore {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut state = self.lock();
        movie.id = state.next_movie_id;
        state.next_movie_id += 1;
        movie.created_at = Utc::now();
        movie.version = 1;
        state.movies.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        self.lock().movies.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut state = self.lock();
        // Compare-and-increment under the lock; a missing id and a moved
        // version are the same zero-rows signal.
        match state.movies.get_mut(&movie.id) {
            Some(stored) if stored.version == movie.version => {
                movie.version += 1;
                *stored = movie.clone();
                Ok(())
            }
            _ => Err(StoreError::EditConflict),
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        match self.lock().movies.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let state = self.lock();
        let title = title.to_lowercase();
        let mut matches: Vec<Movie> = state
            .movies
            .values()
            .filter(|m| title.is_empty() || m.title.to_lowercase().contains(&title))
            .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
            .cloned()
            .collect();

        let descending = filters.sort_direction() == "DESC";
        matches.sort_by(|a, b| {
            let ord = match filters.sort_column() {
                "title" => a.title.cmp(&b.title),
                "year" => a.year.cmp(&b.year),
                "runtime" => a.runtime.cmp(&b.runtime),
                _ => a.id.cmp(&b.id),
            };
            let ord = if descending { ord.reverse() } else { ord };
            ord.then(a.id.cmp(&b.id))
        });

        let total = matches.len() as i64;
        let page: Vec<Movie> = matches
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect();

        Ok((page, Metadata::calculate(total, filters.page, filters.page_size)))
    }
}

#[async_trait]
impl UserStore for MemStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        user.id = state.next_user_id;
        state.next_user_id += 1;
        user.created_at = Utc::now();
        user.version = 1;
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::DuplicateEmail);
        }
        match state.users.get_mut(&user.id) {
            Some(stored) if stored.version == user.version => {
                user.version += 1;
                *stored = user.clone();
                Ok(())
            }
            _ => Err(StoreError::EditConflict),
        }
    }

    async fn get_for_token(&self, scope: TokenScope, hash: &str) -> Result<User, StoreError> {
        let state = self.lock();
        let now = Utc::now();
        let token = state
            .tokens
            .iter()
            .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
            .ok_or(StoreError::NotFound)?;
        state
            .users
            .get(&token.user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl TokenStore for MemStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        self.lock().tokens.push(StoredToken {
            hash: token.hash.clone(),
            user_id: token.user_id,
            expiry: token.expiry,
            scope: token.scope,
        });
        Ok(())
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: i64,
    ) -> Result<(), StoreError> {
        self.lock()
            .tokens
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemStore {
    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError> {
        Ok(Permissions::new(
            self.lock()
                .permissions
                .get(&user_id)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut state = self.lock();
        let entry = state.permissions.entry(user_id).or_default();
        for code in codes {
            if !entry.iter().any(|c| c == code) {
                entry.push(code.to_string());
            }
        }
        Ok(())
    }
}
