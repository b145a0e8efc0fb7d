//! Movie records and the optimistic-locking store contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::data::StoreError;

/// A mutable catalog record. `version` starts at 1 on insert and is bumped by
/// exactly 1 on every successful update.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Movie {
    pub id: i64,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    /// Runtime in minutes.
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    /// Validate the record, collecting every field violation.
    pub fn validate(&self) -> Result<(), BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        let mut fail = |field: &str, message: &str| {
            errors
                .entry(field.to_string())
                .or_insert_with(|| message.to_string());
        };

        if self.title.is_empty() {
            fail("title", "must be provided");
        }
        if self.title.len() > 500 {
            fail("title", "must not be more than 500 bytes long");
        }

        if self.year == 0 {
            fail("year", "must be provided");
        } else if self.year < 1888 {
            fail("year", "must be greater than 1888");
        } else if self.year > Utc::now().year() {
            fail("year", "must not be in the future");
        }

        if self.runtime == 0 {
            fail("runtime", "must be provided");
        } else if self.runtime < 0 {
            fail("runtime", "must be a positive integer");
        }

        if self.genres.is_empty() {
            fail("genres", "must contain at least 1 genre");
        }
        if self.genres.len() > 5 {
            fail("genres", "must not contain more than 5 genres");
        }
        let mut seen = std::collections::HashSet::new();
        if !self.genres.iter().all(|g| seen.insert(g)) {
            fail("genres", "must not contain duplicate values");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Listing filters: pagination plus a safelisted sort key.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: Vec<&'static str>,
}

impl Filters {
    /// Validate pagination bounds and the sort key against the safelist.
    pub fn validate(&self) -> Result<(), BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();

        if self.page < 1 {
            errors.insert("page".into(), "must be greater than zero".into());
        } else if self.page > 10_000_000 {
            errors.insert("page".into(), "must be a maximum of 10 million".into());
        }
        if self.page_size < 1 {
            errors.insert("page_size".into(), "must be greater than zero".into());
        } else if self.page_size > 100 {
            errors.insert("page_size".into(), "must be a maximum of 100".into());
        }
        if !self.sort_safelist.contains(&self.sort.as_str()) {
            errors.insert("sort".into(), "invalid sort value".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The column to sort by. Only call after `validate`; the safelist check
    /// is what makes interpolating this into SQL safe.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') {
            "DESC"
        } else {
            "ASC"
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

/// Store contract for movies.
///
/// `update` is the concurrency guard: the implementation must match both id
/// and the caller's observed version in one atomic statement, incrementing
/// the version as part of the same write. Zero matched rows is an
/// [`StoreError::EditConflict`].
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Insert a new record; fills in id, created_at and version (1).
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError>;

    async fn get(&self, id: i64) -> Result<Movie, StoreError>;

    /// Conditional update keyed on (id, version); bumps `movie.version` on
    /// success. Never retried here: conflict resolution is the caller's call.
    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError>;

    /// Delete by id. Absence is [`StoreError::NotFound`], never a conflict.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError>;
}

/// The sort keys accepted by the listing endpoint.
pub fn sort_safelist() -> Vec<&'static str> {
    vec![
        "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_movie() -> Movie {
        Movie {
            id: 0,
            created_at: Utc::now(),
            title: "Casablanca".into(),
            year: 1942,
            runtime: 102,
            genres: vec!["drama".into(), "romance".into()],
            version: 0,
        }
    }

    #[test]
    fn valid_movie_passes() {
        assert!(valid_movie().validate().is_ok());
    }

    #[test]
    fn rejects_future_year_and_duplicate_genres() {
        let mut movie = valid_movie();
        movie.year = Utc::now().year() + 1;
        movie.genres = vec!["drama".into(), "drama".into()];

        let errors = movie.validate().unwrap_err();
        assert!(errors.contains_key("year"));
        assert_eq!(errors["genres"], "must not contain duplicate values");
    }

    #[test]
    fn filters_safelist_and_direction() {
        let mut filters = Filters {
            page: 1,
            page_size: 20,
            sort: "-year".into(),
            sort_safelist: sort_safelist(),
        };
        assert!(filters.validate().is_ok());
        assert_eq!(filters.sort_column(), "year");
        assert_eq!(filters.sort_direction(), "DESC");

        filters.sort = "password_hash".into();
        assert!(filters.validate().is_err());
    }

    #[test]
    fn metadata_calculation() {
        let meta = Metadata::calculate(101, 3, 20);
        assert_eq!(meta.last_page, 6);
        assert_eq!(meta.current_page, 3);

        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
    }
}
