//! SQLite-backed movie store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::{
    Collection, Movie, MovieColumn, MoviePatch, MovieQuery, MovieStore, ReplaceOutcome, RowSet,
    Selection, StoreError,
};

/// Schema version this build expects on disk.
pub const SCHEMA_VERSION: u32 = 5;

const INSERT_COLUMNS: &str = "movie_id, title, original_title, poster_path, overview, release_date, \
     global_rating, user_rating, trailer_path, trailer_thumbnail_path, backdrop_path, reviews";

/// SQLite-backed movie store.
pub struct SqliteMovieStore {
    conn: Mutex<Connection>,
}

impl SqliteMovieStore {
    /// Open (or create) a store file and migrate it to [`SCHEMA_VERSION`].
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        Self::open(path, SCHEMA_VERSION)
    }

    /// Open (or create) a store file and migrate it to `version`.
    pub fn open(path: &Path, version: u32) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, version)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, SCHEMA_VERSION)
    }

    fn with_connection(conn: Connection, version: u32) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate(version)?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Internal("store connection lock poisoned".to_string()))
    }

    fn create_tables(conn: &Connection) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    _id INTEGER PRIMARY KEY AUTOINCREMENT,
                    movie_id INTEGER NOT NULL UNIQUE,
                    title TEXT NOT NULL,
                    original_title TEXT NOT NULL,
                    poster_path TEXT NOT NULL,
                    overview TEXT NOT NULL,
                    release_date TEXT NOT NULL,
                    global_rating REAL NOT NULL,
                    user_rating REAL NOT NULL,
                    trailer_path TEXT,
                    trailer_thumbnail_path TEXT,
                    backdrop_path TEXT,
                    reviews TEXT
                );
                "#,
                table = collection.table_name()
            ))?;
        }
        Ok(())
    }

    fn drop_tables(conn: &Connection) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", collection.table_name()))?;
        }
        Ok(())
    }

    fn managed_table_count(conn: &Connection) -> Result<usize, StoreError> {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.table_name()).collect();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?1, ?2, ?3)",
            params![names[0], names[1], names[2]],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn read_version(conn: &Connection) -> Result<u32, StoreError> {
        let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    fn insert_row(conn: &Connection, table: &str, movie: &Movie) -> rusqlite::Result<i64> {
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                table, INSERT_COLUMNS
            ),
            params![
                movie.movie_id,
                movie.title,
                movie.original_title,
                movie.poster_path,
                movie.overview,
                movie.release_date,
                movie.global_rating,
                movie.user_rating,
                movie.trailer_path,
                movie.trailer_thumbnail_path,
                movie.backdrop_path,
                movie.reviews,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn is_constraint_violation(e: &rusqlite::Error) -> bool {
        matches!(
            e,
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
        )
    }

    fn build_where_clause(selection: &Option<Selection>) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        let clause = match selection {
            None => String::new(),
            Some(Selection::MovieId(id)) => {
                params.push(Box::new(*id));
                "WHERE movie_id = ?".to_string()
            }
            Some(Selection::TitleContains(text)) => {
                params.push(Box::new(format!("%{}%", escape_like(text))));
                "WHERE title LIKE ? ESCAPE '\\'".to_string()
            }
            Some(Selection::MinRating(min)) => {
                params.push(Box::new(*min));
                "WHERE global_rating >= ?".to_string()
            }
        };

        (clause, params)
    }

    /// Build a Movie from the projected columns, in order.
    fn row_to_movie(row: &Row, columns: &[MovieColumn]) -> rusqlite::Result<Movie> {
        let mut movie = Movie::default();
        for (idx, column) in columns.iter().enumerate() {
            match column {
                MovieColumn::MovieId => movie.movie_id = row.get(idx)?,
                MovieColumn::Title => movie.title = row.get(idx)?,
                MovieColumn::OriginalTitle => movie.original_title = row.get(idx)?,
                MovieColumn::PosterPath => movie.poster_path = row.get(idx)?,
                MovieColumn::Overview => movie.overview = row.get(idx)?,
                MovieColumn::ReleaseDate => movie.release_date = row.get(idx)?,
                MovieColumn::GlobalRating => movie.global_rating = row.get(idx)?,
                MovieColumn::UserRating => movie.user_rating = row.get(idx)?,
                MovieColumn::TrailerPath => movie.trailer_path = row.get(idx)?,
                MovieColumn::TrailerThumbnailPath => movie.trailer_thumbnail_path = row.get(idx)?,
                MovieColumn::BackdropPath => movie.backdrop_path = row.get(idx)?,
                MovieColumn::Reviews => movie.reviews = row.get(idx)?,
            }
        }
        Ok(movie)
    }
}

impl MovieStore for SqliteMovieStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        Self::create_tables(&conn)
    }

    fn migrate(&self, version: u32) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let on_disk = Self::read_version(&conn)?;

        if on_disk == version {
            Self::create_tables(&conn)?;
            return Ok(false);
        }

        let fresh = on_disk == 0 && Self::managed_table_count(&conn)? == 0;
        let tx = conn.transaction()?;
        if fresh {
            info!("Creating movie store schema version {}", version);
        } else {
            warn!(
                "Upgrading movie store from version {} to {}. Old data will be destroyed",
                on_disk, version
            );
            Self::drop_tables(&tx)?;
        }
        Self::create_tables(&tx)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;

        Ok(!fresh)
    }

    fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        Self::read_version(&conn)
    }

    fn query(&self, collection: Collection, query: &MovieQuery) -> Result<RowSet, StoreError> {
        let conn = self.conn()?;
        let columns = query.columns();
        let column_list = columns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let (where_clause, mut params) = Self::build_where_clause(&query.selection);

        let order_clause = match query.sort {
            Some(sort) => format!(
                "ORDER BY {} {}",
                sort.column.as_str(),
                if sort.descending { "DESC" } else { "ASC" }
            ),
            None => "ORDER BY _id ASC".to_string(),
        };

        let limit_clause = match query.limit {
            Some(limit) => {
                params.push(Box::new(limit as i64));
                "LIMIT ?".to_string()
            }
            None => String::new(),
        };

        let sql = format!(
            "SELECT {} FROM {} {} {} {}",
            column_list,
            collection.table_name(),
            where_clause,
            order_clause,
            limit_clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Self::row_to_movie(row, &columns)
        })?;

        let mut movies = Vec::new();
        for row in rows {
            movies.push(row?);
        }

        Ok(RowSet::new(columns, movies))
    }

    fn count(&self, collection: Collection) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get(&self, collection: Collection, movie_id: i64) -> Result<Option<Movie>, StoreError> {
        let conn = self.conn()?;
        let columns = MovieColumn::ALL;
        let column_list = columns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let movie = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE movie_id = ?",
                    column_list,
                    collection.table_name()
                ),
                params![movie_id],
                |row| Self::row_to_movie(row, &columns),
            )
            .optional()?;

        Ok(movie)
    }

    fn bulk_replace(
        &self,
        collection: Collection,
        rows: &[Movie],
    ) -> Result<ReplaceOutcome, StoreError> {
        let mut conn = self.conn()?;
        let table = collection.table_name();
        let tx = conn.transaction()?;

        let removed = tx.execute(&format!("DELETE FROM {}", table), [])?;

        let mut outcome = ReplaceOutcome::default();
        for movie in rows {
            match Self::insert_row(&tx, table, movie) {
                Ok(_) => outcome.inserted += 1,
                Err(e) if Self::is_constraint_violation(&e) => {
                    warn!(
                        "Skipping duplicate movie {} in {}: {}",
                        movie.movie_id, table, e
                    );
                    outcome.skipped += 1;
                }
                // Returning drops the transaction, which rolls back the delete.
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit()?;

        debug!(
            "Replaced {}: removed {}, inserted {}, skipped {}",
            table, removed, outcome.inserted, outcome.skipped
        );

        Ok(outcome)
    }

    fn insert_favorite(&self, movie: &Movie) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Self::insert_row(&conn, Collection::Favorites.table_name(), movie).map_err(|e| {
            if Self::is_constraint_violation(&e) {
                StoreError::Conflict {
                    collection: Collection::Favorites,
                    movie_id: movie.movie_id,
                }
            } else {
                e.into()
            }
        })
    }

    fn delete_favorite(&self, movie_id: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            &format!(
                "DELETE FROM {} WHERE movie_id = ?",
                Collection::Favorites.table_name()
            ),
            params![movie_id],
        )?;
        Ok(removed)
    }

    fn patch_by_id(
        &self,
        collection: Collection,
        movie_id: i64,
        patch: &MoviePatch,
    ) -> Result<usize, StoreError> {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut assignments = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref trailer) = patch.trailer_path {
            assignments.push("trailer_path = ?");
            params.push(Box::new(trailer.clone()));
        }
        if let Some(ref thumbnail) = patch.trailer_thumbnail_path {
            assignments.push("trailer_thumbnail_path = ?");
            params.push(Box::new(thumbnail.clone()));
        }
        if let Some(ref reviews) = patch.reviews {
            assignments.push("reviews = ?");
            params.push(Box::new(reviews.clone()));
        }
        params.push(Box::new(movie_id));

        let sql = format!(
            "UPDATE {} SET {} WHERE movie_id = ?",
            collection.table_name(),
            assignments.join(", ")
        );

        let conn = self.conn()?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let updated = conn.execute(&sql, param_refs.as_slice())?;
        Ok(updated)
    }
}

/// Escape `LIKE` wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
