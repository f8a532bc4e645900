use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use rusqlite::{params, Connection, ErrorCode};

use crate::foods::{FoodId, FoodIdentityStore, FoodKey};
use crate::retry::{retry, RetryPolicy};

/// Stores food identities in the **foods** table of an SQLite database.
///
/// The table carries a unique constraint on the natural key, so that concurrent writers (e.g.
/// several processes sharing one database file) can never create two ids for the same food.
/// As SQLite reports a busy or locked database if another writer holds the lock, each upsert
/// is retried a few times with a short linear backoff.
pub struct SqliteFoodStore {
    connection: Arc<Mutex<Connection>>,
    policy: RetryPolicy,
}

#[derive(Debug, thiserror::Error)]
enum UpsertError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("The database connection is poisoned!")]
    Poisoned,
    #[error("The blocking upsert task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl UpsertError {
    fn is_transient(&self) -> bool {
        match self {
            UpsertError::Sqlite(rusqlite::Error::SqliteFailure(error, _)) => matches!(
                error.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl SqliteFoodStore {
    /// Opens (or creates) the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let connection = Connection::open(path.as_ref()).with_context(|| {
            format!(
                "Failed to open the food database {}",
                path.as_ref().to_string_lossy()
            )
        })?;

        SqliteFoodStore::with_connection(connection)
    }

    /// Creates a store backed by a private in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let connection =
            Connection::open_in_memory().context("Failed to create an in-memory food database")?;

        SqliteFoodStore::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> anyhow::Result<Self> {
        // Contention is handled by our own retry policy rather than by SQLite's busy handler.
        connection
            .busy_timeout(Duration::ZERO)
            .context("Failed to configure the food database")?;
        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS foods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    station TEXT NOT NULL,
                    dining_hall TEXT NOT NULL,
                    meal TEXT NOT NULL,
                    UNIQUE(name, station, dining_hall, meal)
                );",
            )
            .context("Failed to create the foods table")?;

        Ok(SqliteFoodStore {
            connection: Arc::new(Mutex::new(connection)),
            policy: RetryPolicy::linear(3, Duration::from_millis(100)),
        })
    }

    /// Replaces the retry schedule used when the database is busy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the number of foods stored in the database.
    pub fn count(&self) -> anyhow::Result<usize> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("The database connection is poisoned!"))?;
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM foods", [], |row| row.get(0))?;

        Ok(count as usize)
    }
}

fn upsert_blocking(connection: &Mutex<Connection>, key: &FoodKey) -> Result<FoodId, UpsertError> {
    let connection = connection.lock().map_err(|_| UpsertError::Poisoned)?;

    let _ = connection.execute(
        "INSERT INTO foods (name, station, dining_hall, meal) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name, station, dining_hall, meal) DO NOTHING",
        params![key.name, key.station, key.hall, key.meal.as_str()],
    )?;

    let id = connection.query_row(
        "SELECT id FROM foods WHERE name = ?1 AND station = ?2 AND dining_hall = ?3 AND meal = ?4",
        params![key.name, key.station, key.hall, key.meal.as_str()],
        |row| row.get(0),
    )?;

    Ok(id)
}

#[async_trait::async_trait]
impl FoodIdentityStore for SqliteFoodStore {
    async fn upsert(&self, key: &FoodKey) -> anyhow::Result<FoodId> {
        let label = format!("Registering {}", key);

        retry(
            &self.policy,
            &label,
            || {
                let connection = self.connection.clone();
                let key = key.clone();
                async move {
                    match tokio::task::spawn_blocking(move || upsert_blocking(&connection, &key))
                        .await
                    {
                        Ok(result) => result,
                        Err(error) => Err(UpsertError::from(error)),
                    }
                }
            },
            UpsertError::is_transient,
        )
        .await
        .with_context(|| format!("Failed to register {}", key))
    }
}
