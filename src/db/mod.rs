//! SQLite database layer for api-tester
//!
//! Request history, environments and collections. Structured values are stored as
//! JSON text next to the columns used for ordering and lookup.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::AppPaths;
use crate::models::{
    now_timestamp, ApiRequest, ApiResponse, Environment, HistoryEntry, HistoryFilter,
    RequestCollection,
};

/// Maximum number of history entries kept
pub const HISTORY_LIMIT: usize = 1000;

/// Database wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open an existing database
    pub fn open(paths: &AppPaths) -> Result<Self> {
        let conn =
            Connection::open(&paths.db_file).context("Failed to open api-tester database")?;
        Ok(Self { conn })
    }

    /// Initialize a new database with schema
    pub fn init(paths: &AppPaths) -> Result<Self> {
        let conn =
            Connection::open(&paths.db_file).context("Failed to create api-tester database")?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory database with schema, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::create_schema(&conn)?;
        Ok(Self { conn })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp     REAL NOT NULL,
                method        TEXT NOT NULL,
                url           TEXT NOT NULL,
                status_code   INTEGER NOT NULL,
                request       TEXT NOT NULL,
                response      TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create history table")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS environments (
                name          TEXT PRIMARY KEY,
                data          TEXT NOT NULL,
                is_active     INTEGER NOT NULL DEFAULT 0,
                created_at    REAL NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create environments table")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                data          TEXT NOT NULL,
                modified_at   REAL NOT NULL,
                created_at    REAL NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create collections table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_collections_name ON collections(name)",
            [],
        )?;

        Ok(())
    }

    // --- History -----------------------------------------------------------

    /// Record a request/response pair as the newest history entry
    pub fn save_to_history(&self, request: &ApiRequest, response: &ApiResponse) -> Result<i64> {
        let entry = HistoryEntry {
            id: 0,
            request: request.clone(),
            response: response.clone(),
            timestamp: now_timestamp(),
        };
        let id = self.insert_history_entry(&entry)?;
        self.trim_history()?;
        tracing::debug!(id, url = %request.url, "Saved history entry");
        Ok(id)
    }

    /// Insert an entry keeping its own timestamp
    pub fn insert_history_entry(&self, entry: &HistoryEntry) -> Result<i64> {
        let request_json =
            serde_json::to_string(&entry.request).context("Failed to serialize request")?;
        let response_json =
            serde_json::to_string(&entry.response).context("Failed to serialize response")?;

        self.conn
            .execute(
                r#"
                INSERT INTO history (timestamp, method, url, status_code, request, response)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    entry.timestamp,
                    entry.request.method.to_string(),
                    entry.request.url,
                    entry.response.status_code,
                    request_json,
                    response_json
                ],
            )
            .context("Failed to insert history entry")?;

        Ok(self.conn.last_insert_rowid())
    }

    fn trim_history(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                r#"
                DELETE FROM history WHERE id NOT IN (
                    SELECT id FROM history ORDER BY timestamp DESC, id DESC LIMIT ?1
                )
                "#,
                params![HISTORY_LIMIT as i64],
            )
            .context("Failed to trim history")?;
        Ok(removed)
    }

    /// Most recent entries first
    pub fn get_history(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, request, response, timestamp FROM history
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], raw_history_row)?;

        let mut entries = Vec::new();
        for row in rows {
            if let Some(entry) = decode_history_row(row?) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// History entries matching a filter, most recent first
    pub fn search_history(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>> {
        let mut matches: Vec<HistoryEntry> = self
            .get_history(HISTORY_LIMIT)?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect();
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    pub fn get_history_item(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, request, response, timestamp FROM history WHERE id = ?1",
                params![id],
                raw_history_row,
            )
            .optional()?;
        Ok(raw.and_then(decode_history_row))
    }

    pub fn delete_history_item(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM history WHERE id = ?1", params![id])
            .context("Failed to delete history entry")?;
        Ok(removed > 0)
    }

    /// Remove all history; returns the number of entries removed
    pub fn clear_history(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM history", [])
            .context("Failed to clear history")?;
        Ok(removed)
    }

    /// Replace the whole history with `entries` (kept in the order given, newest first)
    pub fn replace_history(&self, entries: &[HistoryEntry]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.clear_history()?;
        for entry in entries.iter().take(HISTORY_LIMIT) {
            self.insert_history_entry(entry)?;
        }
        tx.commit().context("Failed to commit history replacement")?;
        Ok(())
    }

    // --- Environments ------------------------------------------------------

    /// Insert or update an environment by name
    pub fn save_environment(&self, environment: &Environment) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.write_environment(environment)?;
        tx.commit().context("Failed to commit environment")?;
        Ok(())
    }

    fn write_environment(&self, environment: &Environment) -> Result<()> {
        let data_json =
            serde_json::to_string(environment).context("Failed to serialize environment")?;

        if environment.is_active {
            self.conn
                .execute("UPDATE environments SET is_active = 0", [])
                .context("Failed to deactivate environments")?;
        }

        self.conn
            .execute(
                r#"
                INSERT INTO environments (name, data, is_active, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(name) DO UPDATE SET data = ?2, is_active = ?3
                "#,
                params![
                    environment.name,
                    data_json,
                    environment.is_active,
                    environment.created_at
                ],
            )
            .context("Failed to save environment")?;
        Ok(())
    }

    pub fn get_environments(&self) -> Result<Vec<Environment>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, data, is_active FROM environments ORDER BY created_at, name",
        )?;
        let rows = stmt.query_map([], raw_environment_row)?;

        let mut environments = Vec::new();
        for row in rows {
            if let Some(env) = decode_environment_row(row?) {
                environments.push(env);
            }
        }
        Ok(environments)
    }

    pub fn get_environment(&self, name: &str) -> Result<Option<Environment>> {
        let raw = self
            .conn
            .query_row(
                "SELECT name, data, is_active FROM environments WHERE name = ?1",
                params![name],
                raw_environment_row,
            )
            .optional()?;
        Ok(raw.and_then(decode_environment_row))
    }

    pub fn delete_environment(&self, name: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM environments WHERE name = ?1", params![name])
            .context("Failed to delete environment")?;
        Ok(removed > 0)
    }

    pub fn get_active_environment(&self) -> Result<Option<Environment>> {
        let raw = self
            .conn
            .query_row(
                "SELECT name, data, is_active FROM environments WHERE is_active = 1 LIMIT 1",
                [],
                raw_environment_row,
            )
            .optional()?;
        Ok(raw.and_then(decode_environment_row))
    }

    /// Make `name` the only active environment; unknown names change nothing
    pub fn set_active_environment(&self, name: &str) -> Result<bool> {
        if self.get_environment(name)?.is_none() {
            return Ok(false);
        }
        let tx = self.conn.unchecked_transaction()?;
        self.conn
            .execute("UPDATE environments SET is_active = 0", [])
            .context("Failed to deactivate environments")?;
        self.conn
            .execute(
                "UPDATE environments SET is_active = 1 WHERE name = ?1",
                params![name],
            )
            .context("Failed to activate environment")?;
        tx.commit().context("Failed to commit active environment")?;
        Ok(true)
    }

    /// Deactivate every environment
    pub fn clear_active_environment(&self) -> Result<()> {
        self.conn
            .execute("UPDATE environments SET is_active = 0", [])
            .context("Failed to deactivate environments")?;
        Ok(())
    }

    // --- Collections -------------------------------------------------------

    pub fn insert_collection(&self, collection: &RequestCollection) -> Result<()> {
        let data_json =
            serde_json::to_string(collection).context("Failed to serialize collection")?;
        self.conn
            .execute(
                r#"
                INSERT INTO collections (id, name, data, modified_at, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    collection.id,
                    collection.name,
                    data_json,
                    collection.modified_at,
                    collection.created_at
                ],
            )
            .context("Failed to insert collection")?;
        Ok(())
    }

    pub fn update_collection(&self, collection: &RequestCollection) -> Result<()> {
        let data_json =
            serde_json::to_string(collection).context("Failed to serialize collection")?;
        self.conn
            .execute(
                r#"
                UPDATE collections
                SET name = ?2, data = ?3, modified_at = ?4
                WHERE id = ?1
                "#,
                params![
                    collection.id,
                    collection.name,
                    data_json,
                    collection.modified_at
                ],
            )
            .context("Failed to update collection")?;
        Ok(())
    }

    pub fn get_collection(&self, id: &str) -> Result<Option<RequestCollection>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM collections WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(
                serde_json::from_str(&data).context("Failed to parse collection data")?,
            )),
            None => Ok(None),
        }
    }

    /// All collections in creation order
    pub fn list_collections(&self) -> Result<Vec<RequestCollection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM collections ORDER BY created_at, name")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut collections = Vec::new();
        for row in rows {
            let (id, data) = row?;
            match serde_json::from_str(&data) {
                Ok(collection) => collections.push(collection),
                Err(e) => tracing::warn!(%id, error = %e, "Skipping unreadable collection"),
            }
        }
        Ok(collections)
    }

    pub fn delete_collection(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM collections WHERE id = ?1", params![id])
            .context("Failed to delete collection")?;
        Ok(removed > 0)
    }

    /// Replace all environments (used by non-merging imports)
    pub fn replace_environments(&self, environments: &[Environment]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute("DELETE FROM environments", [])?;
        for environment in environments {
            self.write_environment(environment)?;
        }
        tx.commit().context("Failed to commit environments")?;
        Ok(())
    }

    /// Replace all collections (used by non-merging imports)
    pub fn replace_collections(&self, collections: &[RequestCollection]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute("DELETE FROM collections", [])?;
        for collection in collections {
            self.insert_collection(collection)?;
        }
        tx.commit().context("Failed to commit collections")?;
        Ok(())
    }
}

type RawHistoryRow = (i64, String, String, f64);

fn raw_history_row(row: &Row<'_>) -> rusqlite::Result<RawHistoryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_history_row((id, request, response, timestamp): RawHistoryRow) -> Option<HistoryEntry> {
    let request = serde_json::from_str(&request);
    let response = serde_json::from_str(&response);
    match (request, response) {
        (Ok(request), Ok(response)) => Some(HistoryEntry {
            id,
            request,
            response,
            timestamp,
        }),
        _ => {
            tracing::warn!(id, "Skipping unreadable history entry");
            None
        }
    }
}

type RawEnvironmentRow = (String, String, bool);

fn raw_environment_row(row: &Row<'_>) -> rusqlite::Result<RawEnvironmentRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode_environment_row((name, data, is_active): RawEnvironmentRow) -> Option<Environment> {
    match serde_json::from_str::<Environment>(&data) {
        Ok(mut env) => {
            env.name = name;
            env.is_active = is_active;
            Some(env)
        }
        Err(e) => {
            tracing::warn!(%name, error = %e, "Skipping unreadable environment");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;

    fn response(status: u16) -> ApiResponse {
        ApiResponse {
            status_code: status,
            status_text: "OK".to_string(),
            ..ApiResponse::default()
        }
    }

    #[test]
    fn test_history_is_newest_first() {
        let db = Database::in_memory().unwrap();
        for i in 0..3 {
            let request = ApiRequest::new(HttpMethod::Get, format!("https://example.com/{}", i));
            db.save_to_history(&request, &response(200)).unwrap();
        }
        let history = db.get_history(10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].request.url, "https://example.com/2");
        assert_eq!(db.get_history(2).unwrap().len(), 2);
    }

    #[test]
    fn test_history_is_capped() {
        let db = Database::in_memory().unwrap();
        let request = ApiRequest::new(HttpMethod::Get, "https://example.com");
        for i in 0..(HISTORY_LIMIT + 5) {
            db.insert_history_entry(&HistoryEntry {
                id: 0,
                request: request.clone(),
                response: response(200),
                timestamp: i as f64,
            })
            .unwrap();
        }
        db.save_to_history(&request, &response(201)).unwrap();

        let history = db.get_history(HISTORY_LIMIT * 2).unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].response.status_code, 201);
        assert_eq!(history.last().unwrap().timestamp, 6.0);
    }

    #[test]
    fn test_delete_and_clear_history() {
        let db = Database::in_memory().unwrap();
        let request = ApiRequest::new(HttpMethod::Get, "https://example.com");
        let id = db.save_to_history(&request, &response(200)).unwrap();
        db.save_to_history(&request, &response(200)).unwrap();

        assert!(db.get_history_item(id).unwrap().is_some());
        assert!(db.delete_history_item(id).unwrap());
        assert!(!db.delete_history_item(id).unwrap());
        assert_eq!(db.clear_history().unwrap(), 1);
        assert!(db.get_history(10).unwrap().is_empty());
    }

    #[test]
    fn test_only_one_active_environment() {
        let db = Database::in_memory().unwrap();
        db.save_environment(&Environment::new("dev")).unwrap();
        db.save_environment(&Environment::new("prod")).unwrap();

        assert!(db.set_active_environment("dev").unwrap());
        assert!(db.set_active_environment("prod").unwrap());
        assert!(!db.set_active_environment("missing").unwrap());

        let active: Vec<_> = db
            .get_environments()
            .unwrap()
            .into_iter()
            .filter(|e| e.is_active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "prod");
        assert_eq!(db.get_active_environment().unwrap().unwrap().name, "prod");
    }

    #[test]
    fn test_save_environment_upserts() {
        let db = Database::in_memory().unwrap();
        let mut env = Environment::new("dev");
        db.save_environment(&env).unwrap();
        env.add_variable("host", "localhost", "");
        db.save_environment(&env).unwrap();

        let envs = db.get_environments().unwrap();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs[0].variables.len(), 1);
        assert!(db.delete_environment("dev").unwrap());
        assert!(!db.delete_environment("dev").unwrap());
    }

    #[test]
    fn test_collection_roundtrip_through_table() {
        let db = Database::in_memory().unwrap();
        let mut collection = RequestCollection::new("Demo", "");
        db.insert_collection(&collection).unwrap();

        collection.add_folder("auth", None, "");
        collection.name = "Demo API".to_string();
        db.update_collection(&collection).unwrap();

        let loaded = db.get_collection(&collection.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Demo API");
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(db.list_collections().unwrap().len(), 1);
        assert!(db.delete_collection(&collection.id).unwrap());
        assert!(db.get_collection(&collection.id).unwrap().is_none());
    }
}
