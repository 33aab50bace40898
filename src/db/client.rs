// Copyright 2025 Cadence Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Database client for the embedded SurrealDB store.
//!
//! Every store in the backend (campaigns, events, workflows, the orphan
//! queue) receives an `Arc<DBClient>` as a constructor dependency; nothing
//! reaches for a process-wide handle.

use anyhow::Result;
use surrealdb::{
    engine::local::{Db, RocksDb},
    Surreal,
};
use tracing::{debug, error, info, instrument};

/// Database client for SurrealDB embedded operations.
pub struct DBClient {
    pub db: Surreal<Db>,
}

impl DBClient {
    /// Creates a new database client and connects to the specified path.
    #[instrument(name = "db_client_new", skip_all, fields(db_path = %path))]
    pub async fn new(path: &str) -> Result<Self> {
        info!("Initializing SurrealDB connection");

        let db = Surreal::new::<RocksDb>(path).await.map_err(|e| {
            error!(error = %e, "Failed to connect to SurrealDB");
            e
        })?;

        db.use_ns("cadence").use_db("core").await.map_err(|e| {
            error!(error = %e, "Failed to select namespace/database");
            e
        })?;

        info!("SurrealDB connection established");
        Ok(Self { db })
    }

    /// Initializes the database schema.
    #[instrument(name = "db_initialize_schema", skip(self))]
    pub async fn initialize_schema(&self) -> Result<()> {
        use super::schema::SCHEMA_SQL;

        info!("Initializing database schema");

        self.db.query(SCHEMA_SQL).await.map_err(|e| {
            error!(error = %e, "Failed to initialize schema");
            e
        })?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Executes a query and deserializes the first result set.
    #[instrument(name = "db_query", skip(self), fields(query_len = query.len()))]
    pub async fn query<T>(&self, query: &str) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing query");

        let mut result = self.db.query(query).await.map_err(|e| {
            error!(error = %e, "Query execution failed");
            e
        })?;

        let data: Vec<T> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to deserialize query results");
            e
        })?;

        debug!(result_count = data.len(), "Query completed");
        Ok(data)
    }

    /// Executes a query and returns the first result set as raw JSON values.
    ///
    /// Use this when a custom deserializer (Thing ids, flattened counters)
    /// should run through `serde_json` instead of the SDK's own serializer.
    #[instrument(name = "db_query_json", skip(self), fields(query_len = query.len()))]
    pub async fn query_json(&self, query: &str) -> Result<Vec<serde_json::Value>> {
        let mut result = self.db.query(query).await.map_err(|e| {
            error!(error = %e, "Query execution failed");
            e
        })?;

        let data: Vec<serde_json::Value> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to extract query results");
            e
        })?;

        debug!(result_count = data.len(), "Query completed");
        Ok(data)
    }

    /// Executes a parameterized query and returns raw JSON values.
    #[instrument(name = "db_query_json_with_params", skip(self, params), fields(query_len = query.len()))]
    pub async fn query_json_with_params(
        &self,
        query: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<Vec<serde_json::Value>> {
        let mut query_builder = self.db.query(query);
        for (name, value) in params {
            query_builder = query_builder.bind((name, value));
        }

        let mut result = query_builder.await.map_err(|e| {
            error!(error = %e, "Parameterized query execution failed");
            e
        })?;

        let data: Vec<serde_json::Value> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to extract parameterized query results");
            e
        })?;

        debug!(result_count = data.len(), "Parameterized query completed");
        Ok(data)
    }

    /// Executes a mutation without returning results.
    #[instrument(name = "db_execute", skip(self), fields(query_len = query.len()))]
    pub async fn execute(&self, query: &str) -> Result<()> {
        debug!(query_preview = %query.chars().take(100).collect::<String>(), "Executing mutation");

        self.db.query(query).await.map_err(|e| {
            error!(error = %e, "Query execution failed");
            e
        })?;

        Ok(())
    }

    /// Executes a parameterized mutation without returning results.
    #[instrument(name = "db_execute_with_params", skip(self, params), fields(query_len = query.len()))]
    pub async fn execute_with_params(
        &self,
        query: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        let mut query_builder = self.db.query(query);
        for (name, value) in params {
            query_builder = query_builder.bind((name, value));
        }

        query_builder.await.map_err(|e| {
            error!(error = %e, "Parameterized mutation execution failed");
            e
        })?;

        Ok(())
    }

    /// Creates a record with an explicit id, failing if the id already exists.
    ///
    /// The data must not contain an `id` field (the record id is set via the
    /// `table:id` form). `RETURN meta::id(id)` sidesteps the SDK's Thing
    /// serialization. SurrealDB ASSERT constraints can silently reject a
    /// record, so creation is verified by examining the result.
    #[instrument(name = "db_create", skip(self, data), fields(table = %table, record_id = %id))]
    pub async fn create<T>(&self, table: &str, id: &str, data: T) -> Result<String>
    where
        T: serde::Serialize + Send + Sync + 'static,
    {
        let json_data = serde_json::to_value(&data).map_err(|e| {
            error!(error = %e, "Failed to serialize record data");
            anyhow::anyhow!("Serialization error: {}", e)
        })?;

        let query = format!(
            "CREATE {}:`{}` CONTENT $data RETURN meta::id(id) AS created_id",
            table, id
        );
        let response = self
            .db
            .query(&query)
            .bind(("data", json_data))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create record");
                e
            })?;

        // check() surfaces statement-level failures (duplicate record id,
        // ASSERT violations) that a successful round trip can still carry.
        let mut result = response.check().map_err(|e| {
            debug!(error = %e, "Create statement failed");
            e
        })?;

        let created: Option<serde_json::Value> = result.take(0).map_err(|e| {
            error!(error = %e, "Failed to read create result");
            anyhow::anyhow!("Failed to read create result: {}", e)
        })?;

        match created {
            Some(_) => {
                debug!(record_id = %id, "Record created");
                Ok(id.to_string())
            }
            None => {
                error!(
                    table = %table,
                    record_id = %id,
                    "Record was NOT created - possible ASSERT constraint violation"
                );
                Err(anyhow::anyhow!(
                    "Failed to create record in {}: record was silently rejected (check ASSERT constraints)",
                    table
                ))
            }
        }
    }

    /// Deletes a record by `table:id`.
    #[instrument(name = "db_delete", skip(self), fields(record_id = %id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let (table, record) = id.split_once(':').ok_or_else(|| {
            let msg = format!("Invalid record ID format '{}', expected 'table:id'", id);
            error!("{}", msg);
            anyhow::anyhow!(msg)
        })?;

        let query = format!("DELETE {}:`{}`", table, record);
        self.db.query(&query).await.map_err(|e| {
            error!(error = %e, "Failed to delete record");
            e
        })?;

        debug!("Record deleted");
        Ok(())
    }

    /// Executes a multi-statement SurrealQL script as one atomic transaction.
    ///
    /// The script must carry its own `BEGIN TRANSACTION` / `COMMIT
    /// TRANSACTION` statements and is sent in a single round trip, so either
    /// every statement commits or none does. A statement failure (including
    /// a `CREATE` on an existing record id) surfaces as an error after the
    /// engine cancels the transaction.
    #[instrument(name = "db_transaction", skip(self, script, params), fields(script_len = script.len()))]
    pub async fn transaction(
        &self,
        script: &str,
        params: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        let mut query_builder = self.db.query(script);
        for (name, value) in params {
            query_builder = query_builder.bind((name, value));
        }

        let response = query_builder.await.map_err(|e| {
            debug!(error = %e, "Transaction script rejected");
            e
        })?;

        // A failed statement cancels the whole transaction; check()
        // surfaces the statement error the engine recorded.
        response.check().map_err(|e| {
            debug!(error = %e, "Transaction statement failed");
            e
        })?;

        debug!("Transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_db_client_new() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test_db");

        let result = DBClient::new(db_path.to_str().unwrap()).await;
        assert!(result.is_ok(), "DBClient creation should succeed");
    }

    #[tokio::test]
    async fn test_db_client_invalid_path() {
        let result = DBClient::new("/nonexistent/path/that/cannot/be/created/db").await;
        assert!(result.is_err(), "Should fail with invalid path");
    }

    #[tokio::test]
    async fn test_db_initialize_schema() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("schema_test_db");

        let db = DBClient::new(db_path.to_str().unwrap())
            .await
            .expect("DB creation failed");
        let result = db.initialize_schema().await;
        assert!(result.is_ok(), "Schema initialization should succeed");
    }

    #[tokio::test]
    async fn test_create_duplicate_id_fails() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("dup_test_db");

        let db = DBClient::new(db_path.to_str().unwrap())
            .await
            .expect("DB creation failed");

        let first = db
            .create("sample", "id_1", serde_json::json!({"value": 1}))
            .await;
        assert!(first.is_ok(), "First create should succeed");

        let second = db
            .create("sample", "id_1", serde_json::json!({"value": 2}))
            .await;
        assert!(second.is_err(), "Create on an existing id should fail");
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_statement_error() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("tx_test_db");

        let db = DBClient::new(db_path.to_str().unwrap())
            .await
            .expect("DB creation failed");

        db.create("sample", "existing", serde_json::json!({"value": 1}))
            .await
            .expect("Seed create failed");

        // Second statement hits the existing id; the first must not commit.
        let script = r#"
            BEGIN TRANSACTION;
            CREATE sample:`fresh` CONTENT { value: 2 };
            CREATE sample:`existing` CONTENT { value: 3 };
            COMMIT TRANSACTION;
        "#;
        let result = db.transaction(script, vec![]).await;
        assert!(result.is_err(), "Transaction should fail on duplicate id");

        let rows = db
            .query_json("SELECT meta::id(id) AS id FROM sample:`fresh`")
            .await
            .expect("Query failed");
        assert!(rows.is_empty(), "Rolled-back create must not be visible");
    }
}
