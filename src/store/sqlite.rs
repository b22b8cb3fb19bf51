//! SQLite-backed [`DocumentStore`].
//!
//! Each collection is a table `(seq INTEGER PRIMARY KEY, body TEXT)` holding
//! one JSON document per row. Field lookups and indexes go through
//! `json_extract(body, '$.<field>')`. Tables are created lazily on first write.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::StoreError;

use super::{
    validate_collection, validate_field, Document, DocumentStore, DropOutcome, IndexOutcome,
    IndexSpec,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn table_exists(&self, collection: &str) -> Result<bool, StoreError> {
        validate_collection(collection)?;
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn ensure_table(&self, collection: &str) -> Result<(), StoreError> {
        validate_collection(collection)?;
        let sql = format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL
            )"#,
            collection
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

fn parse_bodies(bodies: Vec<String>) -> Result<Vec<Document>, StoreError> {
    bodies
        .iter()
        .map(|b| serde_json::from_str(b).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_many(&self, collection: &str, docs: &[Document]) -> Result<usize, StoreError> {
        self.ensure_table(collection).await?;
        let sql = format!(r#"INSERT INTO "{}" (body) VALUES (?)"#, collection);
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            let body = serde_json::to_string(doc)?;
            sqlx::query(&sql).bind(body).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(docs.len())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        if !self.table_exists(collection).await? {
            return Ok(Vec::new());
        }
        let sql = format!(r#"SELECT body FROM "{}" ORDER BY seq"#, collection);
        let bodies: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        parse_bodies(bodies)
    }

    async fn find_by(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, StoreError> {
        validate_field(field)?;
        if !self.table_exists(collection).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"SELECT body FROM "{}" WHERE json_extract(body, '$.{}') = ? ORDER BY seq"#,
            collection, field
        );
        let bodies: Vec<String> = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        parse_bodies(bodies)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        if !self.table_exists(collection).await? {
            return Ok(0);
        }
        let sql = format!(r#"SELECT COUNT(*) FROM "{}""#, collection);
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n as u64)
    }

    async fn update_one_upsert(
        &self,
        collection: &str,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        self.ensure_table(collection).await?;
        let body = serde_json::to_string(doc)?;
        let mut tx = self.pool.begin().await?;

        let update = format!(
            r#"UPDATE "{}" SET body = ? WHERE seq = (
                SELECT seq FROM "{}" WHERE json_extract(body, '$.id') = ? ORDER BY seq LIMIT 1
            )"#,
            collection, collection
        );
        let updated = sqlx::query(&update)
            .bind(&body)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if updated == 0 {
            let insert = format!(r#"INSERT INTO "{}" (body) VALUES (?)"#, collection);
            sqlx::query(&insert).bind(&body).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_many(&self, collection: &str) -> Result<u64, StoreError> {
        if !self.table_exists(collection).await? {
            return Ok(0);
        }
        let sql = format!(r#"DELETE FROM "{}""#, collection);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn drop_collection(&self, collection: &str) -> Result<DropOutcome, StoreError> {
        if !self.table_exists(collection).await? {
            return Ok(DropOutcome::Missing);
        }
        let sql = format!(r#"DROP TABLE IF EXISTS "{}""#, collection);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(DropOutcome::Dropped)
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<IndexOutcome, StoreError> {
        validate_field(&spec.field)?;
        self.ensure_table(&spec.collection).await?;

        let name = spec.name();
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'index' AND name = ?",
        )
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            return Ok(IndexOutcome::AlreadyExists);
        }

        let sql = format!(
            r#"CREATE {}INDEX "{}" ON "{}" (json_extract(body, '$.{}'))"#,
            if spec.unique { "UNIQUE " } else { "" },
            name,
            spec.collection,
            spec.field
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(IndexOutcome::Created)
    }
}
