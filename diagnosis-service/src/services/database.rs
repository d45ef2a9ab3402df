//! Record storage for diagnosis-service.

use crate::models::{NewRecord, Record};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Append-only store of diagnosis records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append one record and return its id.
    async fn append(&self, record: &NewRecord) -> Result<i64, AppError>;

    async fn count(&self) -> Result<i64, AppError>;

    /// Most recent records first.
    async fn recent(&self, limit: i64) -> Result<Vec<Record>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// SQLite connection pool wrapper.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open the database at `database_url`, creating the file when missing.
    ///
    /// In-memory URLs get a single long-lived connection so every query sees
    /// the same database.
    #[instrument(skip(database_url), fields(service = "diagnosis-service"))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e))
            })?
            .create_if_missing(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .idle_timeout(Duration::from_secs(600))
        };

        info!(in_memory, max_connections, "Opening SQLite database");

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    #[instrument(skip(self, record), fields(status = %record.status))]
    async fn append(&self, record: &NewRecord) -> Result<i64, AppError> {
        let extracted = serde_json::to_string(&record.extracted_diseases).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to encode diseases: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO records (
                symptoms, history, vitals, language, diagnosis, confidence,
                drug_interaction_alert, dosage_recommendation, referral_advice,
                extracted_diseases, status, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.symptoms)
        .bind(&record.history)
        .bind(&record.vitals)
        .bind(&record.language)
        .bind(&record.diagnosis)
        .bind(record.confidence.map(i64::from))
        .bind(&record.drug_interaction_alert)
        .bind(&record.dosage_recommendation)
        .bind(&record.referral_advice)
        .bind(extracted)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert record: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to count records: {}", e))
            })?;
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn recent(&self, limit: i64) -> Result<Vec<Record>, AppError> {
        sqlx::query_as::<_, Record>(
            r#"
            SELECT id, symptoms, history, vitals, language, diagnosis, confidence,
                   drug_interaction_alert, dosage_recommendation, referral_advice,
                   extracted_diseases, status, created_at
            FROM records
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list records: {}", e)))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_store() -> SqliteRecordStore {
        let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
        store.run_migrations().await.unwrap();
        store
    }

    fn sample(symptoms: &str) -> NewRecord {
        NewRecord {
            symptoms: symptoms.to_string(),
            history: None,
            vitals: Some("38.2".into()),
            language: "en".into(),
            diagnosis: "Viral infection".into(),
            confidence: Some(70),
            drug_interaction_alert: None,
            dosage_recommendation: None,
            referral_advice: None,
            extracted_diseases: vec!["influenza".into()],
            status: "generated".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = memory_store().await;
        let first = store.append(&sample("fever")).await.unwrap();
        let second = store.append(&sample("cough")).await.unwrap();
        assert!(second > first);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recent_reads_back_all_columns() {
        let store = memory_store().await;
        store.append(&sample("fever")).await.unwrap();
        store.append(&sample("cough")).await.unwrap();

        let records = store.recent(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symptoms, "cough");
        assert_eq!(records[0].confidence, Some(70));
        assert_eq!(records[0].vitals.as_deref(), Some("38.2"));
        assert_eq!(records[0].extracted_disease_list(), vec!["influenza".to_string()]);
        assert_eq!(records[0].status, "generated");
    }

    #[tokio::test]
    async fn health_check_passes_on_open_pool() {
        let store = memory_store().await;
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn append_fails_without_schema() {
        let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
        let err = store.append(&sample("fever")).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
