//! The pooled database handle and its queries.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use smsgate_core::{ProviderId, Providers};

use crate::{
    ProviderHealthRecord, RequestStats, RequestStatus, SmsRequest, SmsResponse, SmsRetry,
    StorageError,
};

/// Samples required before the coarse summary flag is recomputed.
const SUMMARY_MIN_SAMPLES: i64 = 10;
/// Success rate at or above which the summary flag reads healthy.
const SUMMARY_SUCCESS_THRESHOLD: f64 = 0.8;

/// Filters for the request listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub provider: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Cloneable handle over the connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite://sms_service.db`.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// A private in-memory database; each call gets a fresh one.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// Create the schema if absent.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sms_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL,
                text TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                provider_used TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 5,
                failed_providers TEXT NOT NULL DEFAULT '',
                is_permanently_failed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sms_responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL REFERENCES sms_requests(id),
                response_data TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sms_retries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL REFERENCES sms_requests(id),
                attempt_number INTEGER NOT NULL,
                provider_used TEXT NOT NULL,
                error_message TEXT NOT NULL,
                delay_seconds INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS provider_health (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider_name TEXT NOT NULL UNIQUE,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_checked TEXT NOT NULL,
                is_healthy INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("database schema ready");
        Ok(())
    }

    /// Ensure one summary row per configured provider.
    pub async fn seed_providers(&self, providers: &Providers) -> Result<(), StorageError> {
        for id in providers.ids() {
            sqlx::query(
                "INSERT INTO provider_health (provider_name, last_checked) VALUES (?, ?)
                 ON CONFLICT(provider_name) DO NOTHING",
            )
            .bind(id.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Insert a new `pending` request row.
    pub async fn create_request(
        &self,
        phone: &str,
        text: &str,
        max_retries: u32,
    ) -> Result<SmsRequest, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sms_requests
             (phone, text, status, retry_count, max_retries, failed_providers,
              is_permanently_failed, created_at, updated_at)
             VALUES (?, ?, 'pending', 0, ?, '', 0, ?, ?)",
        )
        .bind(phone)
        .bind(text)
        .bind(i64::from(max_retries))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(request_id = id, "created sms request");
        self.get_request(id)
            .await?
            .ok_or(StorageError::RequestNotFound(id))
    }

    pub async fn get_request(&self, id: i64) -> Result<Option<SmsRequest>, StorageError> {
        let row = sqlx::query_as::<_, SmsRequest>("SELECT * FROM sms_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Move a request through its lifecycle, optionally recording the chosen
    /// provider. A `None` provider leaves the column untouched.
    pub async fn update_request_status(
        &self,
        id: i64,
        status: RequestStatus,
        provider: Option<&ProviderId>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE sms_requests
             SET status = ?, provider_used = COALESCE(?, provider_used), updated_at = ?
             WHERE id = ?",
        )
        .bind(status)
        .bind(provider.map(ProviderId::as_str))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::RequestNotFound(id));
        }
        Ok(())
    }

    /// Record retry bookkeeping on the request row: the new retry count, the
    /// accumulated failed providers, and the `retrying` status.
    pub async fn update_retry_state(
        &self,
        id: i64,
        retry_count: u32,
        failed_providers: &[ProviderId],
    ) -> Result<(), StorageError> {
        let joined = failed_providers
            .iter()
            .map(ProviderId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let result = sqlx::query(
            "UPDATE sms_requests
             SET status = 'retrying', retry_count = ?, failed_providers = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(i64::from(retry_count))
        .bind(joined)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::RequestNotFound(id));
        }
        Ok(())
    }

    /// Terminal failure: flip the status and flag, leaving the retry
    /// bookkeeping as the last retry wrote it.
    pub async fn mark_permanently_failed(&self, id: i64) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE sms_requests
             SET status = 'permanently_failed', is_permanently_failed = 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::RequestNotFound(id));
        }
        Ok(())
    }

    pub async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<SmsRequest>, StorageError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM sms_requests WHERE 1 = 1");
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(provider) = &filter.provider {
            builder.push(" AND provider_used = ").push_bind(provider.clone());
        }
        if let Some(start) = filter.start_time {
            builder.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end_time {
            builder.push(" AND created_at <= ").push_bind(end);
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100));

        let rows = builder
            .build_query_as::<SmsRequest>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Append one attempt's response (real or synthesized).
    pub async fn create_response(
        &self,
        request_id: i64,
        response_data: &str,
        status_code: u16,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO sms_responses (request_id, response_data, status_code, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(response_data)
        .bind(i64::from(status_code))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn responses_for(&self, request_id: i64) -> Result<Vec<SmsResponse>, StorageError> {
        let rows = sqlx::query_as::<_, SmsResponse>(
            "SELECT * FROM sms_responses WHERE request_id = ? ORDER BY id",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Append one scheduled retry.
    pub async fn record_retry(
        &self,
        request_id: i64,
        attempt_number: u32,
        provider: &ProviderId,
        error_message: &str,
        delay_seconds: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sms_retries
             (request_id, attempt_number, provider_used, error_message, delay_seconds, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(i64::from(attempt_number))
        .bind(provider.as_str())
        .bind(error_message)
        .bind(delay_seconds)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn retries_for(&self, request_id: i64) -> Result<Vec<SmsRetry>, StorageError> {
        let rows = sqlx::query_as::<_, SmsRetry>(
            "SELECT * FROM sms_retries WHERE request_id = ? ORDER BY attempt_number",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fold one terminal attempt into the provider summary. The coarse
    /// `is_healthy` flag only moves once the provider has 10+ samples, at an
    /// 80 % success threshold; until then it stays where it was.
    pub async fn record_provider_result(
        &self,
        provider: &ProviderId,
        success: bool,
    ) -> Result<ProviderHealthRecord, StorageError> {
        let now = Utc::now();
        let existing = self.provider_health(provider).await?;

        let (success_count, failure_count, mut is_healthy) = match &existing {
            Some(record) => (record.success_count, record.failure_count, record.is_healthy),
            None => (0, 0, true),
        };
        let (success_count, failure_count) = if success {
            (success_count + 1, failure_count)
        } else {
            (success_count, failure_count + 1)
        };

        let total = success_count + failure_count;
        if total >= SUMMARY_MIN_SAMPLES {
            let success_rate = success_count as f64 / total as f64;
            is_healthy = success_rate >= SUMMARY_SUCCESS_THRESHOLD;
        }

        sqlx::query(
            "INSERT INTO provider_health
             (provider_name, success_count, failure_count, last_checked, is_healthy)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(provider_name) DO UPDATE SET
                 success_count = excluded.success_count,
                 failure_count = excluded.failure_count,
                 last_checked = excluded.last_checked,
                 is_healthy = excluded.is_healthy",
        )
        .bind(provider.as_str())
        .bind(success_count)
        .bind(failure_count)
        .bind(now)
        .bind(is_healthy)
        .execute(&self.pool)
        .await?;

        self.provider_health(provider)
            .await?
            .ok_or_else(|| StorageError::ProviderHealthMissing(provider.to_string()))
    }

    pub async fn provider_health(
        &self,
        provider: &ProviderId,
    ) -> Result<Option<ProviderHealthRecord>, StorageError> {
        let row = sqlx::query_as::<_, ProviderHealthRecord>(
            "SELECT * FROM provider_health WHERE provider_name = ?",
        )
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn all_provider_health(&self) -> Result<Vec<ProviderHealthRecord>, StorageError> {
        let rows = sqlx::query_as::<_, ProviderHealthRecord>(
            "SELECT * FROM provider_health ORDER BY provider_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Aggregate counters for the stats endpoint.
    pub async fn request_stats(&self) -> Result<RequestStats, StorageError> {
        let total_requests: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_requests")
            .fetch_one(&self.pool)
            .await?;
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM sms_requests GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let by_provider: Vec<(String, i64)> = sqlx::query_as(
            "SELECT provider_used, COUNT(*) FROM sms_requests
             WHERE provider_used IS NOT NULL GROUP BY provider_used",
        )
        .fetch_all(&self.pool)
        .await?;
        let total_responses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_responses")
            .fetch_one(&self.pool)
            .await?;
        let total_retries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_retries")
            .fetch_one(&self.pool)
            .await?;

        Ok(RequestStats {
            total_requests,
            by_status: by_status.into_iter().collect(),
            by_provider: by_provider.into_iter().collect(),
            total_responses,
            total_retries,
        })
    }
}
