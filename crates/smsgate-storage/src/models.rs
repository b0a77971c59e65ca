//! Row types and the request lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smsgate_core::ProviderId;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Admitted, not yet handed to the dispatcher.
    Pending,
    /// A dispatch or send task is in flight.
    Processing,
    /// At least one attempt failed; a retry is scheduled.
    Retrying,
    /// An upstream accepted the message.
    Completed,
    /// Failed without retry bookkeeping (operator use).
    Failed,
    /// All retries exhausted; dead-lettered.
    PermanentlyFailed,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PermanentlyFailed => "permanently_failed",
        };
        f.write_str(text)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "retrying" => Ok(Self::Retrying),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "permanently_failed" => Ok(Self::PermanentlyFailed),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// One admitted request.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SmsRequest {
    pub id: i64,
    pub phone: String,
    pub text: String,
    pub status: RequestStatus,
    pub provider_used: Option<String>,
    pub retry_count: i64,
    pub max_retries: i64,
    /// Comma-separated provider ids, in the order they failed.
    pub failed_providers: String,
    pub is_permanently_failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SmsRequest {
    /// The failed-provider column as typed ids.
    pub fn failed_provider_ids(&self) -> Vec<ProviderId> {
        self.failed_providers
            .split(',')
            .filter(|part| !part.is_empty())
            .map(ProviderId::from)
            .collect()
    }
}

/// One upstream attempt's response (or synthesized error).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SmsResponse {
    pub id: i64,
    pub request_id: i64,
    pub response_data: String,
    pub status_code: i64,
    pub created_at: DateTime<Utc>,
}

/// One scheduled retry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SmsRetry {
    pub id: i64,
    pub request_id: i64,
    /// 1-based attempt number of the retry this row scheduled.
    pub attempt_number: i64,
    /// The provider whose failure triggered this retry.
    pub provider_used: String,
    pub error_message: String,
    pub delay_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// Long-horizon per-provider summary. Reporting only; the sliding window
/// drives selection.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProviderHealthRecord {
    pub id: i64,
    pub provider_name: String,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_checked: DateTime<Utc>,
    pub is_healthy: bool,
}

/// Aggregate counters for the stats endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestStats {
    pub total_requests: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_provider: BTreeMap<String, i64>,
    pub total_responses: i64,
    pub total_retries: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Processing,
            RequestStatus::Retrying,
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::PermanentlyFailed,
        ] {
            assert_eq!(status.to_string().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_failed_provider_ids_empty_column() {
        let request = SmsRequest {
            id: 1,
            phone: "01921317475".into(),
            text: "hi".into(),
            status: RequestStatus::Pending,
            provider_used: None,
            retry_count: 0,
            max_retries: 5,
            failed_providers: String::new(),
            is_permanently_failed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(request.failed_provider_ids().is_empty());
    }
}
