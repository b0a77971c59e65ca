//! The task envelope.

use serde::{Deserialize, Serialize};
use smsgate_core::ProviderId;

/// A unit of work on the queue.
///
/// `Dispatch` selects a provider at execution time and fans out a `Send`;
/// `Send` performs exactly one upstream HTTP attempt. Exclusion sets travel
/// with the task so retries accumulate failed providers across hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    Dispatch {
        message_id: String,
        request_id: i64,
        phone: String,
        text: String,
        excluded: Vec<ProviderId>,
        /// 0-based attempt number.
        attempt: u32,
    },
    Send {
        message_id: String,
        request_id: i64,
        phone: String,
        text: String,
        provider_id: ProviderId,
        provider_url: String,
        excluded: Vec<ProviderId>,
        /// 0-based attempt number.
        attempt: u32,
    },
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Dispatch { .. } => "dispatch",
            Task::Send { .. } => "send",
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            Task::Dispatch { message_id, .. } | Task::Send { message_id, .. } => message_id,
        }
    }

    pub fn request_id(&self) -> i64 {
        match self {
            Task::Dispatch { request_id, .. } | Task::Send { request_id, .. } => *request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let task = Task::Dispatch {
            message_id: "msg_1_abcd1234".to_string(),
            request_id: 7,
            phone: "01921317475".to_string(),
            text: "Hello".to_string(),
            excluded: vec![ProviderId::from("provider1")],
            attempt: 1,
        };
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"kind\":\"dispatch\""));
        assert_eq!(serde_json::from_str::<Task>(&json).unwrap(), task);
    }

    #[test]
    fn test_accessors() {
        let task = Task::Send {
            message_id: "msg_1_abcd1234".to_string(),
            request_id: 9,
            phone: "01921317475".to_string(),
            text: "Hello".to_string(),
            provider_id: ProviderId::from("provider2"),
            provider_url: "http://localhost:8072".to_string(),
            excluded: Vec::new(),
            attempt: 0,
        };
        assert_eq!(task.kind(), "send");
        assert_eq!(task.request_id(), 9);
        assert_eq!(task.message_id(), "msg_1_abcd1234");
    }
}
