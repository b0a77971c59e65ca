//! Message-id generation.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate an opaque message id: `msg_<unix-ts>_<8-hex-random>`.
///
/// Unique per admitted request; two admissions of the same payload get two
/// distinct ids (there is no dedup).
pub fn new_message_id() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let random = Uuid::new_v4().simple().to_string();
    format!("msg_{}_{}", ts, &random[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_shape() {
        let id = new_message_id();
        assert!(id.starts_with("msg_"));
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(new_message_id(), new_message_id());
    }
}
