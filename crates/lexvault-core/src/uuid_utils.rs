//! UUIDv7 helpers.
//!
//! Every identifier minted by LexVault (documents, tasks, key records, storage
//! locators, events) is a UUIDv7, so IDs sort by creation time and storage
//! locators generated later never collide with earlier ones.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// ```
/// use lexvault_core::uuid_utils::{is_v7, new_v7};
///
/// assert!(is_v7(&new_v7()));
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// True if the UUID is version 7.
pub fn is_v7(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 7
}

/// Extract the embedded creation time from a UUIDv7.
///
/// Returns `None` for any other UUID version.
pub fn extract_timestamp(uuid: &Uuid) -> Option<DateTime<Utc>> {
    if !is_v7(uuid) {
        return None;
    }
    let (secs, nanos) = uuid.get_timestamp()?.to_unix();
    Utc.timestamp_opt(secs as i64, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_v7() {
        let id = new_v7();
        assert!(is_v7(&id));
    }

    #[test]
    fn test_v4_is_not_v7() {
        let id = Uuid::new_v4();
        assert!(!is_v7(&id));
        assert!(extract_timestamp(&id).is_none());
    }

    #[test]
    fn test_v7_ordering() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(a < b);
    }

    #[test]
    fn test_extract_timestamp_close_to_now() {
        let before = Utc::now();
        let id = new_v7();
        let ts = extract_timestamp(&id).unwrap();
        let drift = (ts - before).num_milliseconds().abs();
        assert!(drift < 1000, "timestamp drift {}ms", drift);
    }
}
