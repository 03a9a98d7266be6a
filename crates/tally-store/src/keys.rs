//! Key encoding utilities for `RocksDB`.
//!
//! Primary records are keyed by their 16-byte id. Per-user indexes use the composite
//! `user_id (16 bytes) || record_id (16 bytes)` so that a prefix scan over a user
//! returns that user's records in ULID (creation) order.

use tally_core::{SnapshotId, TransactionId, TransferId, UserId};

/// Length of a composite user index key.
pub const USER_INDEX_KEY_LEN: usize = 32;

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a score counter key from a user ID.
#[must_use]
pub fn score_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a transfer key from a transfer ID.
#[must_use]
pub fn transfer_key(transfer_id: &TransferId) -> Vec<u8> {
    transfer_id.to_bytes().to_vec()
}

/// Create a snapshot key from a snapshot ID.
#[must_use]
pub fn snapshot_key(snapshot_id: &SnapshotId) -> Vec<u8> {
    snapshot_id.to_bytes().to_vec()
}

/// Create a per-user index key.
///
/// Format: `user_id (16 bytes) || record_id (16 bytes)`
#[must_use]
pub fn user_index_key(user_id: &UserId, record_id: [u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(USER_INDEX_KEY_LEN);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&record_id);
    key
}

/// Create a prefix for iterating all index entries of a user.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// The greatest possible index key for a user, used to seek backwards.
#[must_use]
pub fn user_upper_bound(user_id: &UserId) -> Vec<u8> {
    user_index_key(user_id, [0xff; 16])
}

/// Extract the record ID half of a per-user index key.
///
/// Returns `None` if the key is not a composite index key.
#[must_use]
pub fn extract_record_id(key: &[u8]) -> Option<[u8; 16]> {
    if key.len() != USER_INDEX_KEY_LEN {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..]);
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_length() {
        let user_id = UserId::generate();
        assert_eq!(account_key(&user_id).len(), 16);
        assert_eq!(score_key(&user_id), account_key(&user_id));
    }

    #[test]
    fn user_index_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_index_key(&user_id, tx_id.to_bytes());

        assert_eq!(key.len(), USER_INDEX_KEY_LEN);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
        assert!(key.starts_with(&user_prefix(&user_id)));
    }

    #[test]
    fn extract_record_id_roundtrip() {
        let user_id = UserId::generate();
        let snapshot_id = SnapshotId::generate();
        let key = user_index_key(&user_id, snapshot_id.to_bytes());

        let extracted = extract_record_id(&key).unwrap();
        assert_eq!(SnapshotId::from_bytes(extracted), snapshot_id);
    }

    #[test]
    fn extract_record_id_rejects_short_keys() {
        assert!(extract_record_id(&[0u8; 16]).is_none());
    }

    #[test]
    fn upper_bound_sorts_after_every_entry() {
        let user_id = UserId::generate();
        let key = user_index_key(&user_id, TransactionId::generate().to_bytes());
        assert!(key < user_upper_bound(&user_id));
    }
}
