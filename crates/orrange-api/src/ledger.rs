use std::sync::Mutex;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use orrange_types::models::{LedgerEntry, LedgerKind};

use crate::auth::AppState;

/// `previous_hash` of the first entry.
const GENESIS_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Append-only, in-memory transaction log.
///
/// Each entry's hash covers its own fields and the previous entry's hash.
/// Nothing is persisted; a restart starts a fresh chain.
#[derive(Default)]
pub struct Ledger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &self,
        kind: LedgerKind,
        from_user: Option<i64>,
        to_user: Option<i64>,
        amount: i64,
        reference_id: Option<i64>,
    ) -> LedgerEntry {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let index = entries.len() as u64;
        let previous_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let timestamp = Utc::now();

        let entry = LedgerEntry {
            index,
            hash: entry_hash(index, &previous_hash, kind, from_user, to_user, amount, reference_id, timestamp),
            previous_hash,
            kind,
            from_user,
            to_user,
            amount,
            reference_id,
            timestamp,
        };
        entries.push(entry.clone());
        entry
    }

    /// All entries in append order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[allow(clippy::too_many_arguments)]
fn entry_hash(
    index: u64,
    previous_hash: &str,
    kind: LedgerKind,
    from_user: Option<i64>,
    to_user: Option<i64>,
    amount: i64,
    reference_id: Option<i64>,
    timestamp: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(index.to_be_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(format!("{:?}", kind).as_bytes());
    hasher.update(from_user.unwrap_or(0).to_be_bytes());
    hasher.update(to_user.unwrap_or(0).to_be_bytes());
    hasher.update(amount.to_be_bytes());
    hasher.update(reference_id.unwrap_or(0).to_be_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

pub async fn transactions(State(state): State<AppState>) -> Json<Vec<LedgerEntry>> {
    Json(state.ledger.entries())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_chain_by_hash() {
        let ledger = Ledger::new();
        let first = ledger.append(LedgerKind::Mint, None, Some(1), 0, Some(10));
        let second = ledger.append(LedgerKind::Purchase, Some(2), Some(1), 40, Some(3));

        assert_eq!(first.index, 0);
        assert_eq!(first.previous_hash, GENESIS_HASH);
        assert_eq!(second.previous_hash, first.hash);
        assert_ne!(first.hash, second.hash);
        assert!(second.hash.starts_with("0x"));
        assert_eq!(second.hash.len(), 66);

        let all = ledger.entries();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].kind, LedgerKind::Purchase);
    }
}
