//! Pool entry ordering policies
//!
//! Entries are equal when their transaction ids are equal, whatever the other
//! fields say. Distinct ids fall back to the id as the last key so both orders
//! are total and usable in a `BTreeSet`.

use pot_types::{Transaction, TxId};
use std::cmp::Ordering;

/// Queue entry for one of this node's own transactions.
///
/// Lower nonce first; for the same nonce, the more recent timestamp first.
#[derive(Debug, Clone, Copy)]
pub struct LocalEntry {
    pub txid: TxId,
    pub nonce: u64,
    pub timestamp: u64,
}

impl From<&Transaction> for LocalEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            txid: tx.id,
            nonce: tx.nonce,
            timestamp: tx.timestamp,
        }
    }
}

impl PartialEq for LocalEntry {
    fn eq(&self, other: &Self) -> bool {
        self.txid == other.txid
    }
}

impl Eq for LocalEntry {}

impl Ord for LocalEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.txid == other.txid {
            return Ordering::Equal;
        }
        self.nonce
            .cmp(&other.nonce)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for LocalEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue entry for a transaction heard from the network.
///
/// Ascending by fee, so the best (highest fee) entry is the last one.
#[derive(Debug, Clone, Copy)]
pub struct RemoteEntry {
    pub txid: TxId,
    pub fee: u64,
}

impl From<&Transaction> for RemoteEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            txid: tx.id,
            fee: tx.fee,
        }
    }
}

impl PartialEq for RemoteEntry {
    fn eq(&self, other: &Self) -> bool {
        self.txid == other.txid
    }
}

impl Eq for RemoteEntry {}

impl Ord for RemoteEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.txid == other.txid {
            return Ordering::Equal;
        }
        self.fee
            .cmp(&other.fee)
            .then_with(|| self.txid.cmp(&other.txid))
    }
}

impl PartialOrd for RemoteEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn txid(n: u8) -> TxId {
        TxId::new([n; 32])
    }

    fn local(n: u8, nonce: u64, timestamp: u64) -> LocalEntry {
        LocalEntry {
            txid: txid(n),
            nonce,
            timestamp,
        }
    }

    #[test]
    fn test_local_order() {
        // Lower nonce wins regardless of time
        assert!(local(1, 3, 0) < local(2, 4, 100));
        // Same nonce: newer resubmission first
        assert!(local(1, 3, 200) < local(2, 3, 100));
        // Same id compares equal whatever the fields
        assert_eq!(local(1, 3, 0).cmp(&local(1, 9, 9)), Ordering::Equal);
    }

    #[test]
    fn test_local_queue_head() {
        let queue: BTreeSet<LocalEntry> = [local(1, 7, 10), local(2, 6, 10), local(3, 6, 50)]
            .into_iter()
            .collect();
        assert_eq!(queue.first().unwrap().txid, txid(3));
        assert_eq!(queue.last().unwrap().txid, txid(1));
    }

    #[test]
    fn test_remote_order() {
        let low = RemoteEntry { txid: txid(1), fee: 5 };
        let high = RemoteEntry { txid: txid(2), fee: 50 };
        let same_id = RemoteEntry { txid: txid(1), fee: 500 };

        assert!(high > low);
        assert_eq!(low, same_id);

        let queue: BTreeSet<RemoteEntry> = [high, low].into_iter().collect();
        assert_eq!(queue.last().unwrap().fee, 50);
    }
}
