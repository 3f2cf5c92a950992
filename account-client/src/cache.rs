use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use crate::AccountSnapshot;

struct Entry {
    snapshot: AccountSnapshot,
    inserted_at: Instant,
}

/// Short-TTL cache for account snapshots (`cache.account.ttl-seconds`, default 60s).
/// Invalidated explicitly on every successful balance mutation for that account id;
/// a plain `Mutex<HashMap>` is sufficient since entries are small and lookups cheap.
pub struct AccountSnapshotCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl AccountSnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, account_id: &str) -> Option<AccountSnapshot> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        let entry = entries.get(account_id)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.snapshot.clone())
    }

    pub fn put(&self, account_id: &str, snapshot: AccountSnapshot) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(
            account_id.to_string(),
            Entry {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, account_id: &str) {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.remove(account_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountType;
    use rust_decimal::Decimal;

    fn snapshot(id: &str) -> AccountSnapshot {
        AccountSnapshot {
            account_id: id.to_string(),
            account_type: AccountType::Debit,
            active: true,
            balance: Decimal::from(100),
            available_credit: Decimal::ZERO,
            version: 1,
        }
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = AccountSnapshotCache::new(Duration::from_millis(1));
        cache.put("acct-a", snapshot("acct-a"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("acct-a").is_none());
    }

    #[test]
    fn fresh_entry_is_returned() {
        let cache = AccountSnapshotCache::new(Duration::from_secs(60));
        cache.put("acct-a", snapshot("acct-a"));
        assert!(cache.get("acct-a").is_some());
    }

    #[test]
    fn invalidate_removes_entry_immediately() {
        let cache = AccountSnapshotCache::new(Duration::from_secs(60));
        cache.put("acct-a", snapshot("acct-a"));
        cache.invalidate("acct-a");
        assert!(cache.get("acct-a").is_none());
    }
}
