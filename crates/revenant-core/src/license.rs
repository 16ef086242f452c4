//! Licence records and the cross-session licence store.
//!
//! The store is the only synchronisation point sessions share: it is
//! consulted once at session start and the returned record is an immutable
//! snapshot, so sessions never contend after creation.

use std::sync::Arc;

use dashmap::DashMap;

/// One local player's credentials
#[derive(Debug, Clone, Default)]
pub struct License {
    /// Serial number issued to the local client
    pub serial_number: u32,
    /// Access key string
    pub access_key: String,
    /// GC online password
    pub gc_password: String,
    /// BB account username
    pub bb_username: String,
    /// BB account password
    pub bb_password: String,
}

/// Read-mostly licence store keyed by serial number
#[derive(Debug, Default)]
pub struct LicenseStore {
    entries: DashMap<u32, Arc<License>>,
}

impl LicenseStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a licence
    pub fn insert(&self, license: License) {
        self.entries.insert(license.serial_number, Arc::new(license));
    }

    /// Snapshot the licence for `serial_number`, if present
    #[must_use]
    pub fn get(&self, serial_number: u32) -> Option<Arc<License>> {
        self.entries.get(&serial_number).map(|e| Arc::clone(e.value()))
    }

    /// Number of stored licences
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_replacement() {
        let store = LicenseStore::new();
        store.insert(License { serial_number: 7, access_key: "old".into(), ..Default::default() });
        let snapshot = store.get(7).unwrap();
        store.insert(License { serial_number: 7, access_key: "new".into(), ..Default::default() });
        assert_eq!(snapshot.access_key, "old");
        assert_eq!(store.get(7).unwrap().access_key, "new");
    }
}
