//! Session key-pair registry
//!
//! Fixed-capacity store of key id / key material pairs, registered by the
//! higher-level authentication exchange and looked up during handshake
//! processing. At most one record per key id: registering a duplicate
//! replaces the existing material, which is a policy decision, not a
//! fault. A "most recently registered" pointer serves the fast path that
//! wants the key it just registered.

use peerlink_proto::{KeyId, KeyMaterial};
use tracing::{debug, info};

use crate::error::{NetError, NetResult};

/// A registered session key pair
#[derive(Debug, Clone)]
pub struct KeyPairRecord {
    /// Session-key identifier
    pub key_id: KeyId,
    /// Secret key material (zeroed on drop)
    pub key_material: KeyMaterial,
}

/// Fixed-capacity key-pair store
pub struct KeyRegistry {
    entries: Vec<Option<KeyPairRecord>>,
    most_recent: Option<usize>,
}

impl KeyRegistry {
    /// Create a registry with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            most_recent: None,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of registered key pairs
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether no key pairs are registered
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }

    /// Register key material under a key id.
    ///
    /// Replaces the existing entry if the key id is already registered.
    /// Fails only when the registry is full and the key id is new;
    /// eviction is never automatic, the caller must unregister first.
    pub fn register(&mut self, key_id: KeyId, key_material: KeyMaterial) -> NetResult<()> {
        if let Some(index) = self.position(&key_id) {
            info!("replacing key material for already-registered key id {key_id}");
            self.entries[index] = Some(KeyPairRecord {
                key_id,
                key_material,
            });
            self.most_recent = Some(index);
            return Ok(());
        }

        let capacity = self.capacity();
        let index = self
            .entries
            .iter()
            .position(|e| e.is_none())
            .ok_or(NetError::KeyRegistryFull { capacity })?;

        self.entries[index] = Some(KeyPairRecord {
            key_id,
            key_material,
        });
        self.most_recent = Some(index);
        debug!("registered key pair {key_id}");
        Ok(())
    }

    /// Look up a key pair by key id
    pub fn lookup(&self, key_id: &KeyId) -> Option<&KeyPairRecord> {
        self.position(key_id)
            .and_then(|index| self.entries[index].as_ref())
    }

    /// Remove a key pair. No-op if the key id is absent.
    pub fn unregister(&mut self, key_id: &KeyId) {
        if let Some(index) = self.position(key_id) {
            self.entries[index] = None;
            if self.most_recent == Some(index) {
                self.most_recent = None;
            }
            debug!("unregistered key pair {key_id}");
        }
    }

    /// The last successfully registered key pair, if still present
    pub fn most_recent(&self) -> Option<&KeyPairRecord> {
        self.most_recent
            .and_then(|index| self.entries[index].as_ref())
    }

    fn position(&self, key_id: &KeyId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.as_ref().is_some_and(|r| r.key_id == *key_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_id(byte: u8) -> KeyId {
        KeyId::from_bytes([byte; 8])
    }

    fn material(byte: u8) -> KeyMaterial {
        KeyMaterial::from_bytes([byte; 16])
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = KeyRegistry::new(4);
        registry.register(key_id(1), material(0xAA)).unwrap();

        let record = registry.lookup(&key_id(1)).unwrap();
        assert_eq!(record.key_material, material(0xAA));
        assert!(registry.lookup(&key_id(2)).is_none());
    }

    #[test]
    fn test_duplicate_key_id_replaces() {
        let mut registry = KeyRegistry::new(4);
        registry.register(key_id(1), material(0xAA)).unwrap();
        registry.register(key_id(1), material(0xBB)).unwrap();

        assert_eq!(registry.len(), 1);
        let record = registry.lookup(&key_id(1)).unwrap();
        assert_eq!(record.key_material, material(0xBB));
    }

    #[test]
    fn test_full_registry_rejects_new_but_not_replacement() {
        let mut registry = KeyRegistry::new(2);
        registry.register(key_id(1), material(1)).unwrap();
        registry.register(key_id(2), material(2)).unwrap();

        let err = registry.register(key_id(3), material(3)).unwrap_err();
        assert!(matches!(err, NetError::KeyRegistryFull { capacity: 2 }));

        // Replacement still succeeds at capacity.
        registry.register(key_id(2), material(9)).unwrap();
        assert_eq!(
            registry.lookup(&key_id(2)).unwrap().key_material,
            material(9)
        );
    }

    #[test]
    fn test_most_recent_tracks_latest_register() {
        let mut registry = KeyRegistry::new(4);
        assert!(registry.most_recent().is_none());

        registry.register(key_id(1), material(1)).unwrap();
        registry.register(key_id(2), material(2)).unwrap();
        assert_eq!(registry.most_recent().unwrap().key_id, key_id(2));

        registry.register(key_id(1), material(3)).unwrap();
        assert_eq!(registry.most_recent().unwrap().key_id, key_id(1));
    }

    #[test]
    fn test_unregister_clears_most_recent() {
        let mut registry = KeyRegistry::new(4);
        registry.register(key_id(1), material(1)).unwrap();
        registry.unregister(&key_id(1));

        assert!(registry.lookup(&key_id(1)).is_none());
        assert!(registry.most_recent().is_none());

        // Absent key id is a no-op.
        registry.unregister(&key_id(7));
    }
}
