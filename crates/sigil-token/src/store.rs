//! Per-tenant key storage.
//!
//! Signing services own a [`KeyStore`]; services that only verify tokens
//! need the narrower [`PublicKeyLookup`].

use crate::error::TokenError;
use crate::keys::{KeyPairHolder, generate_private_key};
use dashmap::DashMap;
use parking_lot::RwLock;
use rsa::RsaPublicKey;
use sigil_core::constants::MIN_RSA_KEY_BITS;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolve the public half of a tenant key by version.
///
/// `Ok(None)` means the tenant or version is unknown. `Err` is reserved for
/// failures of the backing store itself, which callers may retry.
pub trait PublicKeyLookup: Send + Sync {
    fn lookup(&self, tenant: &str, key_version: &str) -> Result<Option<RsaPublicKey>, TokenError>;
}

/// Key lifecycle for tenants that sign tokens.
pub trait KeyStore: PublicKeyLookup {
    /// Return the current key pair for a tenant, creating it on first use.
    ///
    /// Repeated calls for the same tenant return the same holder.
    fn get_or_create_key_pair(&self, tenant: &str) -> Result<Arc<KeyPairHolder>, TokenError>;
}

struct TenantKeys {
    current: Arc<KeyPairHolder>,
    retired: Vec<Arc<KeyPairHolder>>,
}

impl TenantKeys {
    fn new(current: KeyPairHolder) -> Self {
        Self {
            current: Arc::new(current),
            retired: Vec::new(),
        }
    }

    fn next_version(&self) -> String {
        (self.retired.len() + 2).to_string()
    }

    fn find(&self, version: &str) -> Option<&Arc<KeyPairHolder>> {
        std::iter::once(&self.current)
            .chain(self.retired.iter())
            .find(|holder| holder.version() == version)
    }
}

type TenantSlot = Arc<RwLock<Option<TenantKeys>>>;

/// In-memory key store with lazily generated, sequentially versioned keys.
///
/// Each tenant owns a slot in the map. Key generation holds only that
/// tenant's slot lock, so concurrent first access for an unseen tenant
/// generates exactly one key pair while reads of other tenants go on.
pub struct InMemoryKeyStore {
    keys: DashMap<String, TenantSlot>,
    key_bits: usize,
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new(MIN_RSA_KEY_BITS)
    }
}

impl InMemoryKeyStore {
    /// Create an empty store generating keys of `key_bits` bits.
    pub fn new(key_bits: usize) -> Self {
        Self {
            keys: DashMap::new(),
            key_bits,
        }
    }

    /// Replace the tenant's current key with a freshly generated one.
    ///
    /// The previous key stays available to [`PublicKeyLookup::lookup`] so
    /// tokens signed before the rotation keep verifying until they expire.
    pub fn rotate(&self, tenant: &str) -> Result<Arc<KeyPairHolder>, TokenError> {
        // Generate outside any lock
        let private_key = generate_private_key(self.key_bits)?;

        let slot = self.slot(tenant);
        let mut keys = slot.write();
        let holder = match keys.as_mut() {
            Some(keys) => {
                let holder = Arc::new(KeyPairHolder::from_private_key(
                    tenant,
                    keys.next_version(),
                    private_key,
                ));
                let previous = std::mem::replace(&mut keys.current, holder.clone());
                keys.retired.push(previous);
                holder
            }
            None => {
                let created = TenantKeys::new(KeyPairHolder::from_private_key(tenant, "1", private_key));
                let holder = created.current.clone();
                *keys = Some(created);
                holder
            }
        };

        tracing::info!(tenant, version = holder.version(), "rotated tenant signing key");
        Ok(holder)
    }

    /// Tenants with at least one key.
    pub fn tenants(&self) -> Vec<String> {
        let slots: Vec<(String, TenantSlot)> = self
            .keys
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let mut tenants: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.read().is_some())
            .map(|(tenant, _)| tenant)
            .collect();
        tenants.sort();
        tenants
    }

    /// Slot of a tenant that already has one. The shard lock is released on return.
    fn existing_slot(&self, tenant: &str) -> Option<TenantSlot> {
        self.keys.get(tenant).map(|slot| slot.value().clone())
    }

    fn slot(&self, tenant: &str) -> TenantSlot {
        if let Some(slot) = self.existing_slot(tenant) {
            return slot;
        }
        self.keys.entry(tenant.to_string()).or_default().value().clone()
    }
}

impl PublicKeyLookup for InMemoryKeyStore {
    fn lookup(&self, tenant: &str, key_version: &str) -> Result<Option<RsaPublicKey>, TokenError> {
        let Some(slot) = self.existing_slot(tenant) else {
            return Ok(None);
        };
        let keys = slot.read();
        Ok(keys
            .as_ref()
            .and_then(|keys| keys.find(key_version))
            .map(|holder| holder.public_key().clone()))
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get_or_create_key_pair(&self, tenant: &str) -> Result<Arc<KeyPairHolder>, TokenError> {
        let slot = self.slot(tenant);
        if let Some(keys) = slot.read().as_ref() {
            return Ok(keys.current.clone());
        }

        let mut keys = slot.write();
        // Another caller may have generated while we waited for the lock
        if let Some(keys) = keys.as_ref() {
            return Ok(keys.current.clone());
        }

        tracing::info!(tenant, bits = self.key_bits, "generating tenant signing key");
        let created = TenantKeys::new(KeyPairHolder::generate(tenant, "1", self.key_bits)?);
        let current = created.current.clone();
        *keys = Some(created);
        Ok(current)
    }
}

/// Fixed set of public keys, for services that verify but never sign.
#[derive(Debug, Default, Clone)]
pub struct StaticPublicKeys {
    keys: HashMap<(String, String), RsaPublicKey>,
}

impl StaticPublicKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant key under a version.
    pub fn with_key(
        mut self,
        tenant: impl Into<String>,
        version: impl Into<String>,
        public_key: RsaPublicKey,
    ) -> Self {
        self.keys.insert((tenant.into(), version.into()), public_key);
        self
    }
}

impl PublicKeyLookup for StaticPublicKeys {
    fn lookup(&self, tenant: &str, key_version: &str) -> Result<Option<RsaPublicKey>, TokenError> {
        Ok(self
            .keys
            .get(&(tenant.to_string(), key_version.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_keys::ROOT;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_tenant_returns_same_pair() {
        let store = InMemoryKeyStore::default();
        let first = store.get_or_create_key_pair("acme").unwrap();
        let second = store.get_or_create_key_pair("acme").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.tenant(), "acme");
        assert_eq!(first.version(), "1");
    }

    #[test]
    fn test_tenants_get_distinct_pairs() {
        let store = InMemoryKeyStore::default();
        let acme = store.get_or_create_key_pair("acme").unwrap();
        let globex = store.get_or_create_key_pair("globex").unwrap();

        assert_ne!(acme.public_key(), globex.public_key());
        assert_eq!(store.tenants(), vec!["acme".to_string(), "globex".to_string()]);
    }

    #[test]
    fn test_concurrent_first_access_converges() {
        let store = Arc::new(InMemoryKeyStore::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.get_or_create_key_pair("fresh-tenant").unwrap())
            })
            .collect();

        let holders: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for holder in &holders[1..] {
            assert!(Arc::ptr_eq(&holders[0], holder));
        }
    }

    #[test]
    fn test_cached_reads_do_not_wait_for_generation() {
        let store = Arc::new(InMemoryKeyStore::default());
        let cached: Vec<String> = (0..8).map(|i| format!("tenant-{i}")).collect();
        let pairs: Vec<_> = cached
            .iter()
            .map(|tenant| store.get_or_create_key_pair(tenant).unwrap())
            .collect();

        // Hold the slot lock the way an in-flight generation for a new tenant does.
        let slot = store.slot("brand-new");
        let generating = slot.write();

        let (tx, rx) = mpsc::channel();
        let reader = {
            let store = store.clone();
            let cached = cached.clone();
            thread::spawn(move || {
                let pairs: Vec<_> = cached
                    .iter()
                    .map(|tenant| store.get_or_create_key_pair(tenant).unwrap())
                    .collect();
                let found = cached
                    .iter()
                    .all(|tenant| store.lookup(tenant, "1").unwrap().is_some());
                tx.send((pairs, found)).unwrap();
            })
        };

        let (read, found) = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("cached reads blocked behind key generation");
        assert!(found);
        for (before, after) in pairs.iter().zip(&read) {
            assert!(Arc::ptr_eq(before, after));
        }

        drop(generating);
        reader.join().unwrap();
        assert!(store.lookup("brand-new", "1").unwrap().is_none());
        assert!(!store.tenants().contains(&"brand-new".to_string()));
    }

    #[test]
    fn test_lookup_by_version() {
        let store = InMemoryKeyStore::default();
        let holder = store.get_or_create_key_pair("acme").unwrap();

        assert_eq!(store.lookup("acme", "1").unwrap().as_ref(), Some(holder.public_key()));
        assert!(store.lookup("acme", "2").unwrap().is_none());
        assert!(store.lookup("unknown", "1").unwrap().is_none());
    }

    #[test]
    fn test_rotation_keeps_retired_keys() {
        let store = InMemoryKeyStore::default();
        let original = store.get_or_create_key_pair("acme").unwrap();
        let rotated = store.rotate("acme").unwrap();

        assert_eq!(rotated.version(), "2");
        assert!(Arc::ptr_eq(&store.get_or_create_key_pair("acme").unwrap(), &rotated));
        assert_eq!(
            store.lookup("acme", "1").unwrap().as_ref(),
            Some(original.public_key())
        );
        assert_eq!(
            store.lookup("acme", "2").unwrap().as_ref(),
            Some(rotated.public_key())
        );
    }

    #[test]
    fn test_rotating_unknown_tenant_creates_first_version() {
        let store = InMemoryKeyStore::default();
        let holder = store.rotate("newcomer").unwrap();
        assert_eq!(holder.version(), "1");
    }

    #[test]
    fn test_static_public_keys() {
        let keys = StaticPublicKeys::new().with_key("acme", "7", ROOT.public_key().clone());
        assert_eq!(keys.lookup("acme", "7").unwrap().as_ref(), Some(ROOT.public_key()));
        assert!(keys.lookup("acme", "1").unwrap().is_none());
    }
}
