use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use qrdesk_core::{ClientId, DispatchError, PrintSink, RegistryError};

/// Shared handle to a live agent connection.
pub type SinkHandle = Arc<dyn PrintSink>;

#[derive(Default)]
struct Inner {
    entries: HashMap<ClientId, SinkHandle>,
    default: Option<ClientId>,
}

/// Live printing-agent connections keyed by client id, plus the single
/// default destination.
///
/// A single lock covers both, so a `resolve` never sees an entry table and a
/// default from different moments. The lock is never held across an await.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `id`. Returns the displaced handle;
    /// closing it is the caller's business.
    pub fn register(
        &self,
        id: ClientId,
        handle: SinkHandle,
    ) -> Result<Option<SinkHandle>, RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::EmptyClientId);
        }
        let displaced = self.inner.write().entries.insert(id.clone(), handle);
        if displaced.is_some() {
            tracing::info!(client_id = %id, "replaced existing printer connection");
        } else {
            tracing::info!(client_id = %id, "printer connected");
        }
        Ok(displaced)
    }

    /// Remove the entry for `id` if present.
    pub fn unregister(&self, id: &ClientId) {
        if self.inner.write().entries.remove(id).is_some() {
            tracing::info!(client_id = %id, "printer disconnected");
        }
    }

    /// Remove the entry for `id` only while it still points at `handle`.
    /// Returns whether anything was removed.
    pub fn release(&self, id: &ClientId, handle: &SinkHandle) -> bool {
        let mut inner = self.inner.write();
        let current = inner.entries.get(id).is_some_and(|h| Arc::ptr_eq(h, handle));
        if current {
            inner.entries.remove(id);
            tracing::info!(client_id = %id, "printer disconnected");
        } else {
            tracing::debug!(client_id = %id, "stale connection closed, entry kept");
        }
        current
    }

    /// Store `id` as the default destination. It need not be connected now,
    /// and stays set after the agent disconnects.
    pub fn set_default(&self, id: ClientId) {
        tracing::info!(client_id = %id, "default printer set");
        self.inner.write().default = Some(id);
    }

    pub fn default_destination(&self) -> Option<ClientId> {
        self.inner.read().default.clone()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.inner.read().entries.contains_key(id)
    }

    /// Connected client ids, sorted.
    pub fn connected(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.inner.read().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the destination for a job: `explicit` if given, else the default.
    pub fn resolve(
        &self,
        explicit: Option<&ClientId>,
    ) -> Result<(ClientId, SinkHandle), DispatchError> {
        let inner = self.inner.read();
        let id = explicit
            .or(inner.default.as_ref())
            .ok_or(DispatchError::NoDestination)?;
        inner
            .entries
            .get(id)
            .map(|handle| (id.clone(), Arc::clone(handle)))
            .ok_or_else(|| DispatchError::DestinationOffline(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qrdesk_core::{RenderedPrintMessage, SinkError};

    struct NullSink;

    #[async_trait]
    impl PrintSink for NullSink {
        async fn send(&self, _message: &RenderedPrintMessage) -> Result<usize, SinkError> {
            Ok(0)
        }
    }

    fn sink() -> SinkHandle {
        Arc::new(NullSink)
    }

    fn id(s: &str) -> ClientId {
        ClientId::from(s)
    }

    #[test]
    fn register_and_resolve_explicit() {
        let registry = ConnectionRegistry::new();
        let handle = sink();
        assert!(registry.register(id("A"), Arc::clone(&handle)).unwrap().is_none());

        let (resolved, got) = registry.resolve(Some(&id("A"))).unwrap();
        assert_eq!(resolved, id("A"));
        assert!(Arc::ptr_eq(&got, &handle));
        assert!(registry.contains(&id("A")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_id_is_rejected() {
        let registry = ConnectionRegistry::new();
        let err = registry.register(id(""), sink()).err().unwrap();
        assert_eq!(err, RegistryError::EmptyClientId);
        assert!(registry.is_empty());
    }

    #[test]
    fn second_registration_replaces_first() {
        let registry = ConnectionRegistry::new();
        let first = sink();
        let second = sink();
        registry.register(id("A"), Arc::clone(&first)).unwrap();
        let displaced = registry.register(id("A"), Arc::clone(&second)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&displaced, &first));

        let (_, got) = registry.resolve(Some(&id("A"))).unwrap();
        assert!(Arc::ptr_eq(&got, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn release_ignores_replaced_handle() {
        let registry = ConnectionRegistry::new();
        let first = sink();
        let second = sink();
        registry.register(id("A"), Arc::clone(&first)).unwrap();
        registry.register(id("A"), Arc::clone(&second)).unwrap();

        assert!(!registry.release(&id("A"), &first));
        assert!(registry.contains(&id("A")));
        assert!(registry.release(&id("A"), &second));
        assert!(!registry.contains(&id("A")));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        registry.register(id("A"), sink()).unwrap();
        registry.unregister(&id("A"));
        registry.unregister(&id("A"));
        registry.unregister(&id("never-seen"));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_follows_last_operation() {
        let registry = ConnectionRegistry::new();
        let ops: &[(bool, &str)] = &[
            (true, "A"),
            (true, "B"),
            (false, "A"),
            (true, "A"),
            (false, "B"),
            (false, "B"),
            (true, "C"),
            (false, "C"),
        ];
        let mut last: HashMap<&str, bool> = HashMap::new();
        for &(register, name) in ops {
            if register {
                registry.register(id(name), sink()).unwrap();
            } else {
                registry.unregister(&id(name));
            }
            last.insert(name, register);

            for (&name, &live) in &last {
                assert_eq!(registry.resolve(Some(&id(name))).is_ok(), live, "{name}");
            }
        }
        assert_eq!(registry.connected(), vec![id("A")]);
    }

    #[test]
    fn no_default_and_no_entries_is_no_destination() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(registry.resolve(None), Err(DispatchError::NoDestination)));
    }

    #[test]
    fn no_default_with_entries_is_still_no_destination() {
        let registry = ConnectionRegistry::new();
        registry.register(id("A"), sink()).unwrap();
        assert!(matches!(registry.resolve(None), Err(DispatchError::NoDestination)));
    }

    #[test]
    fn default_naming_absent_client_is_offline() {
        let registry = ConnectionRegistry::new();
        registry.set_default(id("X"));
        match registry.resolve(None) {
            Err(DispatchError::DestinationOffline(who)) => assert_eq!(who, id("X")),
            other => panic!("unexpected: {:?}", other.map(|(id, _)| id)),
        }
    }

    #[test]
    fn default_survives_disconnect_and_reconnect() {
        let registry = ConnectionRegistry::new();
        registry.register(id("A"), sink()).unwrap();
        registry.set_default(id("A"));
        registry.unregister(&id("A"));
        assert_eq!(registry.default_destination(), Some(id("A")));
        assert!(matches!(
            registry.resolve(None),
            Err(DispatchError::DestinationOffline(_))
        ));

        let fresh = sink();
        registry.register(id("A"), Arc::clone(&fresh)).unwrap();
        let (who, got) = registry.resolve(None).unwrap();
        assert_eq!(who, id("A"));
        assert!(Arc::ptr_eq(&got, &fresh));
    }

    #[test]
    fn explicit_id_wins_over_default() {
        let registry = ConnectionRegistry::new();
        registry.register(id("A"), sink()).unwrap();
        registry.register(id("B"), sink()).unwrap();
        registry.set_default(id("A"));
        let (who, _) = registry.resolve(Some(&id("B"))).unwrap();
        assert_eq!(who, id("B"));
    }

    #[test]
    fn explicit_offline_does_not_fall_back_to_default() {
        let registry = ConnectionRegistry::new();
        registry.register(id("A"), sink()).unwrap();
        registry.set_default(id("A"));
        match registry.resolve(Some(&id("B"))) {
            Err(DispatchError::DestinationOffline(who)) => assert_eq!(who, id("B")),
            other => panic!("unexpected: {:?}", other.map(|(id, _)| id)),
        }
    }
}
