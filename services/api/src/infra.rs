use metrics_exporter_prometheus::PrometheusHandle;
use rentwise::marketplace::{EntityStore, MemoryStore, Role, StoreError, User, UserId};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Accounts loaded into a fresh in-memory store so the API is usable without
/// an external user directory.
pub(crate) const SEED_ACCOUNTS: [(&str, &str, Role); 3] = [
    ("admin-1", "Platform Admin", Role::Admin),
    ("owner-1", "Anita Kulkarni", Role::Owner),
    ("tenant-1", "Rahul Deshpande", Role::Tenant),
];

pub(crate) fn seeded_store() -> Result<MemoryStore, StoreError> {
    let store = MemoryStore::new();
    for (id, name, role) in SEED_ACCOUNTS {
        store.insert(User {
            id: UserId::from(id),
            name: name.to_string(),
            email: format!("{id}@rentwise.local"),
            role,
        })?;
    }
    Ok(store)
}
