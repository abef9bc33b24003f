use parking_lot::Mutex;
use std::collections::HashSet;

/// Set of names held by live pools.
///
/// A registry is owned by whatever composes pools and shared as `Arc<Registry>`;
/// independent registries never see each other's names.
#[derive(Debug, Default)]
pub struct Registry {
    names: Mutex<HashSet<String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    /// Claims `name`. Returns `false` if it is already held; the check and the
    /// insert happen under one lock.
    pub fn add(&self, name: &str) -> bool {
        let mut names = self.names.lock();
        if names.contains(name) {
            return false;
        }
        names.insert(name.to_owned())
    }

    /// Releases `name`. Releasing an unknown name is a no-op.
    pub fn remove(&self, name: &str) -> bool {
        self.names.lock().remove(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }

    /// Sorted snapshot of the held names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.lock().iter().cloned().collect();
        names.sort();
        names
    }
}
