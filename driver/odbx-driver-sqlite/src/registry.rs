///
/// Handle registry.
///
/// Maps handle numbers to entries. Numbers are never reused, so a stale
/// handle is reported as invalid instead of silently reaching a newer
/// object.
///

use std::collections::HashMap;
use std::sync::Arc;

pub struct Registry<T> {
    entries: HashMap<u64, Arc<T>>,
    next_id: u64,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn insert(&mut self, entry: T) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, Arc::new(entry));
        id
    }

    pub fn get(&self, id: u64) -> Option<Arc<T>> {
        self.entries.get(&id).cloned()
    }

    pub fn remove(&mut self, id: u64) -> Option<Arc<T>> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let mut reg = Registry::new();
        let a = reg.insert("a");
        reg.remove(a);
        let b = reg.insert("b");
        assert_ne!(a, b);
        assert!(reg.get(a).is_none());
        assert_eq!(reg.get(b).as_deref(), Some(&"b"));
        assert_eq!(reg.len(), 1);
    }
}
