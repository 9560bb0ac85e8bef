use std::sync::{Arc, Weak};

/// Non-owning registrations. Entries whose owner dropped them are skipped
/// and pruned lazily.
pub(crate) struct WeakList<T> {
    entries: Vec<Weak<T>>,
}

impl<T> Default for WeakList<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> WeakList<T> {
    pub(crate) fn insert(&mut self, value: &Arc<T>) {
        self.prune();
        self.entries.push(Arc::downgrade(value));
    }

    /// Strong handles to every entry that is still alive.
    pub(crate) fn live(&mut self) -> Vec<Arc<T>> {
        self.prune();
        self.entries.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    fn prune(&mut self) {
        self.entries.retain(|entry| entry.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_entries_disappear() {
        let mut list = WeakList::default();
        let a = Arc::new("a");
        let b = Arc::new("b");
        list.insert(&a);
        list.insert(&b);
        assert_eq!(list.len(), 2);

        drop(a);
        assert_eq!(list.len(), 1);
        let live = list.live();
        assert_eq!(live.len(), 1);
        assert_eq!(*live[0], "b");

        drop(live);
        drop(b);
        assert_eq!(list.len(), 0);
    }
}
