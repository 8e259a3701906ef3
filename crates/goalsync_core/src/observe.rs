//! Listener lists for single-threaded observables.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entry<T> = (ListenerId, Rc<dyn Fn(&T)>);

/// Ordered listener list that tolerates (un)registration during emission.
pub(crate) struct Observers<T: ?Sized> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Observers<T> {
    pub(crate) fn add(&self, listener: Rc<dyn Fn(&T)>) -> ListenerId {
        let id = ListenerId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.entries.borrow_mut().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Calls every listener registered when emission starts.
    ///
    /// A listener removed by an earlier one is skipped; emission stops as
    /// soon as `live()` turns false.
    pub(crate) fn emit(&self, value: &T, live: impl Fn() -> bool) -> usize {
        let snapshot = self.entries.borrow().clone();
        let mut called = 0;
        for (id, listener) in snapshot {
            if !live() {
                break;
            }
            let registered = self
                .entries
                .borrow()
                .iter()
                .any(|(entry_id, _)| *entry_id == id);
            if !registered {
                continue;
            }
            listener(value);
            called += 1;
        }
        called
    }
}
