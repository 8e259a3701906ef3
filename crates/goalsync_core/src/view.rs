//! Live view driver between a merged source and the view-binding layer.
//!
//! # Responsibility
//! - Recompute buckets and the view sequence whenever an input changes.
//! - Publish each result as one immutable `ViewState`.
//!
//! # Invariants
//! - One reference instant is captured per recompute and shared by every
//!   bucket predicate.
//! - Recomputation never mutates the merged set.
//! - After `close()` no listener is called again.

use crate::aggregate::MergedSource;
use crate::bucket::{bucket, default_predicates, BucketMap, BucketPredicate};
use crate::clock::{Clock, ReferenceInstant};
use crate::model::item::Item;
use crate::observe::{ListenerId, Observers};
use crate::pipeline::{transform, AnnotatedItem, GroupBy, SortBy, ViewOptions};
use log::debug;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Receives every published view state.
pub type ViewListener = Rc<dyn Fn(&ViewState)>;

/// Wraps a closure as a [`ViewListener`].
pub fn view_listener(listener: impl Fn(&ViewState) + 'static) -> ViewListener {
    Rc::new(listener)
}

/// Result of one recompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    /// Instant every bucket predicate was evaluated against.
    pub reference: ReferenceInstant,
    pub buckets: BucketMap,
    pub sequence: Vec<AnnotatedItem>,
    /// Monotonic recompute counter, starting at 1.
    pub revision: u64,
}

struct ViewCore {
    clock: Rc<dyn Clock>,
    predicates: Vec<BucketPredicate>,
    options: RefCell<ViewOptions>,
    focus: RefCell<Option<String>>,
    items: RefCell<Vec<Item>>,
    current: RefCell<Option<ViewState>>,
    revision: Cell<u64>,
    listeners: Observers<ViewState>,
    closed: Cell<bool>,
}

impl ViewCore {
    fn recompute(&self) {
        if self.closed.get() {
            return;
        }
        let reference = self.clock.now();
        let state = {
            let items = self.items.borrow();
            let buckets = bucket(&items, &reference, &self.predicates);
            let options = self.options.borrow();
            let focus = self.focus.borrow();
            let sequence = match focus.as_deref() {
                Some(name) => transform(buckets.items(name), &options),
                None => transform(&items, &options),
            };
            let revision = self.revision.get() + 1;
            self.revision.set(revision);
            ViewState {
                reference,
                buckets,
                sequence,
                revision,
            }
        };
        debug!(
            "event=view_recompute module=view status=ok revision={} item_count={} row_count={}",
            state.revision,
            self.items.borrow().len(),
            state.sequence.len()
        );
        *self.current.borrow_mut() = Some(state.clone());
        self.listeners.emit(&state, || !self.closed.get());
    }
}

/// Reactive buckets and view sequence over one merged source.
pub struct LiveView {
    source: Rc<dyn MergedSource>,
    source_listener: ListenerId,
    core: Rc<ViewCore>,
}

impl LiveView {
    /// Starts a view with the default `today`/`overdue`/`done` buckets.
    pub fn new(source: Rc<dyn MergedSource>, clock: Rc<dyn Clock>, options: ViewOptions) -> Self {
        Self::with_predicates(source, clock, default_predicates(), options)
    }

    /// Starts a view and computes the first state from `source.merged()`.
    pub fn with_predicates(
        source: Rc<dyn MergedSource>,
        clock: Rc<dyn Clock>,
        predicates: Vec<BucketPredicate>,
        options: ViewOptions,
    ) -> Self {
        let core = Rc::new(ViewCore {
            clock,
            predicates,
            options: RefCell::new(options),
            focus: RefCell::new(None),
            items: RefCell::new(source.merged()),
            current: RefCell::new(None),
            revision: Cell::new(0),
            listeners: Observers::default(),
            closed: Cell::new(false),
        });

        let weak = Rc::downgrade(&core);
        let source_listener = source.on_merged(Rc::new(move |items: &[Item]| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            if core.closed.get() {
                return;
            }
            *core.items.borrow_mut() = items.to_vec();
            core.recompute();
        }));
        core.recompute();

        Self {
            source,
            source_listener,
            core,
        }
    }

    /// Latest published state.
    pub fn state(&self) -> Option<ViewState> {
        self.core.current.borrow().clone()
    }

    pub fn options(&self) -> ViewOptions {
        self.core.options.borrow().clone()
    }

    pub fn on_change(&self, listener: ViewListener) -> ListenerId {
        self.core.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.core.listeners.remove(id)
    }

    pub fn set_sort_by(&self, sort_by: SortBy) {
        self.update_options(|options| options.sort_by = sort_by);
    }

    pub fn set_group_by(&self, group_by: GroupBy) {
        self.update_options(|options| options.group_by = group_by);
    }

    pub fn set_search_text(&self, search_text: impl Into<String>) {
        let search_text = search_text.into();
        self.update_options(|options| options.search_text = search_text);
    }

    pub fn set_options(&self, next: ViewOptions) {
        self.update_options(|options| *options = next);
    }

    /// Restricts the view sequence to one bucket; `None` shows every item.
    ///
    /// Unknown bucket names yield an empty sequence.
    pub fn set_focus(&self, bucket_name: Option<&str>) {
        let next = bucket_name.map(str::to_string);
        if *self.core.focus.borrow() == next {
            return;
        }
        *self.core.focus.borrow_mut() = next;
        self.core.recompute();
    }

    /// Recomputes against a fresh reference instant, e.g. after day rollover.
    pub fn refresh(&self) {
        self.core.recompute();
    }

    /// Stops listening to the source. Idempotent.
    pub fn close(&self) {
        if self.core.closed.replace(true) {
            return;
        }
        self.source.remove_listener(self.source_listener);
        self.core.listeners.clear();
        debug!(
            "event=view_close module=view status=ok revision={}",
            self.core.revision.get()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.get()
    }

    fn update_options(&self, apply: impl FnOnce(&mut ViewOptions)) {
        let changed = {
            let mut options = self.core.options.borrow_mut();
            let before = options.clone();
            apply(&mut options);
            *options != before
        };
        if changed {
            self.core.recompute();
        }
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::{view_listener, LiveView};
    use crate::aggregate::{MergedListener, MergedSource};
    use crate::clock::FixedClock;
    use crate::model::item::Item;
    use crate::observe::{ListenerId, Observers};
    use crate::pipeline::{SortBy, ViewOptions};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct StaticSource {
        items: RefCell<Vec<Item>>,
        listeners: Observers<[Item]>,
    }

    impl StaticSource {
        fn publish(&self, items: Vec<Item>) {
            *self.items.borrow_mut() = items.clone();
            self.listeners.emit(items.as_slice(), || true);
        }
    }

    impl MergedSource for StaticSource {
        fn on_merged(&self, listener: MergedListener) -> ListenerId {
            self.listeners.add(listener)
        }

        fn remove_listener(&self, id: ListenerId) -> bool {
            self.listeners.remove(id)
        }

        fn merged(&self) -> Vec<Item> {
            self.items.borrow().clone()
        }
    }

    fn clock() -> Rc<FixedClock> {
        Rc::new(FixedClock::parse("2024-01-02T09:00:00+00:00").unwrap())
    }

    #[test]
    fn unchanged_options_do_not_recompute() {
        let source = Rc::new(StaticSource::default());
        let view = LiveView::new(source.clone(), clock(), ViewOptions::default());
        assert_eq!(view.state().unwrap().revision, 1);

        view.set_sort_by(SortBy::None);
        assert_eq!(view.state().unwrap().revision, 1);
        view.set_sort_by(SortBy::Lexical);
        assert_eq!(view.state().unwrap().revision, 2);
    }

    #[test]
    fn close_detaches_from_the_source() {
        let source = Rc::new(StaticSource::default());
        let view = LiveView::new(source.clone(), clock(), ViewOptions::default());
        let calls = Rc::new(RefCell::new(0));
        let sink = calls.clone();
        view.on_change(view_listener(move |_| *sink.borrow_mut() += 1));

        source.publish(vec![Item::new("a", "A")]);
        view.close();
        view.close();
        source.publish(vec![Item::new("b", "B")]);

        assert_eq!(*calls.borrow(), 1);
        assert_eq!(source.listeners.len(), 0);
        assert!(view.is_closed());
    }
}
