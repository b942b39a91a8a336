use std::panic::{self, AssertUnwindSafe};

use crate::config::BudgetConfig;

use super::registration::Registration;
use super::{BudgetStats, Disposer, Priority, RenderSurface};

/// Enforces a ceiling on the number of simultaneously held rendering contexts.
///
/// Hosts silently degrade past a small number of live contexts, so every
/// consumer registers here first. When the table is full, a newcomer may evict
/// the lowest-priority (then oldest) registration, but only if that victim is
/// strictly less important than the newcomer. Otherwise registration fails and
/// the caller is expected to fall back to a non-accelerated path.
///
/// All mutation goes through `&mut self`; a host that shares the manager
/// across threads should wrap it in a `Mutex`.
pub struct ContextBudgetManager<S: RenderSurface> {
    max_contexts: usize,
    /// Priority handed out to consumers that do not pick their own.
    default_priority: Priority,
    /// Registration order; scans are linear since the budget is tiny.
    entries: Vec<Registration<S>>,
    next_touch: u64,
}

impl<S: RenderSurface> ContextBudgetManager<S> {
    pub fn new(config: &BudgetConfig) -> Self {
        let mut manager = Self::with_max_contexts(config.max_contexts);
        manager.default_priority = config.default_priority;
        manager
    }

    pub fn with_max_contexts(max_contexts: usize) -> Self {
        Self {
            max_contexts,
            default_priority: Priority::default(),
            entries: Vec::with_capacity(max_contexts),
            next_touch: 0,
        }
    }

    /// Registers `id`, or updates it in place if already registered.
    ///
    /// Returns `false` only when the table is full and no registration with a
    /// strictly lower priority exists (or `id` is empty). A failed registration
    /// leaves the table unchanged and drops `surface` and `disposer` unused.
    pub fn register(
        &mut self,
        id: &str,
        surface: Option<S>,
        priority: impl Into<Priority>,
        disposer: Option<Disposer>,
    ) -> bool {
        if id.is_empty() {
            log::warn!("refusing to register an empty context id");
            return false;
        }

        let priority = priority.into();
        let touch = self.bump();

        if let Some(entry) = self.find_mut(id) {
            entry.priority = priority;
            entry.touch(touch);
            if disposer.is_some() {
                entry.disposer = disposer;
            }
            if let Some(surface) = surface {
                entry.attach(surface);
            }
            log::debug!("updated context registration '{id}' (priority {priority})");
            return true;
        }

        if self.is_at_capacity() && !self.evict_below(priority) {
            log::debug!(
                "context budget exhausted ({}/{}), rejecting '{id}' (priority {priority})",
                self.entries.len(),
                self.max_contexts,
            );
            return false;
        }

        let mut entry = Registration::new(id.to_owned(), priority, touch);
        entry.disposer = disposer;
        if let Some(surface) = surface {
            entry.attach(surface);
        }
        self.entries.push(entry);

        log::debug!(
            "registered context '{id}' (priority {priority}, {}/{})",
            self.entries.len(),
            self.max_contexts,
        );
        true
    }

    /// Attaches or replaces the surface of a live registration.
    pub fn update_surface(&mut self, id: &str, surface: S) {
        match self.find_mut(id) {
            Some(entry) => entry.attach(surface),
            None => log::debug!("update_surface: unknown context id '{id}'"),
        }
    }

    /// Disposes and removes a registration. Unknown ids are ignored.
    pub fn unregister(&mut self, id: &str) {
        match self.position(id) {
            Some(index) => {
                let entry = self.entries.remove(index);
                destroy(entry);
                log::debug!(
                    "unregistered context '{id}' ({}/{})",
                    self.entries.len(),
                    self.max_contexts,
                );
            }
            None => log::debug!("unregister: unknown context id '{id}'"),
        }
    }

    /// Changes eviction eligibility and refreshes recency.
    pub fn update_priority(&mut self, id: &str, priority: impl Into<Priority>) {
        let priority = priority.into();
        let touch = self.bump();
        match self.find_mut(id) {
            Some(entry) => {
                entry.priority = priority;
                entry.touch(touch);
            }
            None => log::debug!("update_priority: unknown context id '{id}'"),
        }
    }

    pub fn stats(&self) -> BudgetStats {
        BudgetStats {
            active: self.entries.len(),
            max: self.max_contexts,
            ids: self.entries.iter().map(|e| e.id.clone()).collect(),
        }
    }

    pub fn is_at_capacity(&self) -> bool {
        self.entries.len() >= self.max_contexts
    }

    /// Unregisters everything, in registration order.
    pub fn cleanup(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        log::debug!("releasing {} context registration(s)", self.entries.len());
        for entry in self.entries.drain(..) {
            destroy(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_priority(&self) -> Priority {
        self.default_priority
    }

    /// Registers `id` at the configured default priority.
    pub fn register_default(
        &mut self,
        id: &str,
        surface: Option<S>,
        disposer: Option<Disposer>,
    ) -> bool {
        let priority = self.default_priority;
        self.register(id, surface, priority, disposer)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn has_context(&self, id: &str) -> bool {
        self.find(id).is_some_and(|e| e.context.is_some())
    }

    pub fn priority(&self, id: &str) -> Option<Priority> {
        self.find(id).map(|e| e.priority)
    }

    /// Returns the context granted to `id`, if any.
    pub fn context(&self, id: &str) -> Option<&S::Context> {
        self.find(id).and_then(|e| e.context.as_ref())
    }

    pub fn context_mut(&mut self, id: &str) -> Option<&mut S::Context> {
        self.find_mut(id).and_then(|e| e.context.as_mut())
    }

    /// Evicts the weakest registration if it is strictly below `priority`.
    fn evict_below(&mut self, priority: Priority) -> bool {
        let victim = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.priority, e.touched))
            .filter(|(_, e)| e.priority < priority)
            .map(|(index, _)| index);

        let Some(index) = victim else {
            return false;
        };

        let entry = self.entries.remove(index);
        log::info!(
            "evicting context '{}' (priority {}, age {:?}) for priority {priority}",
            entry.id,
            entry.priority,
            entry.touched_at.elapsed(),
        );
        destroy(entry);
        true
    }

    fn bump(&mut self) -> u64 {
        let touch = self.next_touch;
        self.next_touch = self.next_touch.wrapping_add(1);
        touch
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn find(&self, id: &str) -> Option<&Registration<S>> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Registration<S>> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

impl<S: RenderSurface> Drop for ContextBudgetManager<S> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Runs the disposer, then hands the context back to its surface.
fn destroy<S: RenderSurface>(mut entry: Registration<S>) {
    if let Some(disposer) = entry.disposer.take() {
        if panic::catch_unwind(AssertUnwindSafe(disposer)).is_err() {
            log::error!("disposer for context '{}' panicked", entry.id);
        }
    }
    entry.release_context();
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared event log so tests can observe acquire/release/dispose order.
    type Events = Rc<RefCell<Vec<String>>>;

    struct FakeSurface {
        name: &'static str,
        fail: bool,
        events: Events,
    }

    impl RenderSurface for FakeSurface {
        type Context = &'static str;

        fn acquire(&mut self) -> anyhow::Result<Self::Context> {
            anyhow::ensure!(!self.fail, "surface '{}' refused a context", self.name);
            self.events.borrow_mut().push(format!("acquire {}", self.name));
            Ok(self.name)
        }

        fn release(&mut self, context: Self::Context) {
            self.events.borrow_mut().push(format!("release {context}"));
        }
    }

    fn events() -> Events {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn surface(name: &'static str, events: &Events) -> Option<FakeSurface> {
        Some(FakeSurface { name, fail: false, events: events.clone() })
    }

    fn disposer(tag: &'static str, events: &Events) -> Option<Disposer> {
        let events = events.clone();
        Some(Box::new(move || events.borrow_mut().push(format!("dispose {tag}"))))
    }

    fn explode() {
        panic!("disposer failure");
    }

    fn manager(max: usize) -> ContextBudgetManager<FakeSurface> {
        ContextBudgetManager::with_max_contexts(max)
    }

    fn ids(m: &ContextBudgetManager<FakeSurface>) -> Vec<String> {
        m.stats().ids
    }

    // ── walkthrough ───────────────────────────────────────────────────────

    #[test]
    fn two_slot_walkthrough() {
        let ev = events();
        let mut m = manager(2);

        assert!(m.register("a", None, 5, disposer("a", &ev)));
        assert_eq!(m.stats().active, 1);

        assert!(m.register("b", None, 5, disposer("b", &ev)));
        assert_eq!(m.stats().active, 2);

        assert!(!m.register("c", None, 3, None));
        assert_eq!(m.stats().active, 2);
        assert_eq!(ids(&m), ["a", "b"]);

        assert!(m.register("c", None, 10, None));
        assert_eq!(ids(&m), ["b", "c"]);
        assert_eq!(*ev.borrow(), ["dispose a"]);

        m.unregister("b");
        assert_eq!(*ev.borrow(), ["dispose a", "dispose b"]);
        assert_eq!(m.stats().active, 1);

        m.unregister("nonexistent");
        assert_eq!(m.stats().active, 1);
    }

    // ── capacity ──────────────────────────────────────────────────────────

    #[test]
    fn active_never_exceeds_max() {
        let mut m = manager(3);
        for i in 0..20 {
            m.register(&format!("r{i}"), None, i % 11, None);
            assert!(m.stats().active <= 3);
        }
        assert!(m.is_at_capacity());
    }

    #[test]
    fn equal_priority_cannot_evict() {
        let mut m = manager(1);
        assert!(m.register("a", None, 4, None));
        assert!(!m.register("b", None, 4, None));
        assert_eq!(ids(&m), ["a"]);
    }

    #[test]
    fn eviction_picks_lowest_priority_first() {
        let ev = events();
        let mut m = manager(3);
        m.register("high", None, 9, disposer("high", &ev));
        m.register("low", None, 1, disposer("low", &ev));
        m.register("mid", None, 5, disposer("mid", &ev));

        assert!(m.register("new", None, 6, None));
        assert_eq!(ids(&m), ["high", "mid", "new"]);
        assert_eq!(*ev.borrow(), ["dispose low"]);
    }

    #[test]
    fn eviction_tie_breaks_on_oldest() {
        let mut m = manager(2);
        m.register("first", None, 2, None);
        m.register("second", None, 2, None);
        m.register("third", None, 3, None);
        assert_eq!(ids(&m), ["second", "third"]);
    }

    #[test]
    fn priority_update_refreshes_recency() {
        let mut m = manager(2);
        m.register("a", None, 2, None);
        m.register("b", None, 2, None);
        // Same priority, but "a" is now the most recently touched.
        m.update_priority("a", 2);

        assert!(m.register("c", None, 3, None));
        assert_eq!(ids(&m), ["a", "c"]);
    }

    #[test]
    fn priority_update_protects_from_eviction() {
        let mut m = manager(2);
        m.register("a", None, 1, None);
        m.register("b", None, 5, None);
        m.update_priority("a", 9);

        assert!(m.register("c", None, 6, None));
        assert_eq!(ids(&m), ["a", "c"]);
        assert_eq!(m.priority("a"), Some(Priority::new(9)));
    }

    #[test]
    fn zero_budget_rejects_everything() {
        let mut m = manager(0);
        assert!(!m.register("a", None, Priority::MAX, None));
        assert!(m.is_empty());
    }

    // ── registration ──────────────────────────────────────────────────────

    #[test]
    fn reregistering_updates_in_place() {
        let ev = events();
        let mut m = manager(1);
        assert!(m.register("a", None, 3, disposer("a", &ev)));
        assert!(m.register("a", surface("s1", &ev), 7, None));

        assert_eq!(m.stats().active, 1);
        assert_eq!(m.priority("a"), Some(Priority::new(7)));
        assert!(m.has_context("a"));
        // Updating is not destruction.
        assert!(!ev.borrow().iter().any(|e| e.starts_with("dispose")));

        // The original disposer is still attached.
        m.unregister("a");
        assert_eq!(*ev.borrow(), ["acquire s1", "dispose a", "release s1"]);
    }

    #[test]
    fn reregister_with_new_surface_releases_old_context() {
        let ev = events();
        let mut m = manager(1);
        m.register("a", surface("s1", &ev), 5, None);
        m.register("a", surface("s2", &ev), 5, None);

        assert_eq!(m.context("a"), Some(&"s2"));
        assert_eq!(*ev.borrow(), ["acquire s1", "release s1", "acquire s2"]);
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut m = manager(2);
        assert!(!m.register("", None, 5, None));
        assert!(m.is_empty());
    }

    #[test]
    fn rejected_registration_does_not_acquire() {
        let ev = events();
        let mut m = manager(1);
        m.register("a", None, 5, None);
        assert!(!m.register("b", surface("sb", &ev), 5, disposer("b", &ev)));
        assert!(ev.borrow().is_empty());
    }

    #[test]
    fn out_of_range_priority_is_clamped() {
        let mut m = manager(2);
        m.register("a", None, 42, None);
        assert_eq!(m.priority("a"), Some(Priority::MAX));
    }

    #[test]
    fn reregistering_after_unregister_is_fresh() {
        let ev = events();
        let mut m = manager(2);
        m.register("a", surface("s1", &ev), 8, disposer("a", &ev));
        m.unregister("a");
        ev.borrow_mut().clear();

        assert!(m.register("a", None, 2, None));
        assert!(!m.has_context("a"));
        assert_eq!(m.priority("a"), Some(Priority::new(2)));

        // No stale disposer from the first registration.
        m.unregister("a");
        assert!(ev.borrow().is_empty());
    }

    // ── surfaces ──────────────────────────────────────────────────────────

    #[test]
    fn update_surface_attaches_then_replaces() {
        let ev = events();
        let mut m = manager(2);
        m.register("a", None, 5, None);
        assert!(!m.has_context("a"));

        m.update_surface("a", FakeSurface { name: "s1", fail: false, events: ev.clone() });
        assert!(m.has_context("a"));
        assert_eq!(m.stats().active, 1);

        m.update_surface("a", FakeSurface { name: "s2", fail: false, events: ev.clone() });
        assert_eq!(m.context("a"), Some(&"s2"));
        assert_eq!(m.stats().active, 1);
        assert_eq!(*ev.borrow(), ["acquire s1", "release s1", "acquire s2"]);
    }

    #[test]
    fn update_surface_unknown_id_is_noop() {
        let ev = events();
        let mut m = manager(2);
        m.update_surface("ghost", FakeSurface { name: "s", fail: false, events: ev.clone() });
        assert!(m.is_empty());
        assert!(ev.borrow().is_empty());
    }

    #[test]
    fn failed_acquire_keeps_registration_without_context() {
        let ev = events();
        let mut m = manager(2);
        let broken = FakeSurface { name: "broken", fail: true, events: ev.clone() };

        assert!(m.register("a", Some(broken), 5, None));
        assert!(m.contains("a"));
        assert!(!m.has_context("a"));

        m.unregister("a");
        assert!(ev.borrow().is_empty());
    }

    #[test]
    fn context_mut_reaches_granted_context() {
        let ev = events();
        let mut m = manager(1);
        m.register("a", surface("s1", &ev), 5, None);
        assert_eq!(m.context_mut("a").map(|c| *c), Some("s1"));
        assert!(m.context_mut("b").is_none());
    }

    // ── removal ───────────────────────────────────────────────────────────

    #[test]
    fn unregister_disposes_before_release() {
        let ev = events();
        let mut m = manager(2);
        m.register("a", surface("s1", &ev), 5, disposer("a", &ev));
        m.unregister("a");
        assert_eq!(*ev.borrow(), ["acquire s1", "dispose a", "release s1"]);
    }

    #[test]
    fn unregister_twice_is_idempotent() {
        let ev = events();
        let mut m = manager(2);
        m.register("a", None, 5, disposer("a", &ev));
        m.unregister("a");
        m.unregister("a");
        assert_eq!(*ev.borrow(), ["dispose a"]);
        assert!(m.is_empty());
    }

    #[test]
    fn unknown_priority_update_is_noop() {
        let mut m = manager(2);
        m.update_priority("ghost", 3);
        assert!(m.is_empty());
    }

    #[test]
    fn panicking_disposer_does_not_block_eviction() {
        let ev = events();
        let mut m = manager(1);
        m.register("a", surface("s1", &ev), 1, Some(Box::new(explode)));

        assert!(m.register("b", None, 9, None));
        assert_eq!(ids(&m), ["b"]);
        // The context is still handed back after the disposer failed.
        assert_eq!(*ev.borrow(), ["acquire s1", "release s1"]);
    }

    #[test]
    fn cleanup_disposes_everything_once() {
        let ev = events();
        let mut m = manager(3);
        m.register("a", None, 5, disposer("a", &ev));
        m.register("b", surface("sb", &ev), 5, disposer("b", &ev));

        m.cleanup();
        m.cleanup();

        assert!(m.is_empty());
        assert_eq!(*ev.borrow(), ["acquire sb", "dispose a", "dispose b", "release sb"]);
    }

    #[test]
    fn drop_runs_cleanup() {
        let ev = events();
        {
            let mut m = manager(2);
            m.register("a", None, 5, disposer("a", &ev));
        }
        assert_eq!(*ev.borrow(), ["dispose a"]);
    }

    #[test]
    fn built_from_config() {
        let config = BudgetConfig { max_contexts: 4, ..BudgetConfig::default() };
        let m: ContextBudgetManager<FakeSurface> = ContextBudgetManager::new(&config);
        assert_eq!(m.stats(), BudgetStats { active: 0, max: 4, ids: vec![] });
        assert_eq!(m.default_priority(), Priority::default());
    }

    #[test]
    fn configured_default_priority_reaches_registrations() {
        let config = BudgetConfig::from_lookup(|key| {
            (key == crate::config::DEFAULT_PRIORITY_VAR).then(|| "9".to_string())
        })
        .unwrap();
        let mut m: ContextBudgetManager<FakeSurface> = ContextBudgetManager::new(&config);
        assert_eq!(m.default_priority(), Priority::new(9));

        assert!(m.register_default("a", None, None));
        assert_eq!(m.priority("a"), Some(Priority::new(9)));
    }

    #[test]
    fn default_priority_outranks_weaker_registrations() {
        let config = BudgetConfig {
            max_contexts: 1,
            default_priority: Priority::new(7),
        };
        let mut m: ContextBudgetManager<FakeSurface> = ContextBudgetManager::new(&config);
        m.register("weak", None, 3, None);

        assert!(m.register_default("strong", None, None));
        assert_eq!(ids(&m), ["strong"]);
    }
}
