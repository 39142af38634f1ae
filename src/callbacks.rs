use alloc::sync::Arc;

/// Notification hooks invoked after successful container operations.
///
/// All methods default to doing nothing, so implementors only override the
/// events they care about. Hooks are never invoked for a failed operation.
///
/// # Examples
///
/// ```rust
/// use core::sync::atomic::AtomicUsize;
/// use core::sync::atomic::Ordering;
/// use std::sync::Arc;
///
/// use robin_heap::Callbacks;
/// use robin_heap::IntervalHeap;
///
/// #[derive(Default)]
/// struct Inserts(AtomicUsize);
///
/// impl Callbacks for Inserts {
///     fn on_create(&self) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let hooks = Arc::new(Inserts::default());
/// let mut heap: IntervalHeap<i32> = IntervalHeap::with_capacity(4).unwrap();
/// heap.set_callbacks(Some(hooks.clone()));
///
/// heap.insert(1).unwrap();
/// heap.insert(2).unwrap();
/// assert_eq!(hooks.0.load(Ordering::Relaxed), 2);
/// ```
pub trait Callbacks: Send + Sync {
    /// An element was inserted.
    fn on_create(&self) {}

    /// An element was looked up.
    fn on_read(&self) {}

    /// An element was replaced or renamed in place.
    fn on_update(&self) {}

    /// An element was removed.
    fn on_delete(&self) {}

    /// The backing store was resized or rehashed.
    fn on_resize(&self) {}
}

/// Shared handle to a set of callbacks.
pub type SharedCallbacks = Arc<dyn Callbacks>;

pub(crate) trait NotifyExt {
    fn notify(&self, event: impl FnOnce(&dyn Callbacks));
}

impl NotifyExt for Option<SharedCallbacks> {
    #[inline]
    fn notify(&self, event: impl FnOnce(&dyn Callbacks)) {
        if let Some(callbacks) = self {
            event(callbacks.as_ref());
        }
    }
}
