use std::sync::Arc;

use once_cell::sync::OnceCell;

/// Process-wide, load-once slot for an expensive model handle.
///
/// Concurrent first callers block on a single load; a failed load leaves
/// the slot empty so a later call can try again.
pub struct ModelCache<T> {
    cell: OnceCell<Arc<T>>,
}

impl<T> ModelCache<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_load<E, F>(&self, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.cell
            .get_or_try_init(|| load().map(Arc::new))
            .map(Arc::clone)
    }
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
