/// LIFO stack of undo actions.
///
/// Push an action right after each successful acquisition. Dropping the stack
/// (any early return or `?`) runs the actions newest first; [`commit`](Self::commit)
/// discards them once the whole sequence has succeeded.
pub struct UndoStack<'a> {
    actions: Vec<(&'static str, Box<dyn FnOnce() + 'a>)>,
}

impl<'a> UndoStack<'a> {
    pub fn new() -> Self {
        Self { actions: Vec::new() }
    }

    pub fn push(&mut self, label: &'static str, action: impl FnOnce() + 'a) {
        self.actions.push((label, Box::new(action)));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs all pending actions, newest first. Safe to call repeatedly.
    pub fn unwind(&mut self) {
        while let Some((label, action)) = self.actions.pop() {
            tracing::trace!(target: "novade_vulkan_bootstrap", "undo: {}", label);
            action();
        }
    }

    /// Forgets every pending action.
    pub fn commit(mut self) {
        self.actions.clear();
    }
}

impl Default for UndoStack<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UndoStack<'_> {
    fn drop(&mut self) {
        self.unwind();
    }
}
