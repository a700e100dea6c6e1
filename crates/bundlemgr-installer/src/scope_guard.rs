/// Runs a compensating action when dropped unless `dismiss` was called first.
///
/// Guards declared later in a scope drop first, so compensations run in reverse order of
/// registration.
pub struct ScopeGuard<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }

    pub fn dismiss(&mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}
