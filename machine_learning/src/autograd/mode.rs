use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Returns whether operations executed on this thread record a graph.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Restores the previous gradient mode when dropped.
#[must_use = "the gradient mode is restored as soon as the guard is dropped"]
pub struct GradModeGuard {
    prev: bool,
}

impl GradModeGuard {
    fn set(enabled: bool) -> Self {
        let prev = GRAD_ENABLED.with(|cell| cell.replace(enabled));
        Self { prev }
    }
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|cell| cell.set(self.prev));
    }
}

/// Disables graph recording until the returned guard is dropped.
pub fn no_grad() -> GradModeGuard {
    GradModeGuard::set(false)
}

/// Enables graph recording until the returned guard is dropped.
pub fn enable_grad() -> GradModeGuard {
    GradModeGuard::set(true)
}
