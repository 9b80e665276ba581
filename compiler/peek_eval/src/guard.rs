//! RAII guard for running code in the debuggee without stopping at
//! breakpoints.

use std::ops::{Deref, DerefMut};

use peek_target::DebugTarget;

/// Disables breakpoints of `target` for its lifetime; dropping it restores
/// whatever state they were in, on every exit path.
pub struct BreakpointsDisabled<'a, T: DebugTarget + ?Sized> {
    target: &'a mut T,
    previous: bool,
}

impl<'a, T: DebugTarget + ?Sized> BreakpointsDisabled<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        let previous = target.breakpoints_enabled();
        target.set_breakpoints_enabled(false);
        BreakpointsDisabled { target, previous }
    }
}

impl<T: DebugTarget + ?Sized> Deref for BreakpointsDisabled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: DebugTarget + ?Sized> DerefMut for BreakpointsDisabled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: DebugTarget + ?Sized> Drop for BreakpointsDisabled<'_, T> {
    fn drop(&mut self) {
        self.target.set_breakpoints_enabled(self.previous);
    }
}
