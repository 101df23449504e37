//! State-change listener registry

use super::ControllerCore;
use cthread_core::{thread_err, StateTransition, ThreadResult};
use core::fmt;

/// Handle returned by listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run on every completed transition
///
/// Runs on the thread performing the transition with the controller's state
/// lock held. It may call the lock-free accessors (`state()`, `name()`,
/// `cycle_count()`, `lwpid()`), but nothing that takes the state lock, and it
/// must not (un)register listeners on the same controller.
pub type StateChangeListener = Box<dyn Fn(&ControllerCore, StateTransition) + Send + Sync>;

pub(crate) struct ListenerRegistry {
    next: u64,
    entries: Vec<(ListenerHandle, StateChangeListener)>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self { next: 0, entries: Vec::new() }
    }

    pub(crate) fn register(&mut self, listener: StateChangeListener) -> ListenerHandle {
        let handle = ListenerHandle(self.next);
        self.next += 1;
        self.entries.push((handle, listener));
        handle
    }

    pub(crate) fn unregister(&mut self, handle: ListenerHandle) -> ThreadResult<()> {
        match self.entries.iter().position(|(h, _)| *h == handle) {
            Some(pos) => {
                self.entries.swap_remove(pos);
                Ok(())
            }
            None => Err(thread_err!(
                NotRegistered,
                "cannot unregister unknown state change listener handle '{}'",
                handle
            )),
        }
    }

    pub(crate) fn notify(&self, core: &ControllerCore, transition: StateTransition) {
        for (_, listener) in &self.entries {
            listener(core, transition);
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
