//! Group barrier: one state request applied to many controllers at once
//!
//! Each eligible member gets a short-lived scoped helper thread that issues
//! the request and blocks until the member has assumed the new state. When
//! the target is Go, members additionally meet at a rendezvous inside their
//! yield point so that their first Go cycle bodies start together.

use crate::controller::ControllerCore;
use crossbeam_queue::SegQueue;
use cthread_core::{kdebug, kinvariant, thread_err, State, ThreadError, ThreadResult};
use parking_lot::{Condvar, Mutex};
use std::ptr;
use std::sync::Arc;
use std::thread;

/// Countdown shared by the members of one group Go request
///
/// Starts at the number of members. Members that turn out to be ineligible
/// are released by the issuer; every other member arrives exactly once,
/// from its yield point or from the thread wrapper if it finishes first.
pub(crate) struct GoRendezvous {
    pending: Mutex<usize>,
    all_arrived: Condvar,
}

impl GoRendezvous {
    pub(crate) fn new(members: usize) -> Self {
        Self {
            pending: Mutex::new(members),
            all_arrived: Condvar::new(),
        }
    }

    /// Take `n` members out of the count without them arriving
    pub(crate) fn release(&self, n: usize) {
        let mut pending = self.pending.lock();
        Self::count_down(&mut pending, n);
        if *pending == 0 {
            self.all_arrived.notify_all();
        }
    }

    /// Arrive without waiting for the others
    #[inline]
    pub(crate) fn arrive(&self) {
        self.release(1);
    }

    /// Arrive and block until every member has arrived
    pub(crate) fn arrive_and_wait(&self) {
        let mut pending = self.pending.lock();
        Self::count_down(&mut pending, 1);
        if *pending == 0 {
            self.all_arrived.notify_all();
            return;
        }
        while *pending > 0 {
            self.all_arrived.wait(&mut pending);
        }
    }

    /// Block until every member has arrived or been released
    pub(crate) fn wait_all(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.all_arrived.wait(&mut pending);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        *self.pending.lock()
    }

    fn count_down(pending: &mut usize, n: usize) {
        if kinvariant!(*pending >= n, "group rendezvous count underflow ({} - {})", *pending, n) {
            *pending -= n;
        } else {
            *pending = 0;
        }
    }
}

/// One member that did not reach the requested state
#[derive(Debug, Clone)]
pub struct StateChangeFailure {
    /// Position of the member in the slice passed to [`apply_to_all`]
    pub index: usize,
    pub name: String,
    pub error: ThreadError,
}

impl StateChangeFailure {
    fn new(index: usize, controller: &ControllerCore, error: ThreadError) -> Self {
        Self {
            index,
            name: controller.name().to_string(),
            error,
        }
    }
}

/// Request `new_state` on every controller concurrently
///
/// Returns once every member has assumed `new_state` or failed. Always
/// returns `Ok(())`: per-member failures are appended to `failures_out`,
/// ordered by index. Members that are Exiting or Exited, already in another
/// group rendezvous, or owned by the calling thread are recorded as failures
/// up front and never attempted. A controller listed twice is requested once.
///
/// Idle, Go, Exiting and Exited are accepted as targets. For Exited each
/// member is asked to exit and then waited on.
pub fn apply_to_all(
    controllers: &[&ControllerCore],
    new_state: State,
    failures_out: Option<&mut Vec<StateChangeFailure>>,
) -> ThreadResult<()> {
    let failures = SegQueue::new();

    if !matches!(new_state, State::Idle | State::Go | State::Exiting | State::Exited) {
        for (index, &controller) in controllers.iter().enumerate() {
            failures.push(StateChangeFailure::new(
                index,
                controller,
                thread_err!(InvalidArgument, "{} cannot be requested for a group", new_state),
            ));
        }
        return finish(failures, controllers.len(), new_state, failures_out);
    }

    let rendezvous =
        (new_state == State::Go).then(|| Arc::new(GoRendezvous::new(controllers.len())));
    let release = |n: usize| {
        if let Some(rendezvous) = &rendezvous {
            rendezvous.release(n);
        }
    };

    // Enlisting happens before any helper runs, so no member can be asked
    // to move while another is still being checked.
    let mut eligible = Vec::with_capacity(controllers.len());
    for (index, &controller) in controllers.iter().enumerate() {
        if controllers[..index].iter().any(|&other| ptr::eq(other, controller)) {
            release(1);
            continue;
        }
        match controller.prepare_group_request(rendezvous.as_ref()) {
            Ok(()) => eligible.push((index, controller)),
            Err(e) => {
                release(1);
                failures.push(StateChangeFailure::new(index, controller, e));
            }
        }
    }

    thread::scope(|scope| {
        for &(index, controller) in &eligible {
            let failures = &failures;
            let spawned = thread::Builder::new()
                .name(format!("{}-group", controller.name()))
                .spawn_scoped(scope, move || {
                    if let Err(e) = controller.apply_group_request(new_state) {
                        failures.push(StateChangeFailure::new(index, controller, e));
                    }
                });
            if let Err(e) = spawned {
                if controller.cancel_group_request() {
                    release(1);
                }
                let error = ThreadError::from(e).prepend("spawn group helper");
                failures.push(StateChangeFailure::new(index, controller, error));
            }
        }
        if let Some(rendezvous) = &rendezvous {
            rendezvous.wait_all();
        }
    });

    finish(failures, controllers.len(), new_state, failures_out)
}

fn finish(
    failures: SegQueue<StateChangeFailure>,
    members: usize,
    new_state: State,
    failures_out: Option<&mut Vec<StateChangeFailure>>,
) -> ThreadResult<()> {
    let mut collected: Vec<_> = std::iter::from_fn(|| failures.pop()).collect();
    collected.sort_by_key(|f| f.index);
    if !collected.is_empty() {
        kdebug!(
            "group request {}: {} of {} members failed",
            new_state,
            collected.len(),
            members
        );
    }
    if let Some(out) = failures_out {
        out.extend(collected);
    }
    Ok(())
}
