//! Blocking step gate shared between a stepped session and its sandbox thread.

use std::sync::{Condvar, Mutex, MutexGuard};

use codeflow_core::TraceError;

#[derive(Debug, Default)]
struct Tickets {
    issued: u64,
    released: u64,
    open: bool,
    terminated: bool,
}

/// Suspends the sandbox after each snapshot until the session releases it.
///
/// Each call to [`wait`](StepGate::wait) takes the next ticket; tickets are
/// released in order by [`step`](StepGate::step), so a release issued before
/// the sandbox reaches the gate is not lost.
#[derive(Debug, Default)]
pub struct StepGate {
    tickets: Mutex<Tickets>,
    changed: Condvar,
}

impl StepGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tickets> {
        self.tickets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until this caller's ticket is released, the gate is opened, or
    /// the gate is terminated (which yields `Err(Terminated)`).
    pub fn wait(&self) -> Result<(), TraceError> {
        let mut tickets = self.lock();
        tickets.issued += 1;
        let ticket = tickets.issued;
        loop {
            if tickets.terminated {
                return Err(TraceError::Terminated);
            }
            if tickets.open || tickets.released >= ticket {
                return Ok(());
            }
            tickets = self
                .changed
                .wait(tickets)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Releases the oldest outstanding ticket. With no waiter the release is
    /// banked for the next ticket; releases accumulate rather than coalesce.
    pub fn step(&self) {
        let mut tickets = self.lock();
        tickets.released += 1;
        self.changed.notify_all();
    }

    /// Opens the gate for every current and future ticket.
    pub fn resume(&self) {
        let mut tickets = self.lock();
        tickets.open = true;
        self.changed.notify_all();
    }

    /// Fails every current and future wait. Idempotent.
    pub fn terminate(&self) {
        let mut tickets = self.lock();
        tickets.terminated = true;
        self.changed.notify_all();
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Number of tickets taken so far.
    pub fn waits(&self) -> u64 {
        self.lock().issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn release_before_wait_is_kept() {
        let gate = StepGate::new();
        gate.step();
        assert!(gate.wait().is_ok());
        assert_eq!(gate.waits(), 1);
    }

    #[test]
    fn banked_releases_each_pass_one_wait() {
        let gate = Arc::new(StepGate::new());
        gate.step();
        gate.step();
        assert!(gate.wait().is_ok());
        assert!(gate.wait().is_ok());

        let third = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!third.is_finished());
        gate.terminate();
        assert_eq!(third.join().unwrap(), Err(TraceError::Terminated));
    }

    #[test]
    fn open_gate_passes_everything() {
        let gate = StepGate::new();
        gate.resume();
        for _ in 0..5 {
            assert!(gate.wait().is_ok());
        }
    }

    #[test]
    fn terminate_wakes_blocked_waiter() {
        let gate = Arc::new(StepGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.wait())
        };
        thread::sleep(Duration::from_millis(20));
        gate.terminate();
        gate.terminate();
        assert_eq!(waiter.join().unwrap(), Err(TraceError::Terminated));
        assert!(gate.is_terminated());
    }

    #[test]
    fn steps_release_in_order() {
        let gate = Arc::new(StepGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.wait()?;
                gate.wait()
            })
        };
        gate.step();
        gate.step();
        assert!(waiter.join().unwrap().is_ok());
    }
}
