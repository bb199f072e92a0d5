//! Terminators for stopping long-running presolve and symmetry passes.
//!
//! This module provides several implementations of the [`Terminator`] trait, including:
//! - [`InterruptTerminator`]: Responds to Ctrl-C (SIGINT) or programmatic interrupts.
//! - [`TimeOutTerminator`]: Terminates after a specified time limit.
//! - [`StopFlagTerminator`]: Mirrors a host-owned stop flag.
//! - [`MultipleTerminators`]: Combines multiple terminators.
//!
//! The sparsifier and the symmetry pipeline poll their terminator at coarse
//! iteration boundaries (per row, per component) and return cleanly with
//! partial results when it fires.
//!
//! # Note
//! [`InterruptTerminator`] installs a global signal handler and **can only be constructed once** per process. Attempting to create multiple instances will result in a panic.

use std::sync::{Arc, atomic::AtomicBool};

/// Why a pass was asked to stop.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StopReason {
    /// Interrupted by the user or a signal.
    Interrupted,
    /// A time limit was reached.
    TimeLimit,
    /// The host requested a stop.
    HostStop,
}

pub trait Terminator {
    fn initialize(&mut self) {}

    fn terminate(&mut self) -> Option<StopReason>;
}

/// Terminator that never fires; the default for embedded use where the host
/// polls its own limits.
pub struct NeverTerminator;

impl Terminator for NeverTerminator {
    fn terminate(&mut self) -> Option<StopReason> {
        None
    }
}

/// Terminator that responds to Ctrl-C (SIGINT) or programmatic interrupts.
///
/// # Note
/// Only one instance of `InterruptTerminator` can be constructed per process, as it installs a global signal handler.
/// Creating more than one will panic.
pub struct InterruptTerminator {
    interrupted: Arc<AtomicBool>,
}

impl InterruptTerminator {
    pub fn new() -> Self {
        let interrupted = Arc::new(AtomicBool::new(false));
        ctrlc::set_handler({
            let interrupted_clone = interrupted.clone();
            move || {
                interrupted_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        })
        .expect("Error setting Ctrl-C handler");
        Self { interrupted }
    }

    pub fn interrupt(&mut self) {
        self.interrupted.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Terminator for InterruptTerminator {
    fn terminate(&mut self) -> Option<StopReason> {
        if self.interrupted.load(std::sync::atomic::Ordering::SeqCst) {
            Some(StopReason::Interrupted)
        } else {
            None
        }
    }
}

/// Terminator that triggers after a specified number of seconds.
pub struct TimeOutTerminator {
    max_time_secs: u64,
    start_time: std::time::Instant,
}

impl TimeOutTerminator {
    pub fn new(max_time_secs: u64) -> Self {
        Self {
            max_time_secs,
            start_time: std::time::Instant::now(),
        }
    }
}

impl Terminator for TimeOutTerminator {
    fn initialize(&mut self) {
        self.start_time = std::time::Instant::now();
    }

    fn terminate(&mut self) -> Option<StopReason> {
        if self.start_time.elapsed().as_secs() >= self.max_time_secs {
            Some(StopReason::TimeLimit)
        } else {
            None
        }
    }
}

/// Terminator mirroring a stop flag shared with the host; fires as soon as
/// the host raises it.
pub struct StopFlagTerminator {
    flag: Arc<AtomicBool>,
}

impl StopFlagTerminator {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }
}

impl Terminator for StopFlagTerminator {
    fn terminate(&mut self) -> Option<StopReason> {
        if self.flag.load(std::sync::atomic::Ordering::SeqCst) {
            Some(StopReason::HostStop)
        } else {
            None
        }
    }
}

/// Terminator that combines multiple terminators and triggers if any of them do.
pub struct MultipleTerminators {
    terminators: Vec<Box<dyn Terminator>>,
}

impl MultipleTerminators {
    pub fn new(terminators: Vec<Box<dyn Terminator>>) -> Self {
        Self { terminators }
    }
}

impl Terminator for MultipleTerminators {
    fn initialize(&mut self) {
        for terminator in &mut self.terminators {
            terminator.initialize();
        }
    }

    fn terminate(&mut self) -> Option<StopReason> {
        for terminator in &mut self.terminators {
            if let Some(reason) = terminator.as_mut().terminate() {
                return Some(reason);
            }
        }
        None
    }
}
