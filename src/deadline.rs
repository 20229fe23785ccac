//! Best-effort soft deadline for a scoped unit of work.
//!
//! Two backends. On unix, a SIGALRM alarm whose handler sets a flag: the
//! signal interrupts blocking syscalls, and the flag plus elapsed time are
//! checked when the unit returns. Elsewhere, a background timer thread sets
//! an atomic flag that is checked only when the unit naturally returns, so
//! a truly stuck unit cannot be preempted (a documented limitation). A
//! deadline of zero (or a failed arm) degrades to a passthrough that runs
//! the unit unenforced rather than refusing to run it.
//!
//! The unix backend restores the previous SIGALRM action and cancels any
//! pending alarm on every exit path, including unwinds out of the unit.

use std::fmt;

/// The unit of work missed its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExpired {
    /// The deadline that was missed, in seconds.
    pub secs: u64,
}

impl fmt::Display for DeadlineExpired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline of {}s expired", self.secs)
    }
}

impl std::error::Error for DeadlineExpired {}

/// Runs `unit` under a soft deadline of `secs` seconds.
///
/// A deadline of zero disables enforcement entirely.
pub fn run_with_deadline<T>(
    secs: u64,
    unit: impl FnOnce() -> T,
) -> Result<T, DeadlineExpired> {
    if secs == 0 {
        return Ok(unit());
    }
    backend::run(secs, unit)
}

#[cfg(unix)]
mod backend {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    use super::DeadlineExpired;

    // The alarm is process-global, so armed sections serialize: a second
    // caller waits rather than clobbering the pending alarm.
    static ALARM_LOCK: Mutex<()> = Mutex::new(());
    static FIRED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_alarm(_signal: libc::c_int) {
        FIRED.store(true, Ordering::SeqCst);
    }

    /// Arms the alarm and restores the prior state on drop, whichever exit
    /// path runs: normal return, early return, or unwind.
    struct AlarmGuard {
        previous: SigAction,
    }

    impl AlarmGuard {
        fn arm(secs: u64) -> Option<Self> {
            FIRED.store(false, Ordering::SeqCst);
            let action = SigAction::new(
                SigHandler::Handler(on_alarm),
                SaFlags::empty(),
                SigSet::empty(),
            );
            let previous = unsafe { sigaction(Signal::SIGALRM, &action) }.ok()?;
            unsafe { libc::alarm(secs.min(libc::c_uint::MAX as u64) as libc::c_uint) };
            Some(Self { previous })
        }
    }

    impl Drop for AlarmGuard {
        fn drop(&mut self) {
            unsafe {
                libc::alarm(0);
                let _ = sigaction(Signal::SIGALRM, &self.previous);
            }
        }
    }

    pub(super) fn run<T>(secs: u64, unit: impl FnOnce() -> T) -> Result<T, DeadlineExpired> {
        let _lock = ALARM_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match AlarmGuard::arm(secs) {
            Some(guard) => {
                let value = unit();
                drop(guard);
                if FIRED.swap(false, Ordering::SeqCst) {
                    Err(DeadlineExpired { secs })
                } else {
                    Ok(value)
                }
            }
            // Arming failed: run unenforced rather than refusing to run.
            None => Ok(unit()),
        }
    }
}

#[cfg(not(unix))]
mod backend {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::DeadlineExpired;

    pub(super) fn run<T>(secs: u64, unit: impl FnOnce() -> T) -> Result<T, DeadlineExpired> {
        let fired = Arc::new(AtomicBool::new(false));
        let (cancel, timer) = mpsc::channel::<()>();

        let watcher_flag = Arc::clone(&fired);
        let watcher = thread::spawn(move || {
            // A cancel message (or a dropped sender) ends the timer early.
            if timer.recv_timeout(Duration::from_secs(secs)).is_err() {
                watcher_flag.store(true, Ordering::SeqCst);
            }
        });

        let value = unit();

        let _ = cancel.send(());
        let _ = watcher.join();

        if fired.load(Ordering::SeqCst) {
            Err(DeadlineExpired { secs })
        } else {
            Ok(value)
        }
    }
}
