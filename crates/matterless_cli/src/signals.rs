//! Ctrl-C handling: the first SIGINT/SIGTERM cancels running syncs, which
//! then persist what they merged; a second one exits immediately.

use matterless::CancelSignal;

/// Exit status for a second interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Keeps the signal listener alive; dropping it restores default handling.
#[cfg(unix)]
pub struct CancelOnSignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl Drop for CancelOnSignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(not(unix))]
pub struct CancelOnSignalGuard;

/// Sets `cancel` on SIGINT/SIGTERM.
#[cfg(unix)]
pub fn cancel_on_signal(cancel: CancelSignal) -> std::io::Result<CancelOnSignalGuard> {
    use std::sync::atomic::Ordering;

    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM])?;
    let handle = signals.handle();
    let thread = std::thread::spawn(move || {
        for signal in signals.forever() {
            if cancel.swap(true, Ordering::AcqRel) {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            tracing::warn!(signal, "interrupted; stopping after the current page");
        }
    });

    Ok(CancelOnSignalGuard {
        handle,
        thread: Some(thread),
    })
}

#[cfg(not(unix))]
pub fn cancel_on_signal(_cancel: CancelSignal) -> std::io::Result<CancelOnSignalGuard> {
    Ok(CancelOnSignalGuard)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use matterless::never_cancel;

    use super::*;

    #[test]
    fn guard_installs_and_releases_without_touching_the_flag() {
        let cancel = never_cancel();

        let guard = cancel_on_signal(cancel.clone()).expect("signal handlers should register");
        drop(guard);

        assert!(!cancel.load(Ordering::Acquire));
    }
}
