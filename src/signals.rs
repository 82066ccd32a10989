//! Interrupt handling scoped to one in-flight request.
//!
//! [`SignalGuard::install`] records the current dispositions of SIGINT,
//! SIGTERM and SIGHUP, registers tokio listeners that cancel a token, and
//! puts the recorded dispositions back when dropped.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Signals that map to the Cancelled transition.
#[cfg(unix)]
pub const HONORED_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

pub struct SignalGuard {
    listener: Option<JoinHandle<()>>,
    #[cfg(unix)]
    saved: Vec<(libc::c_int, libc::sigaction)>,
}

impl SignalGuard {
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn install(token: CancellationToken) -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        // Record prior dispositions before tokio replaces them.
        let saved = HONORED_SIGNALS
            .iter()
            .map(|&signo| current_disposition(signo).map(|action| (signo, action)))
            .collect::<std::io::Result<Vec<_>>>()?;

        // Built before registering, so a failed registration still restores
        // whatever an earlier one replaced.
        let mut guard = Self {
            listener: None,
            saved,
        };

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;

        guard.listener = Some(tokio::spawn(async move {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = hangup.recv() => "SIGHUP",
            };
            tracing::info!(signal = name, "signal received, cancelling request");
            token.cancel();
        }));

        Ok(guard)
    }

    #[cfg(not(unix))]
    pub fn install(token: CancellationToken) -> std::io::Result<Self> {
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, cancelling request");
                token.cancel();
            }
        });
        Ok(Self {
            listener: Some(listener),
        })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            listener.abort();
        }
        #[cfg(unix)]
        for (signo, action) in &self.saved {
            // SAFETY: `action` was filled in by sigaction for this signal.
            let rc = unsafe { libc::sigaction(*signo, action, std::ptr::null_mut()) };
            if rc != 0 {
                tracing::warn!(
                    signo = *signo,
                    "failed to restore signal disposition: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
    }
}

/// Read the current disposition of `signo` without changing it.
#[cfg(unix)]
pub fn current_disposition(signo: libc::c_int) -> std::io::Result<libc::sigaction> {
    // SAFETY: a zeroed sigaction is a valid out-parameter, and a null `act`
    // makes this a pure query.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signo, std::ptr::null(), &mut action) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(action)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_even_without_a_listener() {
        // The state `install` leaves behind when a later registration fails.
        let signo = libc::SIGUSR2;
        let before = current_disposition(signo).unwrap();
        let guard = SignalGuard {
            listener: None,
            saved: vec![(signo, before)],
        };

        // SAFETY: a zeroed sigaction with SIG_IGN is a valid disposition.
        unsafe {
            let mut ignore: libc::sigaction = std::mem::zeroed();
            ignore.sa_sigaction = libc::SIG_IGN;
            assert_eq!(libc::sigaction(signo, &ignore, std::ptr::null_mut()), 0);
        }
        assert_eq!(current_disposition(signo).unwrap().sa_sigaction, libc::SIG_IGN);

        drop(guard);
        assert_eq!(
            current_disposition(signo).unwrap().sa_sigaction,
            before.sa_sigaction
        );
    }
}
