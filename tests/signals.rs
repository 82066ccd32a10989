//! Real signal delivery. Kept to a single test: dispositions are process-wide,
//! so a second concurrent test could restore SIGHUP to its default while this
//! one is raising it.

#![cfg(unix)]

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use codeask::signals::{HONORED_SIGNALS, SignalGuard, current_disposition};

#[tokio::test]
async fn hangup_cancels_token_and_guard_restores_dispositions() {
    let before: Vec<_> = HONORED_SIGNALS
        .iter()
        .map(|&signo| current_disposition(signo).unwrap().sa_sigaction)
        .collect();

    let token = CancellationToken::new();
    let guard = SignalGuard::install(token.clone()).unwrap();

    let installed = current_disposition(libc::SIGHUP).unwrap().sa_sigaction;
    assert_ne!(installed, libc::SIG_DFL, "a handler is installed while guarded");

    // SAFETY: raising a signal we have a handler for.
    unsafe {
        libc::raise(libc::SIGHUP);
    }
    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
        .await
        .expect("SIGHUP should cancel the token");

    drop(guard);

    let after: Vec<_> = HONORED_SIGNALS
        .iter()
        .map(|&signo| current_disposition(signo).unwrap().sa_sigaction)
        .collect();
    assert_eq!(before, after, "dispositions restored after the request");
}
