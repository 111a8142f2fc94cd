//! Signal handling runs in its own test binary so raised signals cannot reach
//! other suites.

use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::low_level::raise;

use siftd::{ShutdownToken, install_signal_handlers};

fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn second_signal_escalates_to_force() {
    let token = ShutdownToken::new();
    let listener = install_signal_handlers(&token).expect("install handlers");

    raise(SIGTERM).expect("raise SIGTERM");
    assert!(eventually(|| token.drain_requested()), "drain never requested");
    assert!(!token.force_requested());

    raise(SIGINT).expect("raise SIGINT");
    assert!(eventually(|| token.force_requested()), "force never requested");
    assert!(
        token
            .force_flag()
            .load(std::sync::atomic::Ordering::SeqCst)
    );

    drop(listener);
}
