//! Supervisor module tests.

mod fake;
mod runner_test;

use std::time::Duration;

/// Poll `cond` until it holds. Meant for paused-clock tests.
pub async fn until(mut cond: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

/// Verify all public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use devloop::supervisor::{
        Backoff, BackoffPolicy, BreakerPolicy, BreakerVerdict, HardExitBreaker,
        SupervisorOptions, SupervisorState, SupervisorStateMachine, SupervisorStats,
        TerminalReason,
    };

    let _ = Backoff::new(BackoffPolicy::default());
    let _ = HardExitBreaker::new(BreakerPolicy::default());
    let _ = SupervisorStateMachine::new();
    let _ = SupervisorOptions::default();
    let _ = SupervisorStats::default();

    let _ = BreakerVerdict::Trip { count: 3 };
    let _ = SupervisorState::Terminal(TerminalReason::GiveUp);
}
