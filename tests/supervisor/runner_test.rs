//! Integration tests for the per-role run loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use devloop::process::{CommandSpec, ExitReason, GroupSignal, TermSignal};
use devloop::status::{Component, MemoryRenderer, Rendered, StatusAggregator};
use devloop::supervisor::{
    BackoffPolicy, BreakerPolicy, ProcessSupervisor, SupervisorError, SupervisorOptions,
    SupervisorState, TerminalReason,
};

use super::fake::{FakeLauncher, Run};
use super::until;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn options() -> SupervisorOptions {
    SupervisorOptions {
        backoff: BackoffPolicy {
            min: ms(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: false,
        },
        breaker: BreakerPolicy::default(),
        grace: Duration::from_secs(2),
        ready_sentinels: Vec::new(),
    }
}

fn supervisor(
    launcher: &Arc<FakeLauncher>,
    component: Component,
    options: SupervisorOptions,
    cancel: CancellationToken,
) -> ProcessSupervisor {
    ProcessSupervisor::new(
        "api",
        CommandSpec::new("api-server"),
        component,
        launcher.clone(),
        options,
        cancel,
    )
}

#[tokio::test]
async fn gives_up_on_third_crash_within_window() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::crash_after(ms(10))]);
    let renderer = Arc::new(MemoryRenderer::new());
    let mut aggregator = StatusAggregator::new(renderer.clone(), 64, false);
    let component = aggregator.add("api");
    aggregator.start();

    let mut sup = supervisor(&launcher, component, options(), CancellationToken::new());
    let err = assert_err!(sup.run().await);

    assert!(matches!(err, SupervisorError::GaveUp { exits: 3, .. }));
    assert!(err.to_string().contains("`api-server` failed 3 times"));
    assert_eq!(launcher.launches(), 3);
    assert_eq!(launcher.overlapping_launches(), 0);
    assert_eq!(sup.state(), SupervisorState::Terminal(TerminalReason::GiveUp));
    assert_eq!(sup.stats().hard_exits, 3);
    // Whatever the crashed leader left in its group is killed.
    for handle in launcher.handles() {
        assert_eq!(handle.signals(), vec![GroupSignal::Kill]);
    }

    // A terminal supervisor never spawns again.
    assert_eq!(assert_ok!(sup.run().await), TerminalReason::GiveUp);
    assert_eq!(launcher.launches(), 3);

    aggregator.stop().await;
    assert!(renderer.entries().iter().any(|e| matches!(
        e,
        Rendered::Line { line, is_err: true, .. } if line.contains("giving up")
    )));
}

#[tokio::test]
async fn successful_exit_counts_as_crash() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::exit_after(ms(10), ExitReason::Success)]);
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        CancellationToken::new(),
    );

    assert_err!(sup.run().await);
    assert_eq!(launcher.launches(), 3);
}

#[tokio::test]
async fn spawn_failures_count_as_hard_exits() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::fail_spawn()]);
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        CancellationToken::new(),
    );

    let err = assert_err!(sup.run().await);
    assert!(matches!(err, SupervisorError::GaveUp { .. }));
    assert_eq!(sup.stats().spawns, 0);
    assert_eq!(sup.stats().hard_exits, 3);
}

#[tokio::test]
async fn cancellation_signature_ends_supervision() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::exit_after(
        ms(50),
        ExitReason::Signaled(TermSignal::Hangup),
    )]);
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        CancellationToken::new(),
    );

    assert_eq!(assert_ok!(sup.run().await), TerminalReason::ShutDown);
    assert_eq!(launcher.launches(), 1);
    assert_eq!(sup.stats().hard_exits, 0);
}

#[tokio::test]
async fn other_signals_are_crashes() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::exit_after(
        ms(50),
        ExitReason::Signaled(TermSignal::Other(11)),
    )]);
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        CancellationToken::new(),
    );

    assert_err!(sup.run().await);
    assert_eq!(launcher.launches(), 3);
}

#[tokio::test]
async fn backoff_grows_and_resets_after_window() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![
        Run::crash_after(ms(10)),
        Run::crash_after(ms(10)),
        Run::crash_after(Duration::from_secs(7)),
        Run::crash_after(ms(10)),
        Run::hang(),
    ]);
    let cancel = CancellationToken::new();
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        cancel.clone(),
    );
    let task = tokio::spawn(async move {
        let result = sup.run().await;
        (result, sup)
    });

    until(|| launcher.launches() == 5).await;
    cancel.cancel();
    let (result, sup) = task.await.unwrap();
    assert_eq!(assert_ok!(result), TerminalReason::ShutDown);
    assert_eq!(sup.stats().hard_exits, 4);
    assert_eq!(launcher.overlapping_launches(), 0);

    let times = launcher.launch_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    // Run time plus backoff: 10+100, 10+200, then a fresh window, 7000+100, 10+200.
    let expected = [ms(110), ms(210), ms(7100), ms(210)];
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(
            *gap >= want && *gap < want + ms(5),
            "gap {gap:?}, expected {want:?}"
        );
    }
}

#[tokio::test]
async fn clean_restarts_do_not_count_as_crashes() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::hang()]);
    let cancel = CancellationToken::new();
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        cancel.clone(),
    );
    let trigger = sup.restart_trigger();
    let task = tokio::spawn(async move {
        let result = sup.run().await;
        (result, sup)
    });

    for _ in 0..5 {
        until(|| trigger.has_live_child()).await;
        assert!(trigger.request_restart());
        // The child is gone until the run loop spawns the next one.
        assert!(!trigger.request_restart());
    }
    until(|| trigger.has_live_child()).await;

    cancel.cancel();
    let (result, sup) = task.await.unwrap();
    assert_eq!(assert_ok!(result), TerminalReason::ShutDown);

    let stats = sup.stats();
    assert_eq!(stats.spawns, 6);
    assert_eq!(stats.clean_restarts, 5);
    assert_eq!(stats.hard_exits, 0);
    assert_eq!(sup.hard_exit_count(), 0);
    assert_eq!(launcher.overlapping_launches(), 0);

    for handle in launcher.handles() {
        assert_eq!(
            handle.signals(),
            vec![GroupSignal::Interrupt, GroupSignal::Kill]
        );
    }
}

#[tokio::test]
async fn shutdown_escalates_to_kill_after_grace() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::hang().ignoring_interrupt()]);
    let cancel = CancellationToken::new();
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        cancel.clone(),
    );
    let trigger = sup.restart_trigger();
    let task = tokio::spawn(async move { sup.run().await });

    until(|| trigger.has_live_child()).await;
    let started = tokio::time::Instant::now();
    cancel.cancel();

    assert_eq!(assert_ok!(task.await.unwrap()), TerminalReason::ShutDown);
    assert!(started.elapsed() >= Duration::from_secs(2));
    let handles = launcher.handles();
    assert_eq!(handles.len(), 1);
    // Escalation, then the reap once the leader is gone.
    assert_eq!(
        handles[0].signals(),
        vec![GroupSignal::Interrupt, GroupSignal::Kill, GroupSignal::Kill]
    );
}

#[tokio::test]
async fn restart_of_stubborn_child_is_still_clean() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::hang().ignoring_interrupt(), Run::hang()]);
    let cancel = CancellationToken::new();
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        cancel.clone(),
    );
    let trigger = sup.restart_trigger();
    let task = tokio::spawn(async move {
        let result = sup.run().await;
        (result, sup)
    });

    until(|| trigger.has_live_child()).await;
    assert!(trigger.request_restart());
    until(|| launcher.launches() == 2 && trigger.has_live_child()).await;

    cancel.cancel();
    let (result, sup) = task.await.unwrap();
    assert_ok!(result);
    assert_eq!(sup.stats().clean_restarts, 1);
    assert_eq!(sup.stats().hard_exits, 0);
    assert_eq!(launcher.overlapping_launches(), 0);
    assert_eq!(
        launcher.handles()[0].signals(),
        vec![GroupSignal::Interrupt, GroupSignal::Kill, GroupSignal::Kill]
    );
}

#[tokio::test]
async fn restarts_racing_exits_never_overlap_children() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::crash_after(ms(5))]);
    let cancel = CancellationToken::new();
    let mut opts = options();
    opts.backoff.min = ms(1);
    opts.backoff.max = ms(1);
    opts.breaker = BreakerPolicy {
        threshold: 1000,
        window: Duration::from_secs(60),
    };
    let mut sup = supervisor(&launcher, Component::detached("api"), opts, cancel.clone());
    let trigger = sup.restart_trigger();
    let task = tokio::spawn(async move {
        let result = sup.run().await;
        (result, sup)
    });

    // Requests land before, during and after the child's own exit.
    for i in 0..300u64 {
        trigger.request_restart();
        tokio::time::sleep(ms(i % 7)).await;
    }

    cancel.cancel();
    let (result, sup) = task.await.unwrap();
    assert_eq!(assert_ok!(result), TerminalReason::ShutDown);
    assert_eq!(launcher.overlapping_launches(), 0);
    assert!(launcher.handles().iter().all(|h| h.reaped()));

    let stats = sup.stats();
    assert!(stats.clean_restarts > 0);
    assert!(stats.hard_exits > 0);
}

#[tokio::test]
async fn sentinel_marks_ready_then_restart_refreshes() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![
        Run::hang().with_stdout(b"compiling\nlistening on :3000\n")
    ]);
    let renderer = Arc::new(MemoryRenderer::new());
    let mut aggregator = StatusAggregator::new(renderer.clone(), 64, false);
    let component = aggregator.add("api");
    aggregator.start();

    let cancel = CancellationToken::new();
    let mut opts = options();
    opts.ready_sentinels = vec!["listening on".to_string()];
    let mut sup = supervisor(&launcher, component, opts, cancel.clone());
    let trigger = sup.restart_trigger();
    let task = tokio::spawn(async move { sup.run().await });

    until(|| aggregator.all_ready()).await;
    until(|| trigger.has_live_child()).await;
    assert!(trigger.request_restart());
    until(|| {
        renderer
            .entries()
            .contains(&Rendered::Refreshed("api".to_string()))
    })
    .await;

    cancel.cancel();
    assert_ok!(task.await.unwrap());
    aggregator.stop().await;

    let entries = renderer.entries();
    assert_eq!(entries[0], Rendered::AllReady(vec!["api".to_string()]));
    assert_eq!(renderer.all_ready_count(), 1);
    assert!(entries.contains(&Rendered::Line {
        component: "api".to_string(),
        line: "compiling".to_string(),
        is_err: false,
    }));
}

#[tokio::test]
async fn state_is_observable() {
    tokio::time::pause();
    let launcher = FakeLauncher::new(vec![Run::hang()]);
    let cancel = CancellationToken::new();
    let mut sup = supervisor(
        &launcher,
        Component::detached("api"),
        options(),
        cancel.clone(),
    );
    let mut states = sup.subscribe();
    assert_eq!(*states.borrow(), SupervisorState::Idle);

    let task = tokio::spawn(async move { sup.run().await });
    assert_ok!(states.wait_for(|s| *s == SupervisorState::Running).await);

    cancel.cancel();
    assert_ok!(
        states
            .wait_for(|s| *s == SupervisorState::Terminal(TerminalReason::ShutDown))
            .await
    );
    assert_ok!(task.await.unwrap());
}
