use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, ThreadId};
use std::time::Duration;

use clistats_core::{
    ChannelInput, FieldValue, InputSource, InputStream, LifecycleState, Statistics, StatsError,
    StatsResult,
};

const WAIT: Duration = Duration::from_secs(5);

/// Input source that fails to acquire while `broken` is set.
struct FlakyInput {
    broken: Arc<AtomicBool>,
}

impl InputSource for FlakyInput {
    fn acquire(&self) -> StatsResult<InputStream> {
        if self.broken.load(Ordering::SeqCst) {
            Err(StatsError::event_source("device busy"))
        } else {
            Ok(InputStream::idle())
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Render callback that reports each call on a channel.
fn reporting_render(tx: mpsc::Sender<ThreadId>) -> impl FnMut(&clistats_core::StatsView<'_>) {
    move |_| {
        let _ = tx.send(thread::current().id());
    }
}

#[test]
fn test_no_lost_updates_while_running() {
    let (input, _trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    stats.add_counter("requests", "Requests sent").unwrap();
    stats
        .start(
            |view| {
                let _ = view.get_counter("requests");
            },
            Duration::from_millis(1),
        )
        .unwrap();

    let callers = 16;
    let per_caller = 5_000;
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let stats = stats.clone();
            thread::spawn(move || {
                for _ in 0..per_caller {
                    stats.increment_counter("requests", 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    stats.stop().unwrap();

    assert_eq!(stats.get_counter("requests"), Some(callers * per_caller));
}

#[test]
fn test_five_concurrent_requests() {
    let stats = Statistics::new();
    stats.add_counter("requests", "").unwrap();

    thread::scope(|scope| {
        for _ in 0..5 {
            scope.spawn(|| stats.increment_counter("requests", 1));
        }
    });

    assert_eq!(stats.get_counter("requests"), Some(5));
}

#[test]
fn test_add_after_start_is_rejected_and_changes_nothing() {
    let stats = Statistics::new();
    stats.add_counter("requests", "").unwrap();
    stats.add_static("start", "", "day is fine").unwrap();
    stats.add_dynamic("one", "", |_| FieldValue::Int(1)).unwrap();
    stats.increment_counter("requests", 7);
    let before = stats.snapshot();

    stats.start(|_| {}, Duration::ZERO).unwrap();
    assert_eq!(stats.add_counter("requests", "reset"), Err(StatsError::AlreadyStarted));
    assert_eq!(stats.add_counter("new", ""), Err(StatsError::AlreadyStarted));
    assert_eq!(
        stats.add_static("start", "", "day is bad"),
        Err(StatsError::AlreadyStarted)
    );
    assert_eq!(
        stats.add_dynamic("two", "", |_| FieldValue::Int(2)),
        Err(StatsError::AlreadyStarted)
    );

    assert_eq!(stats.snapshot(), before);
    assert_eq!(stats.get_static("start"), Some(FieldValue::from("day is fine")));
    stats.stop().unwrap();

    // Registration is open again once stopped.
    stats.add_counter("new", "").unwrap();
    assert_eq!(stats.get_counter("new"), Some(0));
}

#[test]
fn test_dynamic_sum_of_counters() {
    let stats = Statistics::new();
    stats.add_counter("a", "").unwrap();
    stats.add_counter("b", "").unwrap();
    stats
        .add_dynamic("sum", "a + b", |view| {
            let a = view.get_counter("a").unwrap_or(0);
            let b = view.get_counter("b").unwrap_or(0);
            FieldValue::UInt(a + b)
        })
        .unwrap();
    stats.increment_counter("a", 3);
    stats.increment_counter("b", 4);

    let compute = stats.get_dynamic("sum").unwrap();
    assert_eq!(compute(&stats.view()), FieldValue::UInt(7));
}

#[test]
fn test_absent_ids_while_running() {
    let stats = Statistics::new();
    stats.start(|_| {}, Duration::ZERO).unwrap();

    stats.increment_counter("ghost", 1);
    assert_eq!(stats.get_counter("ghost"), None);
    assert_eq!(stats.get_static("ghost"), None);
    assert!(stats.get_dynamic("ghost").is_none());

    stats.stop().unwrap();
}

#[test]
fn test_restart_behaves_like_first_start() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    stats.add_counter("requests", "").unwrap();

    for round in 1..=2_u64 {
        let (tx, rx) = mpsc::channel();
        stats
            .start(
                move |view| {
                    let _ = tx.send(view.get_counter("requests"));
                },
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(stats.state(), LifecycleState::Running);

        stats.increment_counter("requests", 1);
        assert!(trigger.request_refresh());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(round));
        assert!(trigger.request_refresh());
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(round));

        stats.stop().unwrap();
        assert_eq!(stats.state(), LifecycleState::Idle);
        assert!(!trigger.request_refresh());
        // No render after stop returned.
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_double_start_keeps_single_loop() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    let (first_tx, first_rx) = mpsc::channel();
    let (second_tx, second_rx) = mpsc::channel();

    stats.start(reporting_render(first_tx), Duration::ZERO).unwrap();
    assert_eq!(
        stats.start(reporting_render(second_tx), Duration::ZERO),
        Err(StatsError::AlreadyStarted)
    );
    assert_eq!(stats.state(), LifecycleState::Running);

    for _ in 0..5 {
        assert!(trigger.request_refresh());
    }
    let mut threads = HashSet::new();
    for _ in 0..5 {
        threads.insert(first_rx.recv_timeout(WAIT).unwrap());
    }
    stats.stop().unwrap();

    assert_eq!(threads.len(), 1);
    assert!(!threads.contains(&thread::current().id()));
    // The rejected callback was never installed.
    assert!(second_rx.try_recv().is_err());
}

#[test]
fn test_periodic_tick_count() {
    let stats = Statistics::new();
    let renders = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&renders);

    stats
        .start(
            move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(100),
        )
        .unwrap();
    thread::sleep(Duration::from_millis(350));
    stats.stop().unwrap();

    // Pulses at 100/200/300ms; one extra is tolerated for scheduler jitter.
    let renders = renders.load(Ordering::SeqCst);
    assert!((3..=4).contains(&renders), "renders = {renders}");
}

#[test]
fn test_unavailable_input_leaves_registry_idle() {
    let broken = Arc::new(AtomicBool::new(true));
    let stats = Statistics::with_input(FlakyInput {
        broken: Arc::clone(&broken),
    });
    let renders = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&renders);
    let result = stats.start(
        move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        },
        Duration::from_millis(5),
    );
    assert!(matches!(result, Err(StatsError::EventSourceUnavailable(_))));
    assert_eq!(stats.state(), LifecycleState::Idle);
    stats.add_counter("requests", "").unwrap();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    broken.store(false, Ordering::SeqCst);
    stats.start(|_| {}, Duration::from_millis(5)).unwrap();
    stats.stop().unwrap();
}

#[test]
fn test_render_sees_live_counters() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    stats.add_counter("requests", "").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    let sink = Arc::clone(&seen);
    stats
        .start(
            move |view| {
                sink.lock().unwrap().push(view.get_counter("requests").unwrap());
                let _ = tx.send(());
            },
            Duration::ZERO,
        )
        .unwrap();

    for _ in 0..3 {
        stats.increment_counter("requests", 2);
        trigger.request_refresh();
        rx.recv_timeout(WAIT).unwrap();
    }
    stats.stop().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
}

#[test]
fn test_dropping_last_handle_stops_loop() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    stats.start(|_| {}, Duration::from_millis(10)).unwrap();
    assert!(trigger.is_connected());

    drop(stats);

    let deadline = std::time::Instant::now() + WAIT;
    while trigger.is_connected() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!trigger.is_connected());
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while !done() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

/// Render callback that tracks how many renders overlap.
fn overlap_render(
    active: &Arc<AtomicUsize>,
    peak: &Arc<AtomicUsize>,
    entered: mpsc::Sender<()>,
    hold: Duration,
) -> impl FnMut(&clistats_core::StatsView<'_>) + use<> {
    let active = Arc::clone(active);
    let peak = Arc::clone(peak);
    move |_| {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        let _ = entered.send(());
        thread::sleep(hold);
        active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn test_start_waits_for_concurrent_stop() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (first_tx, first_rx) = mpsc::channel();
    stats
        .start(
            overlap_render(&active, &peak, first_tx, Duration::from_millis(500)),
            Duration::ZERO,
        )
        .unwrap();
    assert!(trigger.request_refresh());
    first_rx.recv_timeout(WAIT).unwrap();

    // Stop from another thread; it blocks until the slow render returns.
    let stopper = {
        let stats = stats.clone();
        thread::spawn(move || stats.stop())
    };
    assert!(wait_until(|| stats.state() == LifecycleState::Idle));

    let (second_tx, second_rx) = mpsc::channel();
    stats
        .start(
            overlap_render(&active, &peak, second_tx, Duration::ZERO),
            Duration::ZERO,
        )
        .unwrap();
    // The old loop had fully exited before the new one was spawned.
    assert_eq!(active.load(Ordering::SeqCst), 0);

    assert!(trigger.request_refresh());
    second_rx.recv_timeout(WAIT).unwrap();
    stopper.join().unwrap().unwrap();
    stats.stop().unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_stops_both_wait_for_loop() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    stats
        .start(
            overlap_render(&active, &peak, tx, Duration::from_millis(300)),
            Duration::ZERO,
        )
        .unwrap();
    assert!(trigger.request_refresh());
    rx.recv_timeout(WAIT).unwrap();

    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let stats = stats.clone();
            let active = Arc::clone(&active);
            thread::spawn(move || {
                stats.stop().unwrap();
                active.load(Ordering::SeqCst)
            })
        })
        .collect();
    for stopper in stoppers {
        // Neither stop returns while the render is still in progress.
        assert_eq!(stopper.join().unwrap(), 0);
    }
}

#[test]
fn test_render_panic_returns_registry_to_idle() {
    let (input, trigger) = ChannelInput::new();
    let stats = Statistics::with_input(input);
    stats
        .start(|_| panic!("formatter bug"), Duration::ZERO)
        .unwrap();

    assert!(trigger.request_refresh());
    assert!(wait_until(|| stats.state() == LifecycleState::Idle));
    assert!(wait_until(|| !trigger.is_connected()));

    stats.add_counter("requests", "").unwrap();
    stats.stop().unwrap();

    let (tx, rx) = mpsc::channel();
    stats.start(reporting_render(tx), Duration::ZERO).unwrap();
    assert!(trigger.request_refresh());
    rx.recv_timeout(WAIT).unwrap();
    stats.stop().unwrap();
}
