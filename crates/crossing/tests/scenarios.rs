//! Multi-threaded crossing scenarios.
//!
//! These drive the public API the way a crosser lifecycle driver would and
//! check the capacity, direction and fairness rules under real contention.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crossing::{Arbiter, AsyncArbiter, Phase, Side};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn eventually(mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    f()
}

/// Occupancy observed by the crossers themselves.
#[derive(Default)]
struct Occupancy {
    on: [AtomicUsize; 2],
}

impl Occupancy {
    fn slot(side: Side) -> usize {
        match side {
            Side::East => 0,
            Side::West => 1,
        }
    }

    /// Record a crosser stepping on and check nobody travels the other way.
    fn step_on(&self, side: Side, capacity: usize) {
        let mine = self.on[Self::slot(side)].fetch_add(1, Ordering::SeqCst) + 1;
        let theirs = self.on[Self::slot(side.opposite())].load(Ordering::SeqCst);
        assert!(mine <= capacity, "{mine} {side} crossers on a channel of {capacity}");
        assert_eq!(theirs, 0, "{side} crosser admitted while {theirs} travel the other way");
    }

    fn step_off(&self, side: Side) {
        self.on[Self::slot(side)].fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn capacity_two_reversal_scenario() {
    let arbiter = Arc::new(Arbiter::new(2).unwrap());

    // Crosser 1: admitted, direction east.
    arbiter.enter(Side::East);
    assert_eq!(arbiter.snapshot().phase(), Phase::Active { direction: Side::East });

    // Crosser 2: west, blocks and marks the reversal.
    let (west_in_tx, west_in_rx) = mpsc::channel();
    let (west_out_tx, west_out_rx) = mpsc::channel::<()>();
    let crosser2 = {
        let arbiter = Arc::clone(&arbiter);
        thread::spawn(move || {
            arbiter.enter(Side::West);
            west_in_tx.send(arbiter.snapshot()).unwrap();
            west_out_rx.recv().unwrap();
            arbiter.leave(Side::West).unwrap();
        })
    };
    assert!(eventually(|| {
        let snap = arbiter.snapshot();
        snap.pending_direction == Some(Side::West) && snap.waiting_west == 1
    }));

    // Crosser 3: east again, but the pending reversal stops east renewal.
    let (east_in_tx, east_in_rx) = mpsc::channel();
    let crosser3 = {
        let arbiter = Arc::clone(&arbiter);
        thread::spawn(move || {
            arbiter.enter(Side::East);
            east_in_tx.send(arbiter.snapshot()).unwrap();
            arbiter.leave(Side::East).unwrap();
        })
    };
    assert!(eventually(|| arbiter.snapshot().waiting_east == 1));
    let snap = arbiter.snapshot();
    assert_eq!(snap.occupants, 1);
    assert_eq!(
        snap.phase(),
        Phase::Reversing {
            direction: Side::East,
            next: Side::West
        }
    );

    // Crosser 1 leaves: channel empties, reversal adopted, crosser 2 proceeds.
    arbiter.leave(Side::East).unwrap();
    let seen = west_in_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(seen.direction, Some(Side::West));
    assert!(seen.occupants >= 1);
    assert_eq!(seen.stats.reversals, 1);

    // Crosser 3 now asks for its own reversal and waits for crosser 2.
    assert!(eventually(|| arbiter.snapshot().pending_direction == Some(Side::East)));
    assert!(east_in_rx.try_recv().is_err());

    west_out_tx.send(()).unwrap();
    let seen = east_in_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(seen.direction, Some(Side::East));
    assert_eq!(seen.stats.reversals, 2);

    crosser2.join().unwrap();
    crosser3.join().unwrap();
    assert!(arbiter.snapshot().is_idle());
}

#[test]
fn whole_blocked_side_boards_after_reversal() {
    let arbiter = Arc::new(Arbiter::new(5).unwrap());
    arbiter.enter(Side::East);

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Arc::new(std::sync::Mutex::new(release_rx));
    let west: Vec<_> = (0..4)
        .map(|_| {
            let arbiter = Arc::clone(&arbiter);
            let release_rx = Arc::clone(&release_rx);
            thread::spawn(move || {
                arbiter.enter(Side::West);
                release_rx.lock().unwrap().recv().unwrap();
                arbiter.leave(Side::West).unwrap();
            })
        })
        .collect();
    assert!(eventually(|| arbiter.snapshot().waiting_west == 4));
    assert_eq!(arbiter.snapshot().pending_direction, Some(Side::West));

    let east = {
        let arbiter = Arc::clone(&arbiter);
        thread::spawn(move || {
            arbiter.enter(Side::East);
            arbiter.leave(Side::East).unwrap();
        })
    };
    assert!(eventually(|| arbiter.snapshot().waiting_east == 1));

    arbiter.leave(Side::East).unwrap();

    // Every west crosser that asked for the reversal gets on before east
    // traffic can claim the channel back.
    assert!(eventually(|| {
        let snap = arbiter.snapshot();
        snap.occupants == 4 && snap.waiting_west == 0
    }));
    let snap = arbiter.snapshot();
    assert_eq!(snap.direction, Some(Side::West));
    assert_eq!(snap.stats.admitted_west, 4);
    assert!(eventually(|| arbiter.snapshot().pending_direction == Some(Side::East)));

    for _ in 0..4 {
        release_tx.send(()).unwrap();
    }
    for handle in west {
        handle.join().unwrap();
    }
    east.join().unwrap();

    let snap = arbiter.snapshot();
    assert!(snap.is_idle());
    assert_eq!(snap.stats.admitted_east, 2);
    assert_eq!(snap.stats.reversals, 2);
}

#[test]
fn continuous_stream_yields_to_pending_reversal() {
    let arbiter = Arc::new(Arbiter::new(3).unwrap());
    let stop = Arc::new(AtomicBool::new(false));

    let stream: Vec<_> = (0..4)
        .map(|_| {
            let arbiter = Arc::clone(&arbiter);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut crossings = 0u64;
                while !stop.load(Ordering::SeqCst) {
                    let passage = arbiter.cross(Side::East);
                    thread::sleep(Duration::from_millis(1));
                    passage.leave().unwrap();
                    crossings += 1;
                }
                crossings
            })
        })
        .collect();

    assert!(eventually(|| arbiter.snapshot().stats.admitted_east >= 10));

    // Without the reversal rule the east stream would hold the channel forever.
    let result = arbiter.enter_timeout(Side::West, Duration::from_secs(5));
    assert!(result.is_ok(), "west crosser starved: {result:?}");
    assert_eq!(arbiter.snapshot().direction, Some(Side::West));
    arbiter.leave(Side::West).unwrap();

    stop.store(true, Ordering::SeqCst);
    let crossings: u64 = stream.into_iter().map(|h| h.join().unwrap()).sum();

    let snap = arbiter.snapshot();
    assert!(snap.is_idle());
    assert_eq!(snap.stats.admitted_west, 1);
    assert_eq!(snap.stats.admitted_east, crossings);
}

#[test]
fn random_traffic_respects_capacity_and_direction() {
    const CAPACITY: usize = 3;
    const CROSSERS: u64 = 12;
    const TRIPS: usize = 40;

    let arbiter = Arc::new(Arbiter::new(CAPACITY).unwrap());
    let occupancy = Arc::new(Occupancy::default());

    let crossers: Vec<_> = (0..CROSSERS)
        .map(|seed| {
            let arbiter = Arc::clone(&arbiter);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..TRIPS {
                    let side = if rng.random_bool(0.5) { Side::East } else { Side::West };
                    let passage = arbiter.cross(side);
                    occupancy.step_on(side, CAPACITY);

                    let snap = arbiter.snapshot();
                    assert!(snap.occupants >= 1 && snap.occupants <= CAPACITY);
                    assert_eq!(snap.direction, Some(side));

                    if rng.random_bool(0.3) {
                        thread::yield_now();
                    }
                    occupancy.step_off(side);
                    passage.leave().unwrap();
                }
            })
        })
        .collect();

    for handle in crossers {
        handle.join().unwrap();
    }

    let snap = arbiter.snapshot();
    assert!(snap.is_idle());
    assert_eq!(snap.waiting_east + snap.waiting_west, 0);
    assert_eq!(
        snap.stats.admitted_east + snap.stats.admitted_west,
        CROSSERS * TRIPS as u64
    );
    assert!(snap.stats.peak_occupancy <= CAPACITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_random_traffic_respects_capacity_and_direction() {
    const CAPACITY: usize = 2;
    const CROSSERS: u64 = 10;
    const TRIPS: usize = 30;

    let arbiter = Arc::new(AsyncArbiter::new(CAPACITY).unwrap());
    let occupancy = Arc::new(Occupancy::default());

    let crossers: Vec<_> = (0..CROSSERS)
        .map(|seed| {
            let arbiter = Arc::clone(&arbiter);
            let occupancy = Arc::clone(&occupancy);
            tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..TRIPS {
                    let side = if rng.random_bool(0.5) { Side::East } else { Side::West };
                    arbiter.enter(side).await;
                    occupancy.step_on(side, CAPACITY);
                    tokio::task::yield_now().await;
                    occupancy.step_off(side);
                    arbiter.leave(side).unwrap();
                }
            })
        })
        .collect();

    for result in futures::future::join_all(crossers).await {
        result.unwrap();
    }

    let snap = arbiter.snapshot();
    assert!(snap.is_idle());
    assert_eq!(
        snap.stats.admitted_east + snap.stats.admitted_west,
        CROSSERS * TRIPS as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_crossers_never_count_as_occupants() {
    let arbiter = Arc::new(AsyncArbiter::new(1).unwrap());
    arbiter.enter(Side::East).await;

    let attempts: Vec<_> = (0..5)
        .map(|i| {
            let arbiter = Arc::clone(&arbiter);
            let side = if i % 2 == 0 { Side::East } else { Side::West };
            tokio::spawn(async move {
                arbiter
                    .enter_timeout(side, Duration::from_millis(20))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(attempts).await {
        assert!(result.unwrap().is_err());
    }

    let snap = arbiter.snapshot();
    assert_eq!(snap.occupants, 1);
    assert_eq!(snap.waiting_east + snap.waiting_west, 0);
    assert!(!snap.pending_reversal);
    assert_eq!(snap.stats.abandoned, 5);

    arbiter.leave(Side::East).unwrap();
    assert!(arbiter.snapshot().is_idle());
}
