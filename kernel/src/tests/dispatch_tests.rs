/*
 * Dispatch Tests
 *
 * Level priority, FIFO order within a level, sleep/wakeup and the
 * multi-CPU dispatch loop.
 */

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::sim::{Machine, idle};
use crate::arch;
use crate::config::LOG_SIZE;
use crate::error::KernelError;
use crate::scheduler::{Channel, CpuId, Level, ProcessState, Scheduler};
use crate::sync::SpinLock;

#[test]
fn test_higher_level_runs_first() {
    let m = Machine::boot(5, 1);
    let sim = m.sim.clone();
    let (order_tx, order_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    m.start_init(move |k| {
        let mut children = Vec::new();

        // Children inherit the nice value at fork time.
        for (delta, label) in [(15, "low"), (-25, "high"), (10, "normal")] {
            k.adjust_nice(delta);
            let child = k.fork().unwrap();
            let tx = order_tx.clone();
            sim.load(child, move |k| {
                tx.send(label).unwrap();
                k.exit(0)
            });
            children.push(child);
        }

        for _ in 0..children.len() {
            let _ = k.wait(None);
        }
        done_tx.send(()).unwrap();
        idle(k)
    });

    m.run_until(&done_rx, 50);
    let order: Vec<_> = order_rx.try_iter().collect();
    assert_eq!(order, ["high", "normal", "low"]);
}

#[test]
fn test_same_level_is_fifo() {
    let m = Machine::boot(5, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        k.event_log().start().unwrap();

        let children: Vec<_> = (0..3)
            .map(|_| {
                let child = k.fork().unwrap();
                sim.load(child, |k| k.exit(0));
                child
            })
            .collect();
        for _ in 0..3 {
            let _ = k.wait(None);
        }

        tx.send((children, k.event_log().snapshot())).unwrap();
        idle(k)
    });

    let (children, log) = m.run_until(&rx, 50);
    let dispatched: Vec<_> = log
        .iter()
        .filter(|entry| children.iter().any(|pid| pid.as_usize() as i32 == entry.pid))
        .map(|entry| entry.pid)
        .collect();
    let expected: Vec<_> = children.iter().map(|pid| pid.as_usize() as i32).collect();
    assert_eq!(dispatched, expected);
}

#[test]
fn test_sleep_and_double_wakeup() {
    let m = Machine::boot(4, 1);
    let (asleep_tx, asleep_rx) = mpsc::channel();
    let (woken_tx, woken_rx) = mpsc::channel();
    let chan = Channel::new(0xfeed);

    let pid = m.start_init(move |k| {
        let lock = SpinLock::new("test", ());
        let guard = lock.lock();
        asleep_tx.send(()).unwrap();
        drop(k.sleep(chan, guard));
        woken_tx.send(()).unwrap();
        idle(k)
    });

    m.run_until(&asleep_rx, 10);
    assert_eq!(m.sched.info(pid).unwrap().state, ProcessState::Sleeping);

    // Waking twice must not queue the process twice.
    m.sched.wakeup(chan);
    m.sched.wakeup(chan);
    let info = m.sched.info(pid).unwrap();
    assert_eq!(info.state, ProcessState::Runnable);
    assert_eq!(info.queued, Some(Level::Normal));

    m.run_until(&woken_rx, 10);
    assert_eq!(m.sched.dispatch_count(CpuId::BSP), 2);
}

#[test]
fn test_wakeup_on_other_channel_is_ignored() {
    let m = Machine::boot(4, 1);
    let (tx, rx) = mpsc::channel();

    let pid = m.start_init(move |k| {
        tx.send(()).unwrap();
        idle(k)
    });

    m.run_until(&rx, 10);
    m.sched.wakeup(Channel::new(0xdead));
    assert_eq!(m.sched.info(pid).unwrap().state, ProcessState::Sleeping);
    assert!(!m.sched.schedule_once(), "nothing is runnable");
}

#[test]
fn test_sleep_ticks() {
    let m = Machine::boot(4, 1);
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let start = k.ticks();
        let result = k.sleep_ticks(3);
        tx.send((result, k.ticks() - start)).unwrap();
        idle(k)
    });

    let (result, elapsed) = m.run_ticking_until(&rx, 20);
    assert_eq!(result, Ok(()));
    assert!(elapsed >= 3);
}

#[test]
fn test_killed_process_leaves_sleep_ticks() {
    let m = Machine::boot(4, 1);
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        k.set_killed();
        tx.send(k.sleep_ticks(10)).unwrap();
        idle(k)
    });

    assert_eq!(m.run_until(&rx, 10), Err(KernelError::Killed));
}

/// Ping-pong player that moves whenever the counter has its parity
fn player(
    parity: u64,
    rounds: u64,
    counter: Arc<SpinLock<u64>>,
) -> impl FnOnce(&'static Scheduler) + Send + 'static {
    move |k| {
        let chan = Channel::of(&*counter);
        let mut turn = counter.lock();
        while *turn < rounds {
            if *turn % 2 == parity {
                *turn += 1;
                k.wakeup(chan);
            } else {
                turn = k.sleep(chan, turn);
            }
        }
        drop(turn);
        k.wakeup(chan);
        k.exit(0)
    }
}

#[test]
fn test_ping_pong_across_cpus() {
    const ROUNDS: u64 = 200;
    const NCPU: usize = 3;

    let m = Machine::boot(4, NCPU);
    let sim = m.sim.clone();
    let counter = Arc::new(SpinLock::new("counter", 0u64));
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        for parity in 0..2 {
            let child = k.fork().unwrap();
            sim.load(child, player(parity, ROUNDS, counter.clone()));
        }
        let reaped = [k.wait(None), k.wait(None)];
        tx.send((reaped.iter().all(Result::is_ok), *counter.lock())).unwrap();
        idle(k)
    });

    let stop = Arc::new(AtomicBool::new(false));
    let cpus = m.spawn_cpus(NCPU, stop.clone());

    let result = rx.recv_timeout(Duration::from_secs(30));
    stop.store(true, Ordering::SeqCst);
    for cpu in cpus {
        cpu.join().unwrap();
    }

    assert_eq!(result, Ok((true, ROUNDS)));
    let total: u64 = (0..NCPU).map(|id| m.sched.dispatch_count(CpuId(id as u32))).sum();
    assert!(total >= 3);
}

#[test]
fn test_log_times_never_decrease_across_cpus() {
    const NCPU: usize = 4;
    const YIELDS: usize = 300;

    let m = Machine::boot(5, NCPU);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        k.event_log().start().unwrap();
        for _ in 0..3 {
            let child = k.fork().unwrap();
            sim.load(child, |k| {
                for _ in 0..YIELDS {
                    k.yield_now();
                }
                k.exit(0)
            });
        }
        for _ in 0..3 {
            let _ = k.wait(None);
        }
        tx.send(k.event_log().snapshot()).unwrap();
        idle(k)
    });

    // CPUs 1 and 2 dispatch while CPU 3 only takes timer ticks.
    let stop = Arc::new(AtomicBool::new(false));
    let cpus = m.spawn_cpus(NCPU - 1, stop.clone());
    let ticker = {
        let sched = m.sched;
        let stop = stop.clone();
        thread::spawn(move || {
            arch::init_cpu(NCPU - 1);
            while !stop.load(Ordering::SeqCst) {
                sched.clock_tick();
            }
        })
    };

    let result = rx.recv_timeout(Duration::from_secs(30));
    stop.store(true, Ordering::SeqCst);
    for cpu in cpus {
        cpu.join().unwrap();
    }
    ticker.join().unwrap();

    let entries = result.unwrap();
    assert_eq!(entries.len(), LOG_SIZE);
    let times: Vec<_> = entries.iter().map(|entry| entry.time).collect();
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", times);
}
