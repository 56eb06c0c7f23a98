/*
 * Process Lifecycle Tests
 *
 * fork / exit / wait / kill on a one-CPU simulated machine, including the
 * resources each transition must acquire or give back.
 */

use alloc::vec::Vec;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use super::sim::{Machine, idle};
use crate::config::NOFILE;
use crate::error::KernelError;
use crate::scheduler::{Level, ProcessId, ProcessState};

#[test]
fn test_fork_exit_wait_reports_status() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let child = k.fork().unwrap();
        sim.load(child, |k| k.exit(7));
        let reaped = k.wait(Some(0x100));
        tx.send((child, reaped)).unwrap();
        idle(k)
    });

    let (child, reaped) = m.run_until(&rx, 50);
    assert_eq!(reaped, Ok(child));
    assert_eq!(m.sim.copied_to(0x100), Some(7i32.to_le_bytes().to_vec()));
    assert!(m.sched.info(child).is_none(), "reaped child must leave the table");
}

#[test]
fn test_full_table_and_slot_reuse() {
    let m = Machine::boot(2, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let first = k.fork().unwrap();
        sim.load(first, |k| k.exit(0));
        let full = k.fork();
        let reaped = k.wait(None);

        let second = k.fork().unwrap();
        sim.load(second, |k| k.exit(0));
        let reaped_again = k.wait(None);

        tx.send((full, reaped == Ok(first), reaped_again == Ok(second), first != second))
            .unwrap();
        idle(k)
    });

    let (full, first_reaped, second_reaped, fresh_pid) = m.run_until(&rx, 50);
    assert_eq!(full, Err(KernelError::NoFreeProc));
    assert!(first_reaped);
    assert!(second_reaped);
    assert!(fresh_pid, "a reused slot gets a new pid");
}

#[test]
fn test_wait_errors() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let lonely = k.wait(None);

        let child = k.fork().unwrap();
        sim.load(child, |k| idle(k));
        k.set_killed();
        let killed = k.wait(None);

        tx.send((lonely, killed, k.killed())).unwrap();
        idle(k)
    });

    let (lonely, killed, flag) = m.run_until(&rx, 50);
    assert_eq!(lonely, Err(KernelError::NoChildren));
    assert_eq!(killed, Err(KernelError::Killed));
    assert!(flag);
}

#[test]
fn test_kill_wakes_tick_sleeper() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();
    let (slept_tx, slept_rx) = mpsc::channel();

    m.start_init(move |k| {
        let child = k.fork().unwrap();
        sim.load(child, move |k| {
            slept_tx.send(k.sleep_ticks(1000)).unwrap();
            k.exit(-1)
        });

        // Let the child fall asleep first.
        k.yield_now();
        let killed = k.kill(child);
        let reaped = k.wait(Some(0x200));
        let missing = k.kill(ProcessId(9999));

        tx.send((child, killed, reaped, missing)).unwrap();
        idle(k)
    });

    let (child, killed, reaped, missing) = m.run_until(&rx, 50);
    assert_eq!(killed, Ok(()));
    assert_eq!(reaped, Ok(child));
    assert_eq!(missing, Err(KernelError::NoSuchProcess));
    assert_eq!(slept_rx.try_recv(), Ok(Err(KernelError::Killed)));
    assert_eq!(m.sim.copied_to(0x200), Some((-1i32).to_le_bytes().to_vec()));
}

#[test]
fn test_orphans_go_to_init() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();
    let (gc_tx, gc_rx) = mpsc::channel();

    m.start_init(move |k| {
        let parent_sim = sim.clone();
        let parent = k.fork().unwrap();
        sim.load(parent, move |k| {
            let grandchild = k.fork().unwrap();
            parent_sim.load(grandchild, |k| {
                let _ = k.sleep_ticks(2);
                k.exit(5)
            });
            gc_tx.send(grandchild).unwrap();
            k.exit(1)
        });

        let first = k.wait(None);
        let second = k.wait(Some(0x300));
        let none_left = k.wait(None);
        tx.send((parent, first, second, none_left)).unwrap();
        idle(k)
    });

    let (parent, first, second, none_left) = m.run_ticking_until(&rx, 200);
    let grandchild = gc_rx.try_recv().unwrap();

    assert_eq!(first, Ok(parent));
    assert_eq!(second, Ok(grandchild));
    assert_eq!(none_left, Err(KernelError::NoChildren));
    assert_eq!(m.sim.copied_to(0x300), Some(5i32.to_le_bytes().to_vec()));
    assert_eq!(m.sched.proc_info().len(), 1, "only init is left");
}

#[test]
fn test_fork_failure_releases_resources() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let before = sim.live_pages();
        sim.fail_next_copy();
        let result = k.fork();
        let after = sim.live_pages();
        tx.send((before, result, after)).unwrap();
        idle(k)
    });

    let (before, result, after) = m.run_until(&rx, 50);
    assert_eq!(result, Err(KernelError::OutOfMemory));
    assert_eq!(before, after);
    assert_eq!(m.sched.proc_info().len(), 1);
}

#[test]
fn test_fork_shares_files_and_exit_closes_them() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();
    let (child_tx, child_rx) = mpsc::channel();

    m.start_init(move |k| {
        let file = sim.open_file();
        let fd = k.fd_install(file);

        let child_sim = sim.clone();
        let child = k.fork().unwrap();
        sim.load(child, move |k| {
            child_tx.send(child_sim.refs(file.0)).unwrap();
            k.exit(0)
        });
        let _ = k.wait(None);
        let after_exit = sim.refs(file.0);

        let fill: Vec<_> = (1..NOFILE).map(|_| k.fd_install(sim.open_file())).collect();
        let overflow = k.fd_install(sim.open_file());

        tx.send((fd, after_exit, fill.iter().all(Result::is_ok), overflow)).unwrap();
        idle(k)
    });

    let (fd, after_exit, filled, overflow) = m.run_until(&rx, 50);
    assert_eq!(fd, Ok(0));
    assert_eq!(child_rx.try_recv(), Ok(2), "fork duplicates every open file");
    assert_eq!(after_exit, 1, "exit closes the child's references");
    assert!(filled);
    assert_eq!(overflow, Err(KernelError::TooManyFiles));
}

#[test]
fn test_reaping_frees_pages() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let before = sim.live_pages();
        let child = k.fork().unwrap();
        sim.load(child, |k| k.exit(0));
        let _ = k.wait(None);
        tx.send((before, sim.live_pages())).unwrap();
        idle(k)
    });

    let (before, after) = m.run_until(&rx, 50);
    assert_eq!(before, after);
}

#[test]
fn test_exited_process_releases_its_thread() {
    const ROUNDS: usize = 20;

    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (alive_tx, alive_rx) = mpsc::channel::<()>();
    let (tx, rx) = mpsc::channel();

    m.start_init(move |k| {
        let mut reaped = 0;
        for _ in 0..ROUNDS {
            let child = k.fork().unwrap();
            let alive = alive_tx.clone();
            sim.load(child, move |k| {
                let _alive = alive;
                k.exit(0)
            });
            if k.wait(None) == Ok(child) {
                reaped += 1;
            }
        }
        drop(alive_tx);
        tx.send(reaped).unwrap();
        idle(k)
    });

    assert_eq!(m.run_until(&rx, 10 * ROUNDS), ROUNDS);

    // Every child's stack, and the sender on it, is gone once it exits.
    let released = alive_rx.recv_timeout(Duration::from_secs(10));
    assert_eq!(released, Err(RecvTimeoutError::Disconnected));
}

#[test]
fn test_procdump_and_info() {
    let m = Machine::boot(4, 1);
    let sim = m.sim.clone();
    let (tx, rx) = mpsc::channel();
    let (running_tx, running_rx) = mpsc::channel();

    let init = m.start_init(move |k| {
        let a = k.fork().unwrap();
        sim.load(a, |k| idle(k));
        let b = k.fork().unwrap();
        sim.load(b, move |k| {
            let me = k.current_pid().unwrap();
            running_tx.send(k.info(me).unwrap()).unwrap();
            k.exit(3)
        });
        tx.send((a, b)).unwrap();
        idle(k)
    });
    assert_eq!(m.sched.init_pid(), Some(init));

    let (a, b) = m.run_until(&rx, 50);
    assert_eq!(m.sched.procdump(), 3);

    let info = m.sched.info(a).unwrap();
    assert_eq!(info.state, ProcessState::Runnable);
    assert_eq!(info.queued, Some(Level::Normal));
    assert_eq!(info.name.as_str(), "init", "fork copies the name");

    let info = m.sched.info(init).unwrap();
    assert_eq!(info.state, ProcessState::Sleeping);
    assert_eq!(info.queued, None);

    m.run(2);
    assert_eq!(m.sched.procdump(), 3);
    let info = m.sched.info(a).unwrap();
    assert_eq!(info.state, ProcessState::Sleeping);
    assert_eq!(info.queued, None);
    assert_eq!(info.run_ticks, 1);

    let running = running_rx.try_recv().unwrap();
    assert_eq!(running.state, ProcessState::Running);
    assert_eq!(running.queued, None);

    // Not reaped: init never waits.
    let zombie = m.sched.info(b).unwrap();
    assert_eq!(zombie.state, ProcessState::Zombie);
    assert_eq!(zombie.queued, None);
}

#[test]
#[should_panic(expected = "userinit: init already exists")]
fn test_second_init_panics() {
    let m = Machine::boot(4, 1);
    m.start_init(|k| idle(k));
    m.start_init(|k| idle(k));
}
