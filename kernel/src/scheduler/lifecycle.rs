/*
 * Process Lifecycle
 *
 * Creation, termination and reaping of processes:
 *
 *   Unused --alloc_proc--> Used --userinit/fork--> Runnable
 *   Runnable --dispatch--> Running --yield--> Runnable
 *   Running --sleep--> Sleeping --wakeup/kill--> Runnable
 *   Running --exit--> Zombie --wait (parent)--> Unused
 *
 * Resources a slot owns (trap-frame page, address space) are acquired in
 * `alloc_proc` and released exactly once in `free_proc`, either when the
 * parent reaps the zombie or when setting up the process fails halfway.
 * Open files and the working directory are released earlier, by the
 * exiting process itself.
 *
 * Parent links live in `ParentTable`, guarded by the wait lock. Holding the
 * wait lock while scanning for children is what keeps `wait` from missing
 * the wakeup of a child exiting concurrently: the child must take the same
 * lock before it can wake its parent.
 */

use alloc::vec;
use alloc::vec::Vec;

use super::context::TrapFrame;
use super::process::{ProcInner, ProcessId, ProcessState};
use super::scheduler::Scheduler;
use super::types::{Channel, Nice, SlotId};
use crate::arch::Context;
use crate::config::PAGE_SIZE;
use crate::error::KernelError;
use crate::platform::{FileRef, MapPerm};
use crate::sync::SpinLockGuard;

/// Parent link of every slot
///
/// Only reachable through the wait lock.
pub struct ParentTable {
    parent: Vec<Option<SlotId>>,
}

impl ParentTable {
    pub fn new(nslots: usize) -> Self {
        Self { parent: vec![None; nslots] }
    }

    pub fn parent_of(&self, slot: SlotId) -> Option<SlotId> {
        self.parent[slot]
    }

    pub fn set(&mut self, child: SlotId, parent: SlotId) {
        self.parent[child] = Some(parent);
    }

    pub fn clear(&mut self, child: SlotId) {
        self.parent[child] = None;
    }

    /// Give every child of `from` to `to`
    ///
    /// # Returns
    ///
    /// Whether any child was moved.
    pub fn reparent(&mut self, from: SlotId, to: SlotId) -> bool {
        let mut moved = false;
        for parent in self.parent.iter_mut().filter(|p| **p == Some(from)) {
            *parent = Some(to);
            moved = true;
        }
        moved
    }
}

/// First kernel activation of every process
fn process_entry(arg: usize) -> ! {
    // SAFETY: `arg` is the address of the 'static scheduler (alloc_proc).
    let sched: &'static Scheduler = unsafe { &*(arg as *const Scheduler) };
    sched.forkret()
}

impl Scheduler {
    /// Claim an Unused slot and give it the resources every process needs
    ///
    /// # Returns
    ///
    /// The slot, in state Used, with its lock held.
    fn alloc_proc(&'static self) -> Result<(SlotId, SpinLockGuard<'static, ProcInner>), KernelError> {
        for (slot, proc) in self.procs.iter().enumerate() {
            let mut p = proc.lock();
            if p.state != ProcessState::Unused {
                continue;
            }

            p.pid = self.alloc_pid();
            p.state = ProcessState::Used;
            p.run_ticks = 0;
            proc.set_nice(Nice::default());

            let Some(page) = self.platform.alloc_page() else {
                self.free_proc(&mut p);
                return Err(KernelError::OutOfMemory);
            };
            p.trapframe = Some(page);
            *p.trapframe_mut() = TrapFrame::default();

            let Some(space) = self.platform.create_address_space(page) else {
                self.free_proc(&mut p);
                return Err(KernelError::OutOfMemory);
            };
            p.pagetable = Some(space);

            // SAFETY: the slot was Unused, so nothing runs on this context.
            unsafe {
                let entry = Context::new(
                    process_entry,
                    self as *const Scheduler as usize,
                    self.platform.kernel_stack(slot),
                );
                proc.reset_context(entry);
            }

            return Ok((slot, p));
        }

        Err(KernelError::NoFreeProc)
    }

    /// Release everything a slot owns and mark it Unused
    ///
    /// Files and cwd must already be gone; the caller holds the slot lock.
    fn free_proc(&self, p: &mut ProcInner) {
        if let Some(page) = p.trapframe.take() {
            self.platform.free_page(page);
        }
        if let Some(space) = p.pagetable.take() {
            self.platform.destroy_address_space(space, p.sz);
        }

        p.sz = 0;
        p.pid = ProcessId(0);
        p.name.clear();
        p.chan = None;
        p.killed = false;
        p.xstate = 0;
        p.run_ticks = 0;
        p.state = ProcessState::Unused;
    }

    /// Create the init process from a one-page code image
    ///
    /// The image is mapped at user address 0 and the process starts there
    /// with its stack at the top of the page.
    ///
    /// # Panics
    ///
    /// If init already exists or the image is larger than a page.
    pub fn userinit(&'static self, name: &str, code: &[u8]) -> Result<ProcessId, KernelError> {
        if self.init_slot.get().is_some() {
            panic!("userinit: init already exists");
        }
        if code.len() > PAGE_SIZE {
            panic!("userinit: more than a page");
        }

        let (slot, mut p) = self.alloc_proc()?;
        let Some(space) = p.pagetable else {
            panic!("userinit: no address space");
        };

        let Some(page) = self.platform.alloc_page() else {
            self.free_proc(&mut p);
            return Err(KernelError::OutOfMemory);
        };
        let perm = MapPerm::READ | MapPerm::WRITE | MapPerm::EXEC | MapPerm::USER;
        if let Err(err) = self.platform.map_range(space, 0, page, PAGE_SIZE, perm) {
            self.platform.free_page(page);
            self.free_proc(&mut p);
            return Err(err);
        }
        p.sz = PAGE_SIZE;
        if let Err(err) = self.platform.copy_out(space, 0, code) {
            self.free_proc(&mut p);
            return Err(err);
        }

        let frame = p.trapframe_mut();
        frame.iret_frame.rip = 0;
        frame.iret_frame.rsp = PAGE_SIZE as u64;
        frame.iret_frame.rflags = TrapFrame::USER_RFLAGS;

        p.set_name(name);
        p.cwd = Some(self.platform.root_dir());
        self.init_slot.call_once(|| slot);

        p.state = ProcessState::Runnable;
        self.enqueue(slot);
        log::info!("[Proc] init '{}' created as pid {}", name, p.pid);
        Ok(p.pid)
    }

    /// Duplicate the calling process
    ///
    /// The child gets a copy of the parent's memory and registers (with
    /// a return value of 0), its nice value, name, open files and working
    /// directory, and starts Runnable at the level its nice value calls for.
    ///
    /// # Returns
    ///
    /// The child's pid.
    pub fn fork(&'static self) -> Result<ProcessId, KernelError> {
        let (parent_slot, parent) = self.current();
        let (space, sz, frame, files, cwd, name) = {
            let mut p = parent.lock();
            let Some(space) = p.pagetable else {
                panic!("fork: parent has no address space");
            };
            (space, p.sz, *p.trapframe_mut(), p.files, p.cwd, p.name.clone())
        };

        let (child_slot, mut c) = self.alloc_proc()?;
        let Some(child_space) = c.pagetable else {
            panic!("fork: child has no address space");
        };

        if let Err(err) = self.platform.copy_address_space(space, child_space, sz) {
            self.free_proc(&mut c);
            log::warn!("[Proc] fork: address space copy failed: {}", err);
            return Err(err);
        }
        c.sz = sz;

        let child_frame = c.trapframe_mut();
        *child_frame = frame;
        child_frame.set_return(0);

        self.procs[child_slot].set_nice(parent.nice());
        for (dst, src) in c.files.iter_mut().zip(files.iter()) {
            *dst = src.map(|file| self.platform.file_dup(file));
        }
        c.cwd = cwd.map(|dir| self.platform.dir_dup(dir));
        c.name = name;

        let pid = c.pid;
        drop(c);

        self.parents.lock().set(child_slot, parent_slot);

        let mut c = self.procs[child_slot].lock();
        c.state = ProcessState::Runnable;
        self.enqueue(child_slot);
        drop(c);

        log::debug!("[Proc] fork: slot {} -> pid {}", parent_slot, pid);
        Ok(pid)
    }

    /// Terminate the calling process
    ///
    /// Closes its files, hands its children to init, wakes its parent and
    /// stays a Zombie until the parent reaps it.
    ///
    /// # Panics
    ///
    /// If the caller is init.
    pub fn exit(&self, status: i32) -> ! {
        let (slot, proc) = self.current();
        if self.init_slot.get() == Some(&slot) {
            panic!("init exiting");
        }

        let (files, cwd) = {
            let mut p = proc.lock();
            (core::mem::take(&mut p.files), p.cwd.take())
        };
        for file in files.into_iter().flatten() {
            self.platform.file_close(file);
        }
        if let Some(cwd) = cwd {
            self.platform.dir_put(cwd);
        }

        let mut parents = self.parents.lock();

        if let Some(&init) = self.init_slot.get() {
            if parents.reparent(slot, init) {
                self.wakeup(Channel::of(&self.procs[init]));
            }
        }

        // Parent may be sleeping in wait().
        if let Some(parent) = parents.parent_of(slot) {
            self.wakeup(Channel::of(&self.procs[parent]));
        }

        let mut p = proc.lock();
        p.xstate = status;
        p.state = ProcessState::Zombie;
        log::debug!("[Proc] pid {} exited with status {}", p.pid, status);

        drop(parents);

        // Jump into the dispatcher, never to return.
        self.sched_exit(proc, p)
    }

    /// Wait for a child to exit and reap it
    ///
    /// # Arguments
    ///
    /// * `status_addr` - user address the child's 4-byte exit status is
    ///   copied to, if any
    ///
    /// # Returns
    ///
    /// The reaped child's pid, `NoChildren` if the caller has none,
    /// `Killed` if the caller was killed while waiting, or `BadAddress` if
    /// the status could not be copied (the child is then not reaped).
    pub fn wait(&self, status_addr: Option<usize>) -> Result<ProcessId, KernelError> {
        let (me, proc) = self.current();
        let space = proc.lock().pagetable;

        let mut parents = self.parents.lock();
        loop {
            let mut have_kids = false;

            for child in 0..self.procs.len() {
                if parents.parent_of(child) != Some(me) {
                    continue;
                }

                // The child lock makes sure it is out of exit() and swtch().
                let mut c = self.procs[child].lock();
                have_kids = true;
                if c.state != ProcessState::Zombie {
                    continue;
                }

                let pid = c.pid;
                if let (Some(addr), Some(space)) = (status_addr, space) {
                    self.platform.copy_out(space, addr, &c.xstate.to_le_bytes())?;
                }
                self.free_proc(&mut c);
                parents.clear(child);
                log::debug!("[Proc] reaped pid {}", pid);
                return Ok(pid);
            }

            if !have_kids {
                return Err(KernelError::NoChildren);
            }
            if self.killed() {
                return Err(KernelError::Killed);
            }

            parents = self.sleep(Channel::of(proc), parents);
        }
    }

    /// Request termination of the process with `pid`
    ///
    /// The target exits the next time it crosses the user/kernel boundary.
    /// A sleeping target is made Runnable so it gets there.
    pub fn kill(&self, pid: ProcessId) -> Result<(), KernelError> {
        for (slot, proc) in self.procs.iter().enumerate() {
            let mut p = proc.lock();
            if p.pid != pid || p.state == ProcessState::Unused {
                continue;
            }

            p.killed = true;
            if p.state == ProcessState::Sleeping {
                p.state = ProcessState::Runnable;
                self.enqueue(slot);
            }
            log::debug!("[Proc] kill pid {}", pid);
            return Ok(());
        }

        Err(KernelError::NoSuchProcess)
    }

    /// Give an open file to the calling process
    ///
    /// # Returns
    ///
    /// The lowest free descriptor, or `TooManyFiles`.
    pub fn fd_install(&self, file: FileRef) -> Result<usize, KernelError> {
        let (_, proc) = self.current();
        let mut p = proc.lock();
        let (fd, slot) = p
            .files
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(KernelError::TooManyFiles)?;
        *slot = Some(file);
        Ok(fd)
    }

    /// Mark the calling process killed
    pub fn set_killed(&self) {
        let (_, proc) = self.current();
        proc.lock().killed = true;
    }

    /// Has the calling process been killed?
    pub fn killed(&self) -> bool {
        let (_, proc) = self.current();
        proc.lock().killed
    }

    /// Pid of the init process, once created
    pub fn init_pid(&self) -> Option<ProcessId> {
        let slot = *self.init_slot.get()?;
        Some(self.procs[slot].lock().pid)
    }

    /// Kernel-side start of a new process, reached through process_entry
    fn forkret(&'static self) -> ! {
        let (_, proc) = self.current();

        // Still holding the slot lock from the dispatch loop.
        unsafe {
            proc.lock_ref().force_release();
        }

        self.platform.user_return(self)
    }
}
