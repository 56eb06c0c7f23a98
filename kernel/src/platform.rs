/*
 * Platform Interface
 *
 * This module defines the contract between the scheduler and the parts of
 * the kernel it does not own: the physical page allocator, virtual memory,
 * the file and directory layer, and the trap layer that returns to user
 * mode.
 *
 * The scheduler holds its platform as `Box<dyn Platform>` and treats every
 * handle it receives (`PhysPage`, `AddressSpace`, `FileRef`, `DirRef`) as
 * opaque: it stores them in process slots, duplicates them on fork and
 * releases them on exit or reap, and never looks inside.
 *
 * Why this is important:
 * - The process lifecycle can be exercised without real page tables
 * - The kernel binary decides how memory and files actually work
 * - Every place the scheduler touches a collaborator is listed here
 */

use bitflags::bitflags;

use crate::error::KernelError;
use crate::scheduler::Scheduler;

bitflags! {
    /// Permissions of a user mapping
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapPerm: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
        const USER = 1 << 3;
    }
}

/// One physical page, identified by its kernel-accessible address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysPage(pub usize);

impl PhysPage {
    /// Kernel address of the page
    pub fn addr(self) -> usize {
        self.0
    }

    /// The page as a typed pointer
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

/// Handle of a user address space (page table root)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpace(pub usize);

/// Reference-counted handle of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef(pub usize);

/// Reference-counted handle of a directory inode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirRef(pub usize);

/// Services the scheduler consumes from the rest of the kernel
pub trait Platform: Send + Sync {
    // ========================================================================
    // PHYSICAL MEMORY
    // ========================================================================

    /// Allocate one zeroed page, or `None` when memory is exhausted
    fn alloc_page(&self) -> Option<PhysPage>;

    /// Return a page obtained from `alloc_page`
    fn free_page(&self, page: PhysPage);

    /// Top of the kernel stack reserved for process slot `slot`
    fn kernel_stack(&self, slot: usize) -> usize;

    // ========================================================================
    // VIRTUAL MEMORY
    // ========================================================================

    /// Create an empty user address space with the trap-frame page mapped
    fn create_address_space(&self, trapframe: PhysPage) -> Option<AddressSpace>;

    /// Free an address space and the `size` bytes of user memory in it
    fn destroy_address_space(&self, space: AddressSpace, size: usize);

    /// Copy the first `size` bytes of user memory of `from` into `to`
    ///
    /// On failure nothing of the partial copy may stay mapped in `to`; the
    /// caller only destroys the (empty) space.
    fn copy_address_space(
        &self,
        from: AddressSpace,
        to: AddressSpace,
        size: usize,
    ) -> Result<(), KernelError>;

    /// Map `len` bytes at user address `va` to memory starting at `page`
    fn map_range(
        &self,
        space: AddressSpace,
        va: usize,
        page: PhysPage,
        len: usize,
        perm: MapPerm,
    ) -> Result<(), KernelError>;

    /// Copy kernel bytes to user address `va`
    fn copy_out(&self, space: AddressSpace, va: usize, bytes: &[u8]) -> Result<(), KernelError>;

    // ========================================================================
    // FILES
    // ========================================================================

    /// Take another reference to an open file
    fn file_dup(&self, file: FileRef) -> FileRef;

    /// Drop a reference to an open file
    fn file_close(&self, file: FileRef);

    /// Reference to the root directory, used as init's working directory
    fn root_dir(&self) -> DirRef;

    /// Take another reference to a directory
    fn dir_dup(&self, dir: DirRef) -> DirRef;

    /// Drop a reference to a directory
    fn dir_put(&self, dir: DirRef);

    // ========================================================================
    // TRAPS
    // ========================================================================

    /// Return the current process to user mode
    ///
    /// Called once per process, from its first kernel activation, with
    /// its slot lock already released.
    fn user_return(&self, sched: &'static Scheduler) -> !;
}
