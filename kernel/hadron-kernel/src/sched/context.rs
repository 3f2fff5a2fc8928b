//! x86_64 [`ArchContextSwitch`] implementation.
//!
//! `hadron_sched::Thread` deliberately carries no register state or stack —
//! those are "owned and switched by the arch layer" per its own doc comment.
//! This module keeps that state in a side table keyed by [`ThreadId`] and
//! performs the actual stack-pointer swap: callee-saved registers are
//! pushed/popped around a change of `rsp`, the same technique
//! `original_source/kernel/x86_64/thread.cpp`'s `SwitchOutStateToOtherThread`
//! assembly describes in terms of named struct fields rather than raw
//! offsets. `NullContextSwitch` (used by `hadron_sched`'s own tests and the
//! bootstrap idle thread before this module has registered it) never calls
//! this; only threads spawned through [`register_thread`] require an entry
//! here.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use hadron_core::sync::SpinLock;
use hadron_sched::{ArchContextSwitch, Thread, ThreadId};

/// Default kernel thread stack size.
const STACK_SIZE: usize = 64 * 1024;

struct Saved {
    rsp: u64,
    /// Keeps the backing allocation alive for the thread's lifetime. Never
    /// read directly — only `rsp`, which points somewhere inside it.
    _stack: Box<[u8; STACK_SIZE]>,
}

static CONTEXTS: SpinLock<BTreeMap<ThreadId, Saved>> = SpinLock::new(BTreeMap::new());

/// Saves the outgoing thread's callee-saved registers and stack pointer to
/// `*out_rsp` (RDI), switches `rsp` to `new_rsp` (RSI), and restores the
/// incoming thread's callee-saved registers from its stack.
///
/// `register_thread` primes a fresh thread's stack with the same six-register
/// frame this function pushes, so the first switch onto it pops straight
/// into the thread's entry point via `ret`.
#[unsafe(naked)]
unsafe extern "C" fn hadron_switch_stack(out_rsp: *mut u64, new_rsp: u64) {
    core::arch::naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

/// Allocates a kernel stack for `thread` and primes it so the first switch
/// onto this thread enters `entry` (which must never return).
///
/// Must be called once before `thread` is ever passed to
/// [`Scheduler::spawn`](hadron_sched::Scheduler::spawn).
pub fn register_thread(thread: &Thread, entry: extern "C" fn() -> !) {
    let mut stack: Box<[u8; STACK_SIZE]> = Box::new([0u8; STACK_SIZE]);
    let top = stack.as_mut_ptr() as u64 + STACK_SIZE as u64;

    // Build the frame `hadron_switch_stack` expects to pop into: six
    // zeroed callee-saved registers, then the entry address where `ret`
    // will find it.
    let mut sp = top - 8;
    // SAFETY: `sp` points within the stack allocation just created; each
    // write is 8-byte aligned since `top` is 16-byte aligned and we only
    // subtract multiples of 8.
    unsafe {
        (sp as *mut u64).write(entry as usize as u64);
        for _ in 0..6 {
            sp -= 8;
            (sp as *mut u64).write(0);
        }
    }

    CONTEXTS.lock().insert(thread.id(), Saved { rsp: sp, _stack: stack });
}

/// Releases the saved context for a thread that has exited and been
/// reclaimed. Safe to call even if the thread was never registered.
pub fn forget_thread(id: ThreadId) {
    CONTEXTS.lock().remove(&id);
}

/// Context switch implementation backing [`crate::sched::global`] threads.
pub struct X86ContextSwitch;

impl ArchContextSwitch for X86ContextSwitch {
    fn switch(&self, from: &Thread, to: &Thread) {
        let to_rsp = CONTEXTS
            .lock()
            .get(&to.id())
            .map(|s| s.rsp)
            .unwrap_or_else(|| panic!("hadron-sched: no saved context for thread {:?}", to.id()));

        let mut saved_from_rsp: u64 = 0;
        // SAFETY: `to_rsp` was produced by `register_thread` for a thread
        // that has not exited, or is a previously-saved `rsp` from an
        // earlier switch away from it — both are valid stack pointers
        // into a live allocation.
        unsafe {
            hadron_switch_stack(&mut saved_from_rsp, to_rsp);
        }

        if let Some(slot) = CONTEXTS.lock().get_mut(&from.id()) {
            slot.rsp = saved_from_rsp;
        }
    }
}
