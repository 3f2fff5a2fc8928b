//! Syscall gate dispatch scaffolding.
//!
//! `spec.md` §4.9 describes the gate as: decode the trapframe into a syscall
//! number plus up to six register-width arguments, look it up, and either
//! run it or return [`Errno::ENOSYS`]. The teacher's equivalent
//! (`hadron-kernel/src/syscall.rs`, generalized from its smaller surface)
//! hand-rolls a `match` over syscall numbers calling into
//! arch-independent handler functions; this crate only owns the
//! number-to-handler indirection ([`SyscallHandler`]/[`dispatch`]) so that
//! `hadron-kernel` can implement handlers against whatever process/fs
//! context it has without this crate needing to know about either.

use crate::errno::Errno;
use crate::number::Syscall;

/// The six register-width arguments a syscall gate decodes out of a
/// trapframe, in architecture-independent order.
pub type Args = [usize; 6];

/// Implemented by whatever owns process/fs/signal state, to actually run a
/// decoded syscall. Kept as a single trait method (rather than one method
/// per syscall) so `dispatch` stays a plain number-to-call indirection and
/// `hadron-kernel` owns argument unmarshalling for each case.
pub trait SyscallHandler {
    /// Runs `call` with `args`, returning a register-width result or an
    /// [`Errno`]. The return convention (result value vs. error) matches
    /// the original's single-word signed-on-error encoding: callers map
    /// `Err` to a negated errno when writing the trapframe's return
    /// register.
    fn handle(&mut self, call: Syscall, args: Args) -> Result<usize, Errno>;
}

/// Decodes `number` and routes to `handler`, returning [`Errno::ENOSYS`]
/// for any number with no assigned syscall.
pub fn dispatch<H: SyscallHandler>(handler: &mut H, number: u32, args: Args) -> Result<usize, Errno> {
    match Syscall::from_u32(number) {
        Some(call) => handler.handle(call, args),
        None => Err(Errno::ENOSYS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl SyscallHandler for Echo {
        fn handle(&mut self, call: Syscall, args: Args) -> Result<usize, Errno> {
            match call {
                Syscall::GetPid => Ok(42),
                Syscall::Exit => Err(Errno::EINVAL),
                _ => {
                    let _ = args;
                    Err(Errno::ENOSYS)
                }
            }
        }
    }

    #[test]
    fn dispatch_routes_known_syscall() {
        let mut h = Echo;
        let result = dispatch(&mut h, Syscall::GetPid as u32, [0; 6]);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn dispatch_rejects_unknown_number() {
        let mut h = Echo;
        let result = dispatch(&mut h, u32::MAX, [0; 6]);
        assert_eq!(result, Err(Errno::ENOSYS));
    }

    #[test]
    fn handler_can_still_return_its_own_errno() {
        let mut h = Echo;
        let result = dispatch(&mut h, Syscall::Exit as u32, [0; 6]);
        assert_eq!(result, Err(Errno::EINVAL));
    }
}
