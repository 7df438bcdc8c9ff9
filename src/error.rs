//! Fatal-abort plumbing for invariant violations: programmer bugs that are
//! never recovered, as opposed to conditions a caller can legitimately
//! retry or route around.
//!
//! Every condition this crate treats as a broken invariant goes through
//! [`fatal`] rather than a `Result`: there is nothing a caller could do to
//! recover from "the GC thread is registered as a mutator" or "someone
//! stole the `kNeedsGC` state", so we log at `error` level and abort,
//! mirroring `RuntimeFail`/`RuntimeAssert` in the runtime this crate's
//! protocol is modeled on.

/// Log at `error!` and panic. Use for a fatal runtime abort with a
/// diagnostic message — a broken invariant, not a recoverable error.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        log::error!("{}", message);
        panic!("{}", message);
    }};
}

pub use crate::fatal;
