//! The opaque object handle and mark-bit header this crate operates on.
//!
//! The collector never learns an object's layout. It only ever holds an
//! [`ObjectRef`] — a non-null address, exactly like `ObjectReference` in
//! `mmtk-core` — and asks the binding for a view of the bits it owns: the
//! one-bit mark color.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU8, Ordering};

use static_assertions::const_assert_eq;

// `ObjectRef` must stay exactly pointer-sized: it's handed across the
// suspension boundary and stored in root-set vectors by value, so any
// padding would silently inflate every gray-set allocation.
const_assert_eq!(std::mem::size_of::<ObjectRef>(), std::mem::size_of::<usize>());

/// The two colors a bichromatic mark-sweep needs. Objects are born WHITE,
/// flip to BLACK when reached during marking, and flip back to WHITE during
/// sweep so the next epoch starts from the same state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

/// The GC-owned portion of an object's header. A binding embeds one of
/// these inside its own object representation and hands out references to
/// it through [`crate::vm::HeapObjects::header_of`].
pub struct ObjectHeader {
    color: AtomicU8,
}

impl ObjectHeader {
    pub fn new() -> Self {
        ObjectHeader {
            color: AtomicU8::new(Color::White as u8),
        }
    }

    pub fn color(&self) -> Color {
        match self.color.load(Ordering::Relaxed) {
            0 => Color::White,
            _ => Color::Black,
        }
    }

    /// Atomically flips WHITE -> BLACK. Returns `true` iff this call did
    /// the flip, so a concurrent marker doesn't requeue the same object's
    /// referents twice.
    pub fn try_mark(&self) -> bool {
        self.color
            .compare_exchange(
                Color::White as u8,
                Color::Black as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Atomically flips BLACK -> WHITE. Returns `true` iff the object was
    /// BLACK (reachable, survives sweep); `false` means it was still WHITE
    /// (never marked, garbage).
    pub fn try_reset_mark(&self) -> bool {
        self.color
            .compare_exchange(
                Color::Black as u8,
                Color::White as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
    }
}

impl Default for ObjectHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeader").field("color", &self.color()).finish()
    }
}

/// An opaque handle to a heap object. `Copy`, `Send`, `Sync`, and equal to
/// another handle iff they refer to the same address — deliberately thin,
/// the same shape as `mmtk::util::ObjectReference`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ObjectRef(NonZeroUsize);

impl ObjectRef {
    pub fn from_raw(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(ObjectRef)
    }

    /// # Safety
    /// `addr` must be nonzero and must actually denote a live object the
    /// binding owns.
    pub unsafe fn from_raw_unchecked(addr: usize) -> Self {
        ObjectRef(NonZeroUsize::new_unchecked(addr))
    }

    pub fn to_raw(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.0.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_starts_white() {
        let h = ObjectHeader::new();
        assert_eq!(h.color(), Color::White);
    }

    #[test]
    fn try_mark_is_one_shot() {
        let h = ObjectHeader::new();
        assert!(h.try_mark());
        assert_eq!(h.color(), Color::Black);
        assert!(!h.try_mark());
    }

    #[test]
    fn try_reset_mark_only_flips_black() {
        let h = ObjectHeader::new();
        assert!(!h.try_reset_mark());
        h.try_mark();
        assert!(h.try_reset_mark());
        assert_eq!(h.color(), Color::White);
    }

    #[test]
    fn object_ref_roundtrips_raw_address() {
        let r = ObjectRef::from_raw(0x1000).unwrap();
        assert_eq!(r.to_raw(), 0x1000);
        assert!(ObjectRef::from_raw(0).is_none());
    }
}
