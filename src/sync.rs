use crossbeam_utils::Backoff;

#[cfg(not(feature = "loom"))]
pub(crate) use core::sync::atomic::{AtomicPtr, Ordering};
#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{AtomicPtr, Ordering};

#[cfg(all(debug_assertions, not(feature = "loom")))]
pub(crate) use core::sync::atomic::AtomicBool;
#[cfg(all(debug_assertions, feature = "loom"))]
pub(crate) use loom::sync::atomic::AtomicBool;

/// Waits for another thread to make progress.
///
/// Loom has to see the yield, otherwise it explores the spin forever.
#[inline]
pub(crate) fn snooze(backoff: &Backoff) {
    #[cfg(feature = "loom")]
    {
        let _ = backoff;
        loom::thread::yield_now();
    }
    #[cfg(not(feature = "loom"))]
    backoff.snooze();
}
