//! One-shot resize notification.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A boolean raised by the event handler when the drawable size changes
/// and cleared by the frame loop when it reads it.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the surface as resized.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read and clear the flag in one step.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears() {
        let flag = ResizeFlag::new();
        assert!(!flag.take());

        flag.raise();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_repeated_raise_reads_once() {
        let flag = ResizeFlag::new();
        flag.raise();
        flag.raise();
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn test_clones_share_state() {
        let flag = ResizeFlag::new();
        let writer = flag.clone();

        std::thread::spawn(move || writer.raise()).join().unwrap();

        assert!(flag.take());
    }
}
