//! Fixed-capacity stack traces that can be captured from a signal handler.
//!
//! A [`StackTrace`] is a plain `Copy` value holding up to [`MAX_FRAMES`] raw
//! return addresses, innermost call first. Capturing never allocates, so it
//! is usable from an asynchronously delivered signal handler. Rendering
//! (hex or symbolized text) happens later, on an ordinary thread.

mod hex;
mod resolve;
mod symbolize;

pub use hex::{HEX_BUFFER_LEN, HEX_FIELD_WIDTH, ParseHexError};
pub use resolve::DebugInfoResolver;
pub use symbolize::{ResolveSymbol, UNKNOWN_SYMBOL};

/// Maximum number of frames a [`StackTrace`] holds.
pub const MAX_FRAMES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackTrace {
    frames: [usize; MAX_FRAMES],
    len: usize,
}

impl Default for StackTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl StackTrace {
    /// An empty trace.
    pub const fn new() -> Self {
        Self {
            frames: [0; MAX_FRAMES],
            len: 0,
        }
    }

    /// Builds a trace from raw addresses, keeping at most [`MAX_FRAMES`].
    pub fn from_frames(frames: &[usize]) -> Self {
        let mut trace = Self::new();
        let len = frames.len().min(MAX_FRAMES);
        trace.frames[..len].copy_from_slice(&frames[..len]);
        trace.len = len;
        trace
    }

    /// Captures the current call stack.
    ///
    /// The first recorded frame is the caller of `capture`, after skipping a
    /// further `skip_frames` frames. Async-signal-safe: no allocation, no
    /// locks, at most [`MAX_FRAMES`] frames stored.
    #[inline(never)]
    pub fn capture(skip_frames: usize) -> Self {
        let mut trace = Self::new();

        // Frames whose stack pointer sits at or below this local are the
        // unwinder's and `capture`'s own; the first frame above it is the
        // caller.
        let anchor = 0u8;
        let anchor_addr = std::hint::black_box(&anchor) as *const u8 as usize;

        let mut reached_caller = false;
        let mut skip_remaining = skip_frames;

        // SAFETY: the callback touches only stack-local state and the fixed
        // frame array. No other unwinder is running on this thread.
        unsafe {
            backtrace::trace_unsynchronized(|frame| {
                let ip = frame.ip() as usize;
                if ip == 0 {
                    return false;
                }

                if !reached_caller {
                    let sp = frame.sp() as usize;
                    if sp != 0 && sp <= anchor_addr {
                        return true;
                    }
                    reached_caller = true;
                }

                if skip_remaining > 0 {
                    skip_remaining -= 1;
                    return true;
                }

                trace.frames[trace.len] = ip;
                trace.len += 1;
                trace.len < MAX_FRAMES
            });
        }

        trace
    }

    /// The captured frames, innermost first.
    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trace_is_empty() {
        let trace = StackTrace::new();
        assert!(trace.is_empty());
        assert_eq!(trace.frames(), &[] as &[usize]);
    }

    #[test]
    fn from_frames_truncates_at_capacity() {
        let raw: Vec<usize> = (1..=MAX_FRAMES + 5).collect();
        let trace = StackTrace::from_frames(&raw);
        assert_eq!(trace.len(), MAX_FRAMES);
        assert_eq!(trace.frames(), &raw[..MAX_FRAMES]);
    }

    #[test]
    fn trace_is_a_plain_copy_value() {
        let first = StackTrace::from_frames(&[0x10, 0x20]);
        let copy = first;
        assert_eq!(first, copy);
    }

    #[inline(never)]
    fn capture_from_helper(skip: usize) -> StackTrace {
        std::hint::black_box(StackTrace::capture(skip))
    }

    #[test]
    fn capture_records_frames_within_capacity() {
        let trace = capture_from_helper(0);
        assert!(!trace.is_empty(), "capture must record at least one frame");
        assert!(trace.len() <= MAX_FRAMES);
        assert!(trace.frames().iter().all(|&ip| ip != 0));
    }

    fn first_frame_symbol(trace: &StackTrace) -> String {
        let first = trace.frames().first().copied().expect("at least one frame");
        StackTrace::from_frames(&[first]).symbolize()
    }

    #[test]
    fn capture_starts_at_its_caller() {
        let trace = capture_from_helper(0);
        let first = first_frame_symbol(&trace);
        assert!(first.contains("capture_from_helper"), "got: {first}");
    }

    #[test]
    fn capture_skip_moves_to_the_callers_caller() {
        let trace = capture_from_helper(1);
        let first = first_frame_symbol(&trace);
        assert!(!first.contains("capture_from_helper"), "got: {first}");
        assert!(
            first.contains("capture_skip_moves_to_the_callers_caller"),
            "got: {first}"
        );
    }

    #[test]
    fn skipped_capture_is_the_full_capture_shifted_by_one() {
        let full = capture_from_helper(0);
        let skipped = capture_from_helper(1);
        assert!(full.len() >= 3, "{full:?}");
        assert!(skipped.len() >= 2, "{skipped:?}");
        // The two calls to the helper return to different addresses in this
        // test, but everything above the test frame is shared.
        assert_eq!(full.frames()[2], skipped.frames()[1]);
    }
}
