//! Single-slot rendezvous between a dump request and the signaled thread.

use peeps_stacktrace::StackTrace;

use crate::Tid;
use crate::spin::SpinLock;

/// `target` value while no request is in flight.
pub(crate) const NO_TARGET: Tid = 0;

struct Slot {
    target: Tid,
    ready: bool,
    trace: StackTrace,
}

/// Every field is read and written under the spin lock, from the requesting
/// thread and from the signal handler alike. Only one request may use a
/// channel at a time; callers serialize above this type.
pub(crate) struct Channel {
    slot: SpinLock<Slot>,
}

impl Channel {
    pub(crate) const fn new() -> Self {
        Self {
            slot: SpinLock::new(Slot {
                target: NO_TARGET,
                ready: false,
                trace: StackTrace::new(),
            }),
        }
    }

    /// Points the channel at `tid`. Panics if another target is still set.
    pub(crate) fn arm(&self, tid: Tid) {
        let mut slot = self.slot.lock();
        assert_eq!(
            slot.target, NO_TARGET,
            "invariant violated: stack dump channel armed while targeting another thread"
        );
        slot.target = tid;
        slot.ready = false;
    }

    /// Returns the channel to idle without harvesting.
    pub(crate) fn disarm(&self) {
        let mut slot = self.slot.lock();
        slot.target = NO_TARGET;
        slot.ready = false;
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.slot.lock().ready
    }

    /// Signal-handler side: publishes the stack of the calling thread if it
    /// is the current target. A stale or misdirected call changes nothing.
    ///
    /// `skip_frames` counts frames above `respond` to leave out of the trace.
    /// Async-signal-safe.
    #[inline(never)]
    pub(crate) fn respond(&self, tid: Tid, skip_frames: usize) -> bool {
        let mut slot = self.slot.lock();
        if slot.target == NO_TARGET || slot.target != tid {
            return false;
        }
        slot.trace = StackTrace::capture(skip_frames + 1);
        slot.ready = true;
        true
    }

    /// Takes the published trace, if any, and returns the channel to idle.
    /// Panics if the channel is not targeting `tid`.
    pub(crate) fn harvest(&self, tid: Tid) -> Option<StackTrace> {
        let mut slot = self.slot.lock();
        assert_eq!(
            slot.target, tid,
            "invariant violated: stack dump channel target changed during a request"
        );
        let trace = slot.ready.then_some(slot.trace);
        slot.target = NO_TARGET;
        slot.ready = false;
        trace
    }

    #[cfg(test)]
    pub(crate) fn target(&self) -> Tid {
        self.slot.lock().target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_response_does_not_touch_the_slot() {
        let channel = Channel::new();
        channel.arm(41);

        assert!(!channel.respond(42, 0));
        assert!(!channel.is_ready());
        assert_eq!(channel.target(), 41);
        assert_eq!(channel.harvest(41), None);
    }

    #[test]
    fn response_while_idle_is_ignored() {
        let channel = Channel::new();
        assert!(!channel.respond(NO_TARGET, 0));
        assert!(!channel.respond(7, 0));
        assert!(!channel.is_ready());
        assert_eq!(channel.target(), NO_TARGET);
    }

    #[test]
    fn matching_response_publishes_a_trace() {
        let channel = Channel::new();
        channel.arm(7);

        assert!(channel.respond(7, 0));
        assert!(channel.is_ready());

        let trace = channel.harvest(7).expect("published trace");
        assert!(!trace.is_empty());
        assert_eq!(channel.target(), NO_TARGET);
        assert!(!channel.is_ready());
    }

    #[test]
    fn late_response_after_harvest_is_a_no_op() {
        let channel = Channel::new();
        channel.arm(7);
        assert_eq!(channel.harvest(7), None);

        assert!(!channel.respond(7, 0));
        assert!(!channel.is_ready());

        channel.arm(8);
        assert!(!channel.respond(7, 0));
        assert_eq!(channel.harvest(8), None);
    }

    #[inline(never)]
    fn respond_from_named_frame(channel: &Channel, tid: Tid) -> bool {
        std::hint::black_box(channel.respond(tid, 0))
    }

    #[test]
    fn response_trace_starts_at_the_caller_of_respond() {
        let channel = Channel::new();
        channel.arm(7);
        assert!(respond_from_named_frame(&channel, 7));

        let trace = channel.harvest(7).expect("published trace");
        let first = StackTrace::from_frames(&trace.frames()[..1]).symbolize();
        assert!(first.contains("respond_from_named_frame"), "got: {first}");
    }

    #[test]
    fn disarm_resets_to_idle() {
        let channel = Channel::new();
        channel.arm(9);
        channel.disarm();
        assert_eq!(channel.target(), NO_TARGET);
        channel.arm(10);
        assert_eq!(channel.target(), 10);
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn arming_twice_panics() {
        let channel = Channel::new();
        channel.arm(1);
        channel.arm(2);
    }

    #[test]
    #[should_panic(expected = "invariant violated")]
    fn harvesting_the_wrong_target_panics() {
        let channel = Channel::new();
        channel.arm(1);
        let _ = channel.harvest(2);
    }
}
