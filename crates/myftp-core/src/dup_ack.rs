//! Duplicate-acknowledgment run detection.

/// What a newly received acknowledgment means for loss detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckSignal {
    /// The value differs from the tracked run; the run was cleared.
    Progress,
    /// The value started or extended a run that is still below the threshold.
    Tracking { ack: u32, run: u32 },
    /// The run reached the threshold; `stalled` is the packet to resend.
    Loss { stalled: u32 },
}

/// Fixed-size tracker of the current run of identical acknowledgments.
#[derive(Debug, Clone)]
pub struct DupAckTracker {
    threshold: u32,
    value: Option<u32>,
    run: u32,
}

impl Default for DupAckTracker {
    fn default() -> Self {
        Self::new(3)
    }
}

impl DupAckTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            value: None,
            run: 0,
        }
    }

    pub fn observe(&mut self, ack: u32) -> AckSignal {
        match self.value {
            Some(current) if current != ack => {
                self.reset();
                AckSignal::Progress
            }
            _ => {
                self.value = Some(ack);
                self.run += 1;
                if self.run >= self.threshold {
                    AckSignal::Loss { stalled: ack }
                } else {
                    AckSignal::Tracking { ack, run: self.run }
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.value = None;
        self.run = 0;
    }

    pub fn run(&self) -> u32 {
        self.run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_identical_ack_signals_loss() {
        let mut tracker = DupAckTracker::default();
        assert_eq!(tracker.observe(4), AckSignal::Tracking { ack: 4, run: 1 });
        assert_eq!(tracker.observe(4), AckSignal::Tracking { ack: 4, run: 2 });
        assert_eq!(tracker.observe(4), AckSignal::Loss { stalled: 4 });
    }

    #[test]
    fn advancing_ack_clears_the_run() {
        let mut tracker = DupAckTracker::default();
        tracker.observe(2);
        tracker.observe(2);
        assert_eq!(tracker.observe(3), AckSignal::Progress);
        assert_eq!(tracker.run(), 0);
        assert_eq!(tracker.value, None);
        // The value after progress starts a new run.
        assert_eq!(tracker.observe(5), AckSignal::Tracking { ack: 5, run: 1 });
    }

    #[test]
    fn in_order_stream_never_reports_loss() {
        let mut tracker = DupAckTracker::default();
        for ack in 1..100 {
            assert!(!matches!(tracker.observe(ack), AckSignal::Loss { .. }));
        }
    }
}
