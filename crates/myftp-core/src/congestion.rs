//! Loss-based congestion window.
//!
//! Slow start and congestion avoidance are not separate states: the phase is
//! whichever side of `ssthresh` the window currently sits on.

#[derive(Debug, Clone, PartialEq)]
pub struct CongestionController {
    window: f64,
    ssthresh: f64,
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl CongestionController {
    pub fn new(initial_ssthresh: f64) -> Self {
        Self {
            window: 1.0,
            ssthresh: initial_ssthresh,
        }
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn in_slow_start(&self) -> bool {
        self.window < self.ssthresh
    }

    /// Snap the window to a whole number of packets and return it as the
    /// burst size of the round that is starting. Halves round to even.
    pub fn begin_round(&mut self) -> u32 {
        self.window = self.window.round_ties_even().max(1.0);
        self.window as u32
    }

    /// A packet was acknowledged without a loss signal.
    pub fn on_ack(&mut self) {
        if self.in_slow_start() {
            self.window += 1.0;
        } else {
            self.window += 1.0 / self.window;
        }
    }

    /// Duplicate acknowledgments reported a loss.
    pub fn on_loss(&mut self) {
        self.ssthresh = self.window / 2.0;
        self.window = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_slow_start_with_one_packet() {
        let mut cc = CongestionController::default();
        assert_eq!(cc.window(), 1.0);
        assert_eq!(cc.ssthresh(), 100.0);
        assert!(cc.in_slow_start());
        assert_eq!(cc.begin_round(), 1);
    }

    #[test]
    fn ten_slow_start_steps_reach_eleven() {
        let mut cc = CongestionController::default();
        for _ in 0..10 {
            cc.on_ack();
        }
        assert_eq!(cc.window(), 11.0);
    }

    #[test]
    fn avoidance_growth_is_monotonic_and_sublinear() {
        let mut cc = CongestionController::new(4.0);
        while cc.in_slow_start() {
            cc.on_ack();
        }
        assert_eq!(cc.window(), 4.0);

        let mut previous = cc.window();
        let mut previous_step = f64::INFINITY;
        for _ in 0..50 {
            cc.on_ack();
            let step = cc.window() - previous;
            assert!(step > 0.0);
            assert!(step < 1.0);
            assert!(step <= previous_step);
            previous_step = step;
            previous = cc.window();
        }
        // Roughly one packet per window's worth of acknowledgments.
        assert!(cc.window() < 14.0);
    }

    #[test]
    fn loss_halves_threshold_and_resets_window() {
        let mut cc = CongestionController::default();
        for _ in 0..15 {
            cc.on_ack();
        }
        cc.on_loss();
        assert_eq!(cc.ssthresh(), 8.0);
        assert_eq!(cc.window(), 1.0);
        assert_eq!(cc.begin_round(), 1);
    }

    #[test]
    fn window_never_drops_below_one() {
        let mut cc = CongestionController::default();
        cc.on_loss();
        cc.on_loss();
        assert_eq!(cc.window(), 1.0);
        assert_eq!(cc.ssthresh(), 0.5);
        cc.on_ack();
        assert_eq!(cc.window(), 2.0);
    }

    #[test]
    fn round_snaps_fractional_window() {
        let mut cc = CongestionController::new(3.0);
        cc.on_ack(); // 2.0
        cc.on_ack(); // 3.0
        cc.on_ack(); // 3.333
        assert_eq!(cc.begin_round(), 3);
        assert_eq!(cc.window(), 3.0);
    }

    #[test]
    fn half_windows_round_to_even() {
        // Threshold 1.5 is what a loss at window 3 leaves behind.
        let mut cc = CongestionController::new(1.5);
        cc.on_ack(); // 2.0
        cc.on_ack(); // 2.5
        assert_eq!(cc.begin_round(), 2);
        assert_eq!(cc.window(), 2.0);

        for (window, burst) in [(3.5, 4), (4.5, 4), (5.5, 6)] {
            cc.window = window;
            assert_eq!(cc.begin_round(), burst, "window {window}");
        }
    }
}
