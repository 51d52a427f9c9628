//! Per-sensor decimation state machine
//!
//! A sensor is read on every tick until its first frame is matched. The
//! match arms the counter at zero; from then on the counter advances once
//! per tick and a read is attempted only when it is a multiple of the period.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimationState {
    Unarmed,
    /// Armed on a matched read; `since` counts ticks after the arming tick
    Armed { since: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimation {
    period: u32,
    state: DecimationState,
}

impl Decimation {
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            state: DecimationState::Unarmed,
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn state(&self) -> DecimationState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, DecimationState::Armed { .. })
    }

    /// Advance by one tick and report whether this tick should be read.
    pub fn begin_tick(&mut self) -> bool {
        match &mut self.state {
            DecimationState::Unarmed => true,
            DecimationState::Armed { since } => {
                *since += 1;
                *since % u64::from(self.period) == 0
            }
        }
    }

    /// Record a matched read. Only the first one arms the counter.
    pub fn on_match(&mut self) {
        if self.state == DecimationState::Unarmed {
            self.state = DecimationState::Armed { since: 0 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_reads_every_tick() {
        let mut d = Decimation::new(4);
        for _ in 0..10 {
            assert!(d.begin_tick());
        }
        assert!(!d.is_armed());
    }

    #[test]
    fn test_arming_boundary() {
        let mut d = Decimation::new(3);
        assert!(d.begin_tick());
        d.on_match();
        assert_eq!(d.state(), DecimationState::Armed { since: 0 });

        let attempts: Vec<bool> = (0..7).map(|_| d.begin_tick()).collect();
        assert_eq!(
            attempts,
            vec![false, false, true, false, false, true, false]
        );
    }

    #[test]
    fn test_later_matches_do_not_rearm() {
        let mut d = Decimation::new(2);
        d.begin_tick();
        d.on_match();
        assert!(!d.begin_tick());
        assert!(d.begin_tick());
        d.on_match();
        assert_eq!(d.state(), DecimationState::Armed { since: 2 });
    }

    #[test]
    fn test_period_one_and_zero() {
        let mut d = Decimation::new(0);
        assert_eq!(d.period(), 1);
        d.begin_tick();
        d.on_match();
        assert!((0..5).all(|_| d.begin_tick()));
    }
}
