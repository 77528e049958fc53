use std::time::{Duration, Instant};

/// A local claim on device memory that the monitor has not reported yet
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reservation {
    pub amount: u64,
    pub recorded_at: Instant,
}

/// Recent reservations for one device.
/// `running_sum` is kept equal to the sum of `reservations` on every insert
/// and removal.
#[derive(Debug, Default)]
pub(crate) struct DeviceBuffer {
    reservations: Vec<Reservation>,
    running_sum: u64,
}

impl DeviceBuffer {
    pub fn record(&mut self, amount: u64, now: Instant) {
        self.reservations.push(Reservation {
            amount,
            recorded_at: now,
        });
        self.running_sum = self.running_sum.saturating_add(amount);
        self.debug_check();
    }

    /// Drops every reservation older than `window` as of `now` and returns how
    /// many were dropped. Reservations stamped after `now` are kept.
    pub fn sweep(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.reservations.len();
        let running_sum = &mut self.running_sum;
        self.reservations.retain(|r| {
            let live = now.saturating_duration_since(r.recorded_at) <= window;
            if !live {
                *running_sum = running_sum.saturating_sub(r.amount);
            }
            live
        });
        self.debug_check();
        before - self.reservations.len()
    }

    pub fn running_sum(&self) -> u64 {
        self.running_sum
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    fn debug_check(&self) {
        debug_assert_eq!(
            self.running_sum,
            self.reservations
                .iter()
                .fold(0u64, |acc, r| acc.saturating_add(r.amount)),
            "running sum out of sync with reservations"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_follows_inserts_and_sweeps() {
        let t0 = Instant::now();
        let window = Duration::from_secs(10);
        let mut buf = DeviceBuffer::default();

        buf.record(100, t0);
        buf.record(50, t0 + Duration::from_secs(5));
        assert_eq!(buf.running_sum(), 150);

        assert_eq!(buf.sweep(t0 + Duration::from_secs(10), window), 0);
        assert_eq!(buf.running_sum(), 150);

        assert_eq!(buf.sweep(t0 + Duration::from_secs(11), window), 1);
        assert_eq!(buf.running_sum(), 50);
        assert_eq!(buf.len(), 1);

        assert_eq!(buf.sweep(t0 + Duration::from_secs(16), window), 1);
        assert_eq!(buf.running_sum(), 0);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn sweep_removes_regardless_of_position() {
        let t0 = Instant::now();
        let mut buf = DeviceBuffer::default();
        // out of timestamp order: the old one sits in the middle
        buf.record(1, t0 + Duration::from_secs(20));
        buf.record(2, t0);
        buf.record(4, t0 + Duration::from_secs(21));

        assert_eq!(buf.sweep(t0 + Duration::from_secs(25), Duration::from_secs(10)), 1);
        assert_eq!(buf.running_sum(), 5);
    }

    #[test]
    fn future_stamps_survive_sweep() {
        let t0 = Instant::now();
        let mut buf = DeviceBuffer::default();
        buf.record(7, t0 + Duration::from_secs(1));
        assert_eq!(buf.sweep(t0, Duration::ZERO), 0);
        assert_eq!(buf.running_sum(), 7);
    }
}
