use std::time::{Duration, Instant};

/// Timings and counters gathered during one call to `World::step`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub island_time: Duration,
    pub solver_time: Duration,
    pub integrator_time: Duration,
    pub total_time: Duration,

    pub body_count: usize,
    pub active_body_count: usize,
    pub pair_count: usize,
    pub manifold_count: usize,
    pub contact_count: usize,
    pub island_count: usize,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Writes the profile through the `log` facade at debug level.
    pub fn report(&self) {
        let total_us = self.total_time.as_micros() as f32;
        if total_us < 1.0 || !log::log_enabled!(log::Level::Debug) {
            return;
        }

        let share = |phase: Duration| phase.as_micros() as f32 / total_us * 100.0;
        log::debug!(
            "step {:.2} ms | bodies {} ({} active), pairs {}, manifolds {}, contacts {}, islands {}",
            self.total_time.as_secs_f32() * 1000.0,
            self.body_count,
            self.active_body_count,
            self.pair_count,
            self.manifold_count,
            self.contact_count,
            self.island_count
        );
        log::debug!(
            "  broad {:.1}% narrow {:.1}% islands {:.1}% solver {:.1}% integrate {:.1}%",
            share(self.broad_phase_time),
            share(self.narrow_phase_time),
            share(self.island_time),
            share(self.solver_time),
            share(self.integrator_time)
        );
    }
}

/// Adds the elapsed time to `output` when dropped.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
