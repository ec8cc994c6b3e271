use super::World;
use crate::{
    config::DEFAULT_TIME_STEP,
    error::{PhysicsError, PhysicsResult},
};

/// Turns variable frame times into a bounded number of fixed steps.
#[derive(Debug, Clone)]
pub struct FixedStepper {
    time_step: f32,
    max_substeps: u32,
    accumulator: f32,
}

impl Default for FixedStepper {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_STEP)
    }
}

impl FixedStepper {
    pub fn new(time_step: f32) -> Self {
        let time_step = if time_step > 0.0 && time_step.is_finite() {
            time_step
        } else {
            DEFAULT_TIME_STEP
        };
        Self {
            time_step,
            max_substeps: 8,
            accumulator: 0.0,
        }
    }

    pub fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps.max(1);
        self
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// Fraction of a step left in the accumulator, for interpolating poses.
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.time_step
    }

    /// Runs as many fixed steps as `elapsed` allows and returns how many ran.
    /// Time beyond `max_substeps` steps is dropped.
    pub fn advance(&mut self, world: &mut World, elapsed: f32, multithreaded: bool) -> PhysicsResult<u32> {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(PhysicsError::InvalidTimeStep(elapsed));
        }

        self.accumulator += elapsed;
        let mut steps = 0;
        while self.accumulator >= self.time_step && steps < self.max_substeps {
            world.step(self.time_step, multithreaded)?;
            self.accumulator -= self.time_step;
            steps += 1;
        }

        if self.accumulator >= self.time_step {
            log::warn!(
                "physics fell behind, dropping {:.1} ms of simulation time",
                (self.accumulator - self.accumulator % self.time_step) * 1000.0
            );
            self.accumulator %= self.time_step;
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut world = World::default();
        let mut stepper = FixedStepper::new(0.01);
        assert_eq!(stepper.advance(&mut world, 0.004, false), Ok(0));
        assert_eq!(stepper.advance(&mut world, 0.007, false), Ok(1));
        assert!(stepper.alpha() < 0.2);
    }

    #[test]
    fn long_frames_are_capped() {
        let mut world = World::default();
        let mut stepper = FixedStepper::new(0.01).with_max_substeps(3);
        assert_eq!(stepper.advance(&mut world, 1.0, false), Ok(3));
        assert!(stepper.alpha() < 1.0);
        assert!(stepper.advance(&mut world, -1.0, false).is_err());
    }
}
