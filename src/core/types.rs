use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

/// Mass and inertia tensor about the body origin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub inertia: Mat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: Mat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub const ZERO: Self = Self {
        mass: 0.0,
        inertia: Mat3::ZERO,
    };

    pub fn accumulate(&mut self, other: &MassProperties) {
        self.mass += other.mass;
        self.inertia += other.inertia;
    }

    /// Inverse mass and inverse inertia; degenerate values collapse to an
    /// unit mass so that the body still responds to impulses.
    pub fn inverses(&self) -> (f32, Mat3) {
        if !(self.mass > f32::EPSILON) || !self.mass.is_finite() {
            log::warn!("degenerate mass {} replaced by unit mass", self.mass);
            return (1.0, Mat3::IDENTITY);
        }
        let inverse_inertia = if self.inertia.determinant().abs() < f32::EPSILON {
            log::warn!("singular inertia tensor replaced by identity");
            Mat3::IDENTITY
        } else {
            self.inertia.inverse()
        };
        (1.0 / self.mass, inverse_inertia)
    }
}

/// Surface coefficients of a body used by its contacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
    pub mixing: MaterialMixing,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.2,
            restitution: 0.0,
            mixing: MaterialMixing::default(),
        }
    }
}

impl Material {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            ..Self::default()
        }
    }

    pub fn rubber() -> Self {
        Self::new(1.0, 0.8)
    }

    pub fn steel() -> Self {
        Self::new(0.45, 0.4)
    }

    pub fn ice() -> Self {
        Self::new(0.03, 0.05).with_mixing(MaterialMixing {
            friction: MixingMode::Min,
            restitution: MixingMode::Average,
        })
    }

    pub fn with_mixing(mut self, mixing: MaterialMixing) -> Self {
        self.mixing = mixing;
        self
    }

    /// Friction and restitution used by a contact between two materials.
    pub fn combine(a: &Material, b: &Material) -> (f32, f32) {
        let friction_mode = a.mixing.friction.resolve(b.mixing.friction);
        let restitution_mode = a.mixing.restitution.resolve(b.mixing.restitution);
        (
            friction_mode.combine(a.friction, b.friction),
            restitution_mode.combine(a.restitution, b.restitution),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MaterialMixing {
    pub friction: MixingMode,
    pub restitution: MixingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    #[default]
    Average,
    Min,
    Max,
    GeometricMean,
}

impl MixingMode {
    fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.max(0.0) * b.max(0.0)).sqrt(),
        }
    }

    /// A non-default mode wins over `Average`.
    fn resolve(self, other: MixingMode) -> MixingMode {
        if self == MixingMode::Average {
            other
        } else {
            self
        }
    }
}

/// Inertia tensors of solid primitives about their center.
pub trait InertiaTensorExt {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3;
    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_box(half_extents: Vec3, mass: f32) -> Mat3 {
        let size = half_extents * 2.0;
        let factor = mass / 12.0;
        Mat3::from_diagonal(Vec3::new(
            factor * (size.y * size.y + size.z * size.z),
            factor * (size.x * size.x + size.z * size.z),
            factor * (size.x * size.x + size.y * size.y),
        ))
    }

    fn for_solid_sphere(radius: f32, mass: f32) -> Mat3 {
        Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mixing_modes_combine_expected_values() {
        assert_relative_eq!(MixingMode::Average.combine(0.6, 0.2), 0.4, epsilon = 1e-5);
        assert_relative_eq!(MixingMode::Min.combine(0.6, 0.2), 0.2, epsilon = 1e-5);
        assert_relative_eq!(MixingMode::Max.combine(0.6, 0.2), 0.6, epsilon = 1e-5);
        assert_relative_eq!(
            MixingMode::GeometricMean.combine(0.6, 0.2),
            (0.6_f32 * 0.2).sqrt(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn explicit_mixing_mode_overrides_average() {
        let ice = Material::ice();
        let rubber = Material::rubber();
        let (friction, restitution) = Material::combine(&rubber, &ice);
        assert_relative_eq!(friction, 0.03, epsilon = 1e-6);
        assert_relative_eq!(restitution, 0.425, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_mass_falls_back_to_unit() {
        let (inv_mass, inv_inertia) = MassProperties::ZERO.inverses();
        assert_eq!(inv_mass, 1.0);
        assert_eq!(inv_inertia, Mat3::IDENTITY);
    }
}
