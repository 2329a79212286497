//! Spatial transform of an entity: translation, rotation and scale.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    pub translation: [f64; 3],
    /// Quaternion, (x, y, z, w).
    pub rotation:    [f64; 4],
    pub scale:       [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0, 0.0, 0.0],
        rotation:    [0.0, 0.0, 0.0, 1.0],
        scale:       [1.0, 1.0, 1.0],
    };

    /// Identity rotation and scale at the given position.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self { translation: [x, y, z], ..Self::IDENTITY }
    }

    pub fn with_scale(mut self, scale: [f64; 3]) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: [f64; 4]) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn is_finite(&self) -> bool {
        self.translation
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter())
            .all(|c| c.is_finite())
    }

    /// Euclidean distance between the two translations.
    pub fn distance_to(&self, other: &Transform) -> f64 {
        self.translation
            .iter()
            .zip(other.translation.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }

    /// Translation within `epsilon` of each other, and every rotation and
    /// scale component within `epsilon` too.
    pub fn approx_eq(&self, other: &Transform, epsilon: f64) -> bool {
        let distance = self.distance_to(other);
        if distance.is_nan() || distance > epsilon {
            return false;
        }
        let rotation_close = self
            .rotation
            .iter()
            .zip(other.rotation.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon);
        let scale_close = self
            .scale
            .iter()
            .zip(other.scale.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon);
        rotation_close && scale_close
    }
}
