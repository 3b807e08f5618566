//! End-effector waypoints.
//!
//! A waypoint is a 6-DOF pose in the world frame plus the gripper flag.
//! Positions are meters, orientations radians.

use serde::{Deserialize, Serialize};

/// A point in world space (x, y, z). `y` is up.
pub type Vec3 = [f64; 3];

/// A single target pose of the end-effector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,

    #[serde(default)]
    pub roll: f64,

    #[serde(default)]
    pub pitch: f64,

    #[serde(default)]
    pub yaw: f64,

    #[serde(default = "default_gripper_open")]
    pub gripper_open: bool,
}

fn default_gripper_open() -> bool {
    true
}

impl Waypoint {
    /// Create a waypoint at a position with neutral orientation
    pub fn at(position: Vec3, gripper_open: bool) -> Self {
        Self {
            x: position[0],
            y: position[1],
            z: position[2],
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            gripper_open,
        }
    }

    pub fn with_roll(mut self, roll: f64) -> Self {
        self.roll = roll;
        self
    }

    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_yaw(mut self, yaw: f64) -> Self {
        self.yaw = yaw;
        self
    }

    pub fn position(&self) -> Vec3 {
        [self.x, self.y, self.z]
    }

    /// Orientation as (roll, pitch, yaw) paired with axis labels
    pub fn orientation(&self) -> [(&'static str, f64); 3] {
        [("roll", self.roll), ("pitch", self.pitch), ("yaw", self.yaw)]
    }

    /// Euclidean distance between the positions of two waypoints
    pub fn distance_to(&self, other: &Waypoint) -> f64 {
        distance(self.position(), other.position())
    }
}

/// Euclidean distance between two points
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Waypoint::at([0.0, 0.0, 0.0], true);
        let b = Waypoint::at([3.0, 4.0, 0.0], true);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_deserialize_defaults() {
        let wp: Waypoint = serde_json::from_str(r#"{"x": 1.0, "y": 2.0, "z": 3.0}"#).unwrap();
        assert_eq!(wp.position(), [1.0, 2.0, 3.0]);
        assert_eq!(wp.roll, 0.0);
        assert!(wp.gripper_open);
    }
}
