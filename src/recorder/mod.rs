//! Guide-mode trajectory recording and replay.
//!
//! A trajectory is a list of timestamped end-effector poses captured while
//! the operator guides the arm. Each connection owns a [`Recorder`] inside
//! a [`SessionStore`]; replays stream the recorded poses back with their
//! original timing and can be cancelled at any point.

pub mod replay;
pub mod session;

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

pub use replay::{replay, ReplayEvent, ReplayOutcome};
pub use session::{ReplayHandle, SessionStore};

/// Errors raised by the recorder and replay
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecorderError {
    #[error("Unknown session '{0}'")]
    UnknownSession(String),

    #[error("No trajectory available to replay")]
    NoTrajectory,

    #[error("Trajectory too short to replay ({0} points)")]
    TooShort(usize),

    #[error("Replay speed must be positive, got {0}")]
    InvalidSpeed(f64),

    #[error("Malformed trajectory point: {0}")]
    MalformedPoint(String),
}

/// One recorded pose
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Wall-clock capture time, milliseconds
    pub timestamp_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub gripper_open: bool,
}

impl TrajectoryPoint {
    /// Parse a raw point; `gripper_open` defaults to true
    pub fn from_value(raw: &Value) -> Result<Self, RecorderError> {
        let number = |key: &str| {
            raw.get(key).and_then(Value::as_f64).ok_or_else(|| {
                RecorderError::MalformedPoint(format!("missing or non-numeric '{}' in {}", key, raw))
            })
        };

        let gripper_open = match raw.get("gripper_open") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(open)) => *open,
            Some(other) => {
                return Err(RecorderError::MalformedPoint(format!(
                    "'gripper_open' must be a boolean, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            timestamp_ms: number("timestamp_ms")? as i64,
            x: number("x")?,
            y: number("y")?,
            z: number("z")?,
            gripper_open,
        })
    }
}

/// A complete recorded trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedTrajectory {
    pub id: String,
    pub points: Vec<TrajectoryPoint>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedTrajectory {
    /// Last minus first timestamp; 0 with fewer than two points
    pub fn duration_ms(&self) -> i64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() >= 2 => {
                last.timestamp_ms - first.timestamp_ms
            }
            _ => 0,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn summary(&self) -> TrajectorySummary {
        TrajectorySummary {
            id: self.id.clone(),
            duration_ms: self.duration_ms(),
            point_count: self.point_count(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Listing entry for a stored trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub id: String,
    pub duration_ms: i64,
    pub point_count: usize,
    pub metadata: Map<String, Value>,
}

/// In-memory trajectory store for one connection
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    trajectories: BTreeMap<String, RecordedTrajectory>,
    latest_id: Option<String>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a trajectory, replacing any with the same id
    ///
    /// Malformed points are skipped with a warning.
    pub fn record(
        &mut self,
        id: impl Into<String>,
        raw_points: &[Value],
        metadata: Option<Map<String, Value>>,
    ) -> &RecordedTrajectory {
        let id = id.into();
        let points = raw_points
            .iter()
            .filter_map(|raw| match TrajectoryPoint::from_value(raw) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!(trajectory = %id, error = %e, "Skipping trajectory point");
                    None
                }
            })
            .collect();

        let trajectory = RecordedTrajectory {
            id: id.clone(),
            points,
            metadata: metadata.unwrap_or_default(),
            recorded_at: Utc::now(),
        };
        info!(
            trajectory = %id,
            points = trajectory.point_count(),
            duration_ms = trajectory.duration_ms(),
            "Recorded trajectory"
        );

        self.latest_id = Some(id.clone());
        match self.trajectories.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(trajectory);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(trajectory),
        }
    }

    /// Trajectory by id, or the latest recorded when `id` is `None`
    pub fn get(&self, id: Option<&str>) -> Option<&RecordedTrajectory> {
        let id = id.or(self.latest_id.as_deref())?;
        self.trajectories.get(id)
    }

    pub fn latest(&self) -> Option<&RecordedTrajectory> {
        self.get(None)
    }

    /// Summaries of every stored trajectory, by id
    pub fn list(&self) -> Vec<TrajectorySummary> {
        self.trajectories.values().map(RecordedTrajectory::summary).collect()
    }
}
