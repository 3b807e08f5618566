//! Timed replay of a recorded trajectory.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{RecordedTrajectory, RecorderError};

/// Messages streamed to the client during a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Start {
        trajectory_id: String,
        point_count: usize,
        duration_ms: i64,
        speed_multiplier: f64,
    },
    Waypoint {
        index: usize,
        total: usize,
        x: f64,
        y: f64,
        z: f64,
        gripper_open: bool,
        timestamp_ms: i64,
    },
    Done {
        trajectory_id: String,
        points_sent: usize,
    },
    Error {
        error: String,
    },
    Cancelled,
}

/// How a replay ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    Completed { points_sent: usize },
    Cancelled { points_sent: usize },
    Failed(RecorderError),
    /// The receiving side went away
    Disconnected { points_sent: usize },
}

fn check_replayable(
    trajectory: Option<&RecordedTrajectory>,
    speed: f64,
) -> Result<&RecordedTrajectory, RecorderError> {
    let trajectory = trajectory.ok_or(RecorderError::NoTrajectory)?;
    if !speed.is_finite() || speed <= 0.0 {
        return Err(RecorderError::InvalidSpeed(speed));
    }
    if trajectory.point_count() < 2 {
        return Err(RecorderError::TooShort(trajectory.point_count()));
    }
    Ok(trajectory)
}

/// Wall-clock offset of a point `relative_ms` after the first one
fn offset(relative_ms: i64, speed: f64) -> Duration {
    let seconds = relative_ms.max(0) as f64 / 1000.0 / speed;
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
}

/// Stream `trajectory` into `sink` at its recorded timing scaled by `speed`
///
/// Point `i` is emitted `(t_i - t_0) / speed` after the start. Cancelling
/// `cancel` stops the replay after the last fully emitted waypoint and
/// sends [`ReplayEvent::Cancelled`].
pub async fn replay(
    trajectory: Option<&RecordedTrajectory>,
    speed: f64,
    sink: &mpsc::Sender<ReplayEvent>,
    cancel: &CancellationToken,
) -> ReplayOutcome {
    let trajectory = match check_replayable(trajectory, speed) {
        Ok(trajectory) => trajectory,
        Err(e) => {
            warn!(error = %e, "Replay rejected");
            // The outcome carries the error even when nobody is listening
            let _ = sink.send(ReplayEvent::Error { error: e.to_string() }).await;
            return ReplayOutcome::Failed(e);
        }
    };

    info!(
        trajectory = %trajectory.id,
        points = trajectory.point_count(),
        speed,
        "Replaying trajectory"
    );

    let start_event = ReplayEvent::Start {
        trajectory_id: trajectory.id.clone(),
        point_count: trajectory.point_count(),
        duration_ms: trajectory.duration_ms(),
        speed_multiplier: speed,
    };
    if sink.send(start_event).await.is_err() {
        return ReplayOutcome::Disconnected { points_sent: 0 };
    }

    let start = Instant::now();
    let origin_ms = trajectory.points[0].timestamp_ms;
    let total = trajectory.point_count();

    for (index, point) in trajectory.points.iter().enumerate() {
        let due = offset(point.timestamp_ms - origin_ms, speed);
        let deadline = start.checked_add(due).unwrap_or(start);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(trajectory = %trajectory.id, points_sent = index, "Replay cancelled");
                let _ = sink.send(ReplayEvent::Cancelled).await;
                return ReplayOutcome::Cancelled { points_sent: index };
            }
            _ = sleep_until(deadline) => {}
        }

        let event = ReplayEvent::Waypoint {
            index,
            total,
            x: point.x,
            y: point.y,
            z: point.z,
            gripper_open: point.gripper_open,
            timestamp_ms: point.timestamp_ms,
        };
        if sink.send(event).await.is_err() {
            debug!(trajectory = %trajectory.id, "Replay receiver closed");
            return ReplayOutcome::Disconnected { points_sent: index };
        }
    }

    let done = ReplayEvent::Done {
        trajectory_id: trajectory.id.clone(),
        points_sent: total,
    };
    if sink.send(done).await.is_err() {
        return ReplayOutcome::Disconnected { points_sent: total };
    }

    info!(trajectory = %trajectory.id, "Replay complete");
    ReplayOutcome::Completed { points_sent: total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;
    use serde_json::json;

    fn short_trajectory() -> RecordedTrajectory {
        let mut recorder = Recorder::new();
        recorder
            .record(
                "demo",
                &[
                    json!({"timestamp_ms": 1000, "x": 0.0, "y": 1.0, "z": 0.0}),
                    json!({"timestamp_ms": 1010, "x": 0.1, "y": 1.0, "z": 0.0}),
                    json!({"timestamp_ms": 1020, "x": 0.2, "y": 1.0, "z": 0.0, "gripper_open": false}),
                ],
                None,
            )
            .clone()
    }

    #[test]
    fn test_offset_scales_with_speed() {
        assert_eq!(offset(1000, 2.0), Duration::from_millis(500));
        assert_eq!(offset(-50, 1.0), Duration::ZERO);
    }

    #[test]
    fn test_event_wire_format() {
        let value = serde_json::to_value(ReplayEvent::Cancelled).unwrap();
        assert_eq!(value, json!({"type": "cancelled"}));

        let value = serde_json::to_value(ReplayEvent::Error { error: "x".into() }).unwrap();
        assert_eq!(value, json!({"type": "error", "error": "x"}));
    }

    #[tokio::test]
    async fn test_replay_streams_all_points() {
        let trajectory = short_trajectory();
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = replay(Some(&trajectory), 1.0, &tx, &CancellationToken::new()).await;
        assert_eq!(outcome, ReplayOutcome::Completed { points_sent: 3 });
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], ReplayEvent::Start { point_count: 3, duration_ms: 20, .. }));
        assert!(matches!(events[3], ReplayEvent::Waypoint { index: 2, gripper_open: false, .. }));
        assert_eq!(
            events[4],
            ReplayEvent::Done {
                trajectory_id: "demo".into(),
                points_sent: 3
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_bad_inputs() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let outcome = replay(None, 1.0, &tx, &cancel).await;
        assert_eq!(outcome, ReplayOutcome::Failed(RecorderError::NoTrajectory));
        assert_eq!(
            rx.recv().await,
            Some(ReplayEvent::Error {
                error: "No trajectory available to replay".into()
            })
        );

        let trajectory = short_trajectory();
        let outcome = replay(Some(&trajectory), 0.0, &tx, &cancel).await;
        assert_eq!(outcome, ReplayOutcome::Failed(RecorderError::InvalidSpeed(0.0)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_no_waypoints() {
        let trajectory = short_trajectory();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = replay(Some(&trajectory), 1.0, &tx, &cancel).await;
        assert_eq!(outcome, ReplayOutcome::Cancelled { points_sent: 0 });
        assert!(matches!(rx.recv().await, Some(ReplayEvent::Start { .. })));
        assert_eq!(rx.recv().await, Some(ReplayEvent::Cancelled));
    }
}
