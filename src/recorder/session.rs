//! Per-connection recorder sessions.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::replay::{replay, ReplayEvent, ReplayOutcome};
use super::{Recorder, RecorderError, TrajectorySummary};

#[derive(Default)]
struct Session {
    recorder: Recorder,
    replay: Option<CancellationToken>,
}

impl Session {
    fn cancel_replay(&mut self) -> bool {
        match self.replay.take() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }
}

/// Handle to a running replay task
pub struct ReplayHandle {
    cancel: CancellationToken,
    task: JoinHandle<ReplayOutcome>,
}

impl ReplayHandle {
    /// Cancel the replay and wait for it to stop
    pub async fn cancel(self) -> anyhow::Result<ReplayOutcome> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the replay to finish on its own
    pub async fn join(self) -> anyhow::Result<ReplayOutcome> {
        Ok(self.task.await?)
    }
}

/// Recorder sessions keyed by connection id
///
/// Sessions exist between [`SessionStore::open`] and
/// [`SessionStore::close`]; closing a session cancels its replay.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session; returns false if it was already open
    pub async fn open(&self, connection: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(connection) {
            return false;
        }
        sessions.insert(connection.to_string(), Session::default());
        info!(connection, "Recorder session opened");
        true
    }

    /// Close a session, cancelling any in-flight replay
    pub async fn close(&self, connection: &str) -> bool {
        let removed = self.sessions.lock().await.remove(connection);
        match removed {
            Some(mut session) => {
                session.cancel_replay();
                info!(connection, "Recorder session closed");
                true
            }
            None => false,
        }
    }

    pub async fn is_open(&self, connection: &str) -> bool {
        self.sessions.lock().await.contains_key(connection)
    }

    /// Record a trajectory in `connection`'s session
    pub async fn record(
        &self,
        connection: &str,
        id: &str,
        raw_points: &[Value],
        metadata: Option<Map<String, Value>>,
    ) -> Result<TrajectorySummary, RecorderError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(connection)
            .ok_or_else(|| RecorderError::UnknownSession(connection.to_string()))?;
        Ok(session.recorder.record(id, raw_points, metadata).summary())
    }

    pub async fn trajectories(&self, connection: &str) -> Result<Vec<TrajectorySummary>, RecorderError> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(connection)
            .map(|session| session.recorder.list())
            .ok_or_else(|| RecorderError::UnknownSession(connection.to_string()))
    }

    /// Start replaying a trajectory (latest when `trajectory_id` is `None`)
    ///
    /// Any replay already running in the session is cancelled first.
    /// Errors about the trajectory itself are reported through `sink`.
    pub async fn start_replay(
        &self,
        connection: &str,
        trajectory_id: Option<&str>,
        speed: f64,
        sink: mpsc::Sender<ReplayEvent>,
    ) -> Result<ReplayHandle, RecorderError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(connection)
            .ok_or_else(|| RecorderError::UnknownSession(connection.to_string()))?;

        if session.cancel_replay() {
            info!(connection, "Previous replay cancelled");
        }

        let trajectory = session.recorder.get(trajectory_id).cloned();
        let cancel = CancellationToken::new();
        session.replay = Some(cancel.clone());

        let token = cancel.clone();
        let task = tokio::spawn(async move { replay(trajectory.as_ref(), speed, &sink, &token).await });

        Ok(ReplayHandle { cancel, task })
    }

    /// Cancel the session's replay; returns whether one was running
    pub async fn cancel_replay(&self, connection: &str) -> Result<bool, RecorderError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(connection)
            .ok_or_else(|| RecorderError::UnknownSession(connection.to_string()))?;
        Ok(session.cancel_replay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_close_lifecycle() {
        let store = SessionStore::new();
        assert!(store.open("ws-1").await);
        assert!(!store.open("ws-1").await);
        assert!(store.is_open("ws-1").await);

        assert!(store.close("ws-1").await);
        assert!(!store.close("ws-1").await);
        assert_eq!(
            store.record("ws-1", "t", &[], None).await,
            Err(RecorderError::UnknownSession("ws-1".into()))
        );
    }

    #[tokio::test]
    async fn test_replay_without_trajectory_reports_error() {
        let store = SessionStore::new();
        store.open("ws-1").await;

        let (tx, mut rx) = mpsc::channel(4);
        let handle = store.start_replay("ws-1", None, 1.0, tx).await.unwrap();

        assert_eq!(
            handle.join().await.unwrap(),
            ReplayOutcome::Failed(RecorderError::NoTrajectory)
        );
        assert!(matches!(rx.recv().await, Some(ReplayEvent::Error { .. })));
    }
}
