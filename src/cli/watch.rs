//! Polling loop behind `watch`.

use super::table;
use crate::datasource::CommandRunner;
use crate::manager::Manager;
use crate::models::{Session, SessionStatus};
use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Status seen per session name on the previous tick
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: HashMap<String, SessionStatus>,
}

/// A change between two ticks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Appeared { name: String, status: SessionStatus },
    Changed { name: String, from: SessionStatus, to: SessionStatus },
    Gone { name: String },
}

impl StatusTracker {
    /// Record this tick's sessions and return what changed since the last one.
    pub fn update(&mut self, sessions: &[Session]) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let mut current = HashMap::with_capacity(sessions.len());

        for session in sessions {
            match self.last.get(&session.name) {
                None => transitions.push(Transition::Appeared {
                    name: session.name.clone(),
                    status: session.status,
                }),
                Some(&prev) if prev != session.status => transitions.push(Transition::Changed {
                    name: session.name.clone(),
                    from: prev,
                    to: session.status,
                }),
                Some(_) => {}
            }
            current.insert(session.name.clone(), session.status);
        }

        let mut gone: Vec<&String> = self
            .last
            .keys()
            .filter(|name| !current.contains_key(*name))
            .collect();
        gone.sort();
        transitions.extend(gone.into_iter().map(|name| Transition::Gone { name: name.clone() }));

        self.last = current;
        transitions
    }
}

/// Redraw the session table every `every` until Ctrl+C.
///
/// Ticks never overlap: a slow detection delays the next tick instead of
/// queueing a burst.
pub async fn run<R: CommandRunner>(manager: &Manager<R>, every: Duration) -> Result<()> {
    run_until(manager, every, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Poll loop that returns as soon as `stop` completes, also mid-detection.
pub async fn run_until<R, F>(manager: &Manager<R>, every: Duration, stop: F) -> Result<()>
where
    R: CommandRunner,
    F: Future<Output = ()>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tracker = StatusTracker::default();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut stop => break,
        }

        let listed = tokio::select! {
            listed = manager.list() => listed,
            _ = &mut stop => break,
        };
        let sessions = match listed {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!(error = %e, "detection failed");
                continue;
            }
        };

        for transition in tracker.update(&sessions) {
            match transition {
                Transition::Appeared { name, status } => {
                    tracing::info!(session = %name, %status, "session appeared")
                }
                Transition::Changed { name, from, to } => {
                    tracing::info!(session = %name, %from, %to, "status changed")
                }
                Transition::Gone { name } => tracing::info!(session = %name, "session gone"),
            }
        }

        print!("{}{}", CLEAR_SCREEN, table::render(&sessions, chrono::Utc::now()));
    }

    tracing::debug!("watch interrupted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{CommandError, CommandOutput};
    use crate::detector::{Detector, DetectorConfig};

    /// Every command hangs far longer than any test waits.
    struct HangingRunner;

    impl CommandRunner for HangingRunner {
        async fn run(&self, _program: &str, _args: &[String]) -> Result<CommandOutput, CommandError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CommandOutput::default())
        }
    }

    fn session(name: &str, status: SessionStatus) -> Session {
        Session {
            name: name.to_string(),
            project: name.to_string(),
            status,
            started_at: None,
            last_activity_at: None,
            attached: false,
            process_id: None,
            cpu_percent: 0.0,
            mem_percent: 0.0,
            working_directory: String::new(),
            managed: true,
        }
    }

    #[test]
    fn test_tracker_transitions() {
        let mut tracker = StatusTracker::default();

        let first = tracker.update(&[session("cd-a", SessionStatus::Active)]);
        assert_eq!(
            first,
            vec![Transition::Appeared {
                name: "cd-a".to_string(),
                status: SessionStatus::Active
            }]
        );

        // unchanged tick reports nothing
        assert!(tracker.update(&[session("cd-a", SessionStatus::Active)]).is_empty());

        let changed = tracker.update(&[
            session("cd-a", SessionStatus::Waiting),
            session("cd-b", SessionStatus::Idle),
        ]);
        assert_eq!(changed.len(), 2);
        assert_eq!(
            changed[0],
            Transition::Changed {
                name: "cd-a".to_string(),
                from: SessionStatus::Active,
                to: SessionStatus::Waiting
            }
        );

        let gone = tracker.update(&[session("cd-b", SessionStatus::Idle)]);
        assert_eq!(gone, vec![Transition::Gone { name: "cd-a".to_string() }]);
    }

    #[tokio::test]
    async fn test_stop_interrupts_running_detection() {
        let manager = Manager::new(Detector::new(HangingRunner, DetectorConfig::default()));
        // the first tick fires at once, so the stop lands during detection
        let stop = tokio::time::sleep(Duration::from_millis(50));

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            run_until(&manager, Duration::from_secs(60), stop),
        )
        .await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
