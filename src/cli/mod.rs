pub mod table;
pub mod watch;

use crate::config::Config;
use crate::datasource::{CommandRunner, SystemCommandRunner};
use crate::detector::Detector;
use crate::manager::{find_by_name, Manager};
use crate::models::Session;
use anyhow::{bail, Context, Result};

/// Manager wired to the real `tmux`, `ps` and `lsof` binaries.
pub fn system_manager(config: &Config) -> Manager<SystemCommandRunner> {
    let runner = SystemCommandRunner::new().with_timeout(config.command_timeout());
    Manager::new(Detector::new(runner, config.detector_config()))
        .with_log_lines(config.log_history)
}

pub async fn list<R: CommandRunner>(manager: &Manager<R>, json: bool) -> Result<()> {
    let sessions = manager.list().await?;
    if json {
        println!("{}", to_json(&sessions)?);
    } else {
        print!("{}", table::render(&sessions, chrono::Utc::now()));
    }
    Ok(())
}

pub fn to_json(sessions: &[Session]) -> Result<String> {
    serde_json::to_string_pretty(sessions).context("Failed to serialize sessions")
}

pub async fn create<R: CommandRunner>(
    manager: &Manager<R>,
    name: &str,
    dir: Option<&str>,
    extra_args: &str,
) -> Result<()> {
    let session = manager.create(name, dir, extra_args).await?;
    println!("✓ Created session {}", session);
    Ok(())
}

pub async fn kill<R: CommandRunner>(manager: &Manager<R>, name: &str) -> Result<()> {
    let Some(session) = lookup(manager, name).await? else {
        bail!("session not found: {}", name);
    };
    manager.kill(&session).await?;
    println!("✓ Killed session {}", name);
    Ok(())
}

pub async fn attach<R: CommandRunner>(manager: &Manager<R>, name: &str) -> Result<()> {
    let Some(session) = lookup(manager, name).await? else {
        bail!("session not found: {}", name);
    };
    let argv = manager.attach_command(&session)?;
    let Some((program, args)) = argv.split_first() else {
        bail!("empty attach command");
    };

    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("Failed to execute {}", program))?;
    if !status.success() {
        bail!("{} exited with {}", program, status);
    }
    Ok(())
}

pub async fn logs<R: CommandRunner>(manager: &Manager<R>, name: &str, lines: usize) -> Result<()> {
    let content = manager.logs(name, lines).await?;
    print!("{}", content);
    Ok(())
}

pub async fn send<R: CommandRunner>(manager: &Manager<R>, name: &str, text: &str) -> Result<()> {
    manager.send_command(name, text).await?;
    Ok(())
}

async fn lookup<R: CommandRunner>(manager: &Manager<R>, name: &str) -> Result<Option<Session>> {
    let sessions = manager.list().await?;
    Ok(find_by_name(&sessions, name).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::runner::fake::FakeRunner;
    use crate::datasource::tmux::SESSION_FORMAT;
    use crate::detector::DetectorConfig;
    use crate::models::SessionStatus;

    const PS: &str = "ps -eo pid,ppid,tty,%cpu,%mem,args";

    fn manager(runner: FakeRunner) -> Manager<FakeRunner> {
        Manager::new(Detector::new(runner, DetectorConfig::default()))
    }

    fn list_sessions() -> String {
        format!("tmux list-sessions -F {}", SESSION_FORMAT)
    }

    #[test]
    fn test_to_json_shape() {
        let session = Session {
            name: "cd-api".to_string(),
            project: "api".to_string(),
            status: SessionStatus::Waiting,
            started_at: None,
            last_activity_at: None,
            attached: true,
            process_id: Some(10),
            cpu_percent: 1.5,
            mem_percent: 0.5,
            working_directory: "/src/api".to_string(),
            managed: true,
        };
        let json = to_json(&[session]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["status"], "waiting");
        assert_eq!(value[0]["process_id"], 10);
        assert_eq!(value[0]["managed"], true);
    }

    #[tokio::test]
    async fn test_kill_terminal_session_is_refused() {
        let runner = FakeRunner::new()
            .fail(
                &list_sessions(),
                "no server running on /tmp/tmux-1000/default",
            )
            .ok(PS, "PID PPID TT %CPU %MEM ARGS\n300 1 pts/4 0.0 0.1 claude\n");
        let m = manager(runner);

        let err = kill(&m, "terminal/pts/4").await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(m.detector().tmux().runner().call_count("tmux kill-session"), 0);
    }

    #[tokio::test]
    async fn test_attach_unknown_session() {
        let runner = FakeRunner::new().ok(PS, "PID PPID TT %CPU %MEM ARGS\n");
        let m = manager(runner.fail(
            &list_sessions(),
            "no server running",
        ));
        let err = attach(&m, "cd-missing").await.unwrap_err();
        assert!(err.to_string().contains("session not found"));
    }
}
