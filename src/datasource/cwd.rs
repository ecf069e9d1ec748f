use super::runner::{args, CommandRunner};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default lifetime of a cached working directory.
pub const DEFAULT_CWD_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct CwdEntry {
    path: String,
    expires_at: Instant,
}

/// Cache for process working-directory lookups with TTL.
///
/// Shared across poll ticks, so access is serialized with a mutex. The lock
/// is never held while the external lookup runs.
#[derive(Debug)]
pub struct CwdCache {
    entries: Mutex<HashMap<u32, CwdEntry>>,
    ttl: Duration,
}

impl Default for CwdCache {
    fn default() -> Self {
        Self::new(DEFAULT_CWD_TTL)
    }
}

impl CwdCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Working directory of `pid`, empty if it cannot be resolved.
    pub async fn resolve<R: CommandRunner>(&self, runner: &R, pid: u32) -> String {
        if let Some(path) = self.cached(pid, Instant::now()) {
            return path;
        }

        let path = lookup_cwd(runner, pid).await;
        self.store(pid, path.clone(), Instant::now());
        path
    }

    /// Drop expired entries so pids of exited processes do not accumulate.
    pub fn prune(&self) {
        let now = Instant::now();
        self.lock().retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached(&self, pid: u32, now: Instant) -> Option<String> {
        self.lock()
            .get(&pid)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.path.clone())
    }

    fn store(&self, pid: u32, path: String, now: Instant) {
        self.lock().insert(
            pid,
            CwdEntry {
                path,
                expires_at: now + self.ttl,
            },
        );
    }

    /// A panic while holding the lock leaves at worst a stale entry.
    fn lock(&self) -> MutexGuard<'_, HashMap<u32, CwdEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn lookup_cwd<R: CommandRunner>(runner: &R, pid: u32) -> String {
    let pid_arg = pid.to_string();
    match runner
        .run("lsof", &args(["-a", "-p", &pid_arg, "-d", "cwd", "-Fn"]))
        .await
    {
        Ok(output) => parse_lsof_cwd(&output.stdout).unwrap_or_default(),
        Err(e) => {
            tracing::debug!(pid, error = %e, "cwd lookup failed");
            String::new()
        }
    }
}

/// Extract the path from `lsof -Fn` output (the `n/...` line).
pub fn parse_lsof_cwd(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find(|line| line.starts_with("n/"))
        .map(|line| line[1..].to_string())
}
