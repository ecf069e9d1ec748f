use super::runner::{args, CommandError, CommandRunner};
use std::collections::{HashMap, HashSet, VecDeque};

/// One row of the process table
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    /// Controlling terminal without `/dev/`, `None` for daemons
    pub tty: Option<String>,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub command_line: String,
}

impl ProcessRecord {
    /// Base name of the executable (first word of the command line).
    pub fn executable_name(&self) -> &str {
        let first = self.command_line.split_whitespace().next().unwrap_or("");
        first.rsplit('/').next().unwrap_or(first)
    }
}

/// Immutable capture of the process table, valid for a single poll tick.
#[derive(Debug, Default)]
pub struct ProcessSnapshot {
    processes: HashMap<u32, ProcessRecord>,
}

impl ProcessSnapshot {
    pub fn from_records(records: Vec<ProcessRecord>) -> Self {
        Self {
            processes: records.into_iter().map(|p| (p.pid, p)).collect(),
        }
    }

    /// Capture the table with one `ps` call.
    pub async fn capture<R: CommandRunner>(runner: &R) -> Result<Self, CommandError> {
        // Common format for macOS/Linux
        let output = runner
            .run("ps", &args(["-eo", "pid,ppid,tty,%cpu,%mem,args"]))
            .await?;
        Ok(Self::from_records(parse_ps_output(&output.stdout)))
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.processes.values()
    }

    /// Build the parent -> children index. Children are ordered by pid.
    pub fn child_index(&self) -> ChildIndex<'_> {
        let mut children: HashMap<u32, Vec<&ProcessRecord>> = HashMap::new();
        for proc in self.processes.values() {
            children.entry(proc.ppid).or_default().push(proc);
        }
        for list in children.values_mut() {
            list.sort_by_key(|p| p.pid);
        }
        ChildIndex { children }
    }
}

/// Parent pid -> child records, borrowed from a [`ProcessSnapshot`].
#[derive(Debug, Default)]
pub struct ChildIndex<'a> {
    children: HashMap<u32, Vec<&'a ProcessRecord>>,
}

/// Summed resource usage of a process subtree
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

impl<'a> ChildIndex<'a> {
    pub fn children_of(&self, pid: u32) -> &[&'a ProcessRecord] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if any descendant of `root` has `signature` in its command line (BFS).
    ///
    /// The root itself is not tested. Matching is case-insensitive.
    pub fn has_descendant_matching(&self, root: u32, signature: &str) -> bool {
        let signature = signature.to_lowercase();
        let mut found = false;
        self.walk(root, |proc| {
            if proc.command_line.to_lowercase().contains(&signature) {
                found = true;
            }
            !found
        });
        found
    }

    /// Every pid below `root`, in BFS order.
    pub fn descendants(&self, root: u32) -> Vec<u32> {
        let mut pids = Vec::new();
        self.walk(root, |proc| {
            pids.push(proc.pid);
            true
        });
        pids
    }

    /// cpu% and mem% of `root` plus all of its descendants.
    pub fn subtree_usage(&self, snapshot: &ProcessSnapshot, root: u32) -> ResourceUsage {
        let mut usage = ResourceUsage::default();
        if let Some(proc) = snapshot.get(root) {
            usage.cpu_percent += proc.cpu_percent;
            usage.mem_percent += proc.mem_percent;
        }
        self.walk(root, |proc| {
            usage.cpu_percent += proc.cpu_percent;
            usage.mem_percent += proc.mem_percent;
            true
        });
        usage
    }

    /// Visit descendants of `root` breadth-first until `visit` returns false.
    ///
    /// A visited set keeps corrupted parent links (cycles) from looping forever.
    fn walk<F>(&self, root: u32, mut visit: F)
    where
        F: FnMut(&'a ProcessRecord) -> bool,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(root);

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            for &child in self.children_of(current) {
                if child.pid == root || visited.contains(&child.pid) {
                    continue;
                }
                if !visit(child) {
                    return;
                }
                queue.push_back(child.pid);
            }
        }
    }
}

/// Normalize TTY (pts/0, ttys001, etc.)
pub fn normalize_tty(tty: &str) -> Option<String> {
    let tty = tty.trim();

    // "?" (Linux), "??" (macOS) and "-" mean no TTY
    if tty.is_empty() || tty == "?" || tty == "??" || tty == "-" {
        return None;
    }

    let tty = tty.strip_prefix("/dev/").unwrap_or(tty);

    Some(tty.to_string())
}

/// Parse `ps -eo pid,ppid,tty,%cpu,%mem,args` output.
///
/// The first line is the header. Rows with too few columns or a
/// non-numeric pid/ppid are skipped.
pub fn parse_ps_output(stdout: &str) -> Vec<ProcessRecord> {
    let mut processes = Vec::new();

    for line in stdout.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let (Some(pid), Some(ppid), Some(tty), Some(cpu), Some(mem)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };

        let command_line = fields.collect::<Vec<_>>().join(" ");
        if command_line.is_empty() {
            continue;
        }

        let (Ok(pid), Ok(ppid)) = (pid.parse::<u32>(), ppid.parse::<u32>()) else {
            continue;
        };

        processes.push(ProcessRecord {
            pid,
            ppid,
            tty: normalize_tty(tty),
            cpu_percent: cpu.parse().unwrap_or(0.0),
            mem_percent: mem.parse().unwrap_or(0.0),
            command_line,
        });
    }

    processes
}
