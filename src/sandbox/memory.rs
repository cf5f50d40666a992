//! Memory accounting for a process and its descendants
//!
//! Rlimits alone either kill too early or let the VM size grow far past the
//! intended cap, so the supervisor keeps a loose rlimit as a safety net and
//! enforces the real cap by sampling `/proc` for the whole descendant tree.

use std::collections::{HashMap, VecDeque};

/// One sample of the descendant tree rooted at a pid
#[derive(Debug, Default, Clone)]
pub struct MemorySample {
    /// Summed resident set size, bytes
    pub rss_bytes: u64,
    /// Summed virtual memory size, bytes
    pub vms_bytes: u64,
    /// Every pid that contributed to the sums (root included)
    pub pids: Vec<i32>,
}

/// Walk `/proc` and sum memory over `root_pid` and all its descendants.
///
/// Processes that exit between enumeration and the stat read simply drop out
/// of the sums. Returns an empty sample when the root is already gone.
pub fn sample_tree(root_pid: i32) -> MemorySample {
    let Ok(processes) = procfs::process::all_processes() else {
        return MemorySample::default();
    };

    let page_size = procfs::page_size();
    let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
    let mut usage: HashMap<i32, (u64, u64)> = HashMap::new();
    for process in processes.filter_map(Result::ok) {
        if let Ok(stat) = process.stat() {
            children.entry(stat.ppid).or_default().push(stat.pid);
            usage.insert(stat.pid, (stat.rss as u64 * page_size, stat.vsize));
        }
    }

    let mut sample = MemorySample::default();
    let mut queue = VecDeque::from([root_pid]);
    while let Some(pid) = queue.pop_front() {
        let Some(&(rss, vms)) = usage.get(&pid) else {
            continue;
        };
        sample.rss_bytes += rss;
        sample.vms_bytes += vms;
        sample.pids.push(pid);
        if let Some(kids) = children.get(&pid) {
            queue.extend(kids);
        }
    }
    sample
}
