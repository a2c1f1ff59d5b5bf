// src/divergence.rs

use crate::error::Result;
use crate::model::{DivergentBranch, Revision};
use crate::range::CommitRange;
use crate::repo::CommitGraph;
use chrono::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// Inclusive range of commit times, seconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// From the boundary commit up to `grace_days` after the head commit.
    pub fn for_range(range: &CommitRange, grace_days: i64) -> Self {
        Self {
            start: range.boundary_commit.timestamp,
            end: range.head_commit.timestamp + Duration::days(grace_days).num_seconds(),
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        (self.start..=self.end).contains(&timestamp)
    }
}

/// Chains of commits inside `window` that forked off the replay path and
/// never made it into head, in replay order of their branch points.
///
/// A chain that forks again stops at the fork; deeper divergence is not
/// followed.
pub fn find_divergent_branches<G: CommitGraph + ?Sized>(
    graph: &G,
    range: &CommitRange,
    window: Window,
) -> Result<Vec<DivergentBranch>> {
    // 1. Everything reachable inside the window, minus the replay path
    let mut in_window: HashSet<Revision> = HashSet::new();
    for revision in graph.reachable()? {
        if window.contains(graph.commit_time(revision)?) {
            in_window.insert(revision);
        }
    }
    let mut unmerged: Vec<Revision> = in_window
        .iter()
        .filter(|r| !range.contains(r))
        .copied()
        .collect();
    unmerged.sort();
    let unmerged_set: HashSet<Revision> = unmerged.iter().copied().collect();
    debug!(
        "{} commits in window, {} not on the replay path",
        in_window.len(),
        unmerged.len()
    );

    // 2. Forward edges, found by walking parents of unmerged commits. Replay
    // path commits are walked too so a chain can be seen rejoining it.
    let starts: Vec<Revision> = unmerged.iter().chain(&range.replay_path).copied().collect();
    let children = child_edges(graph, &starts, &unmerged_set, &in_window)?;

    // 3. Follow every chain that starts at a replay-path commit
    let mut claimed: HashSet<Revision> = HashSet::new();
    let mut branches = Vec::new();
    for point in &range.replay_path {
        let Some(forks) = children.get(point) else {
            continue;
        };
        for first in forks {
            if range.contains(first) || claimed.contains(first) {
                continue;
            }
            branches.push(follow_chain(*point, *first, &children, range, &mut claimed));
        }
    }

    info!("Found {} divergent branches", branches.len());
    Ok(branches)
}

fn child_edges<G: CommitGraph + ?Sized>(
    graph: &G,
    starts: &[Revision],
    unmerged_set: &HashSet<Revision>,
    in_window: &HashSet<Revision>,
) -> Result<HashMap<Revision, Vec<Revision>>> {
    let mut children: HashMap<Revision, Vec<Revision>> = HashMap::new();
    let mut visited: HashSet<Revision> = HashSet::new();
    let mut queue = VecDeque::new();

    for start in starts {
        queue.push_back(*start);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for parent in graph.parents(current)? {
                if !in_window.contains(&parent) {
                    continue;
                }
                children.entry(parent).or_default().push(current);
                if unmerged_set.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
    }

    for list in children.values_mut() {
        list.sort();
        list.dedup();
    }
    Ok(children)
}

fn follow_chain(
    branch_point: Revision,
    first: Revision,
    children: &HashMap<Revision, Vec<Revision>>,
    range: &CommitRange,
    claimed: &mut HashSet<Revision>,
) -> DivergentBranch {
    let mut path = Vec::new();
    let mut rejoined = false;
    let mut dead_end = false;
    let mut current = first;

    loop {
        claimed.insert(current);
        path.push(current);
        let next = children.get(&current).map(Vec::as_slice).unwrap_or_default();
        match next {
            [] => {
                dead_end = true;
                break;
            }
            [only] if range.contains(only) => {
                rejoined = true;
                break;
            }
            [only] if claimed.contains(only) => break,
            [only] => current = *only,
            _ => break,
        }
    }

    // Only a chain that runs out of children is named after its tip
    let label = if dead_end {
        path.iter()
            .rev()
            .find_map(|revision| range.marker(revision))
            .map(String::from)
    } else {
        None
    };
    DivergentBranch {
        label,
        branch_point,
        path,
        rejoined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{AuthorName, Commit};
    use git2::Oid;

    /// (parents, commit time) per revision
    #[derive(Default)]
    struct MemoryGraph {
        nodes: HashMap<Revision, (Vec<Revision>, i64)>,
    }

    impl MemoryGraph {
        fn add(&mut self, n: u8, parents: &[u8], time: i64) {
            self.nodes
                .insert(rev(n), (parents.iter().map(|p| rev(*p)).collect(), time));
        }
    }

    impl CommitGraph for MemoryGraph {
        fn reachable(&self) -> Result<Vec<Revision>> {
            Ok(self.nodes.keys().copied().collect())
        }

        fn parents(&self, revision: Revision) -> Result<Vec<Revision>> {
            self.nodes
                .get(&revision)
                .map(|(parents, _)| parents.clone())
                .ok_or_else(|| Error::UnknownRevision(revision.to_string()))
        }

        fn commit_time(&self, revision: Revision) -> Result<i64> {
            self.nodes
                .get(&revision)
                .map(|(_, time)| *time)
                .ok_or_else(|| Error::UnknownRevision(revision.to_string()))
        }
    }

    fn rev(n: u8) -> Revision {
        Oid::from_bytes(&[n; 20]).unwrap()
    }

    fn commit(n: u8, time: i64) -> Commit {
        Commit {
            id: rev(n),
            parents: Vec::new(),
            author: AuthorName::from("someone"),
            timestamp: time,
            summary: String::new(),
        }
    }

    fn range(path: &[u8], times: (i64, i64), markers: &[(u8, &str)]) -> CommitRange {
        let (first, last) = (path[0], path[path.len() - 1]);
        CommitRange::from_parts(
            commit(last, times.1),
            commit(first, times.0),
            markers.iter().map(|(n, m)| (rev(*n), m.to_string())).collect(),
            path.iter().map(|n| rev(*n)).collect(),
        )
    }

    #[test]
    fn test_unmerged_side_branch() {
        let mut graph = MemoryGraph::default();
        graph.add(1, &[], 10);
        graph.add(2, &[1], 20);
        graph.add(3, &[2], 30);
        graph.add(4, &[2], 25);
        graph.add(5, &[4], 26);
        let range = range(&[1, 2, 3], (10, 30), &[(3, "master"), (5, "feature")]);

        let branches = find_divergent_branches(&graph, &range, Window::new(10, 30)).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].branch_point, rev(2));
        assert_eq!(branches[0].path, vec![rev(4), rev(5)]);
        assert_eq!(branches[0].label.as_deref(), Some("feature"));
        assert!(!branches[0].rejoined);
    }

    #[test]
    fn test_window_cuts_old_branches() {
        let mut graph = MemoryGraph::default();
        graph.add(1, &[], 10);
        graph.add(2, &[1], 20);
        graph.add(3, &[2], 30);
        graph.add(4, &[2], 100);
        let range = range(&[1, 2, 3], (10, 30), &[]);

        let branches = find_divergent_branches(&graph, &range, Window::new(10, 30)).unwrap();
        assert!(branches.is_empty());
    }

    #[test]
    fn test_chain_stops_at_fork() {
        let mut graph = MemoryGraph::default();
        graph.add(1, &[], 10);
        graph.add(2, &[1], 20);
        graph.add(4, &[1], 21);
        graph.add(5, &[4], 22);
        graph.add(6, &[4], 23);
        let range = range(&[1, 2], (10, 20), &[(6, "other")]);

        let branches = find_divergent_branches(&graph, &range, Window::new(10, 30)).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].path, vec![rev(4)]);
        assert_eq!(branches[0].label, None);
    }

    #[test]
    fn test_unfinished_chains_are_unlabelled() {
        let mut graph = MemoryGraph::default();
        graph.add(1, &[], 10);
        graph.add(2, &[1], 20);
        graph.add(4, &[2], 21);
        graph.add(3, &[2, 4], 30);
        graph.add(5, &[1], 22);
        graph.add(6, &[5], 23);
        graph.add(7, &[5], 24);
        let range = range(&[1, 2, 3], (10, 30), &[(4, "topic"), (5, "spike")]);

        let branches = find_divergent_branches(&graph, &range, Window::new(10, 30)).unwrap();
        assert_eq!(branches.len(), 2);

        let spike = &branches[0];
        assert_eq!(spike.branch_point, rev(1));
        assert_eq!(spike.path, vec![rev(5)]);
        assert_eq!(spike.label, None);
        assert!(!spike.rejoined);

        let topic = &branches[1];
        assert_eq!(topic.branch_point, rev(2));
        assert_eq!(topic.path, vec![rev(4)]);
        assert_eq!(topic.label, None);
        assert!(topic.rejoined);
    }

    #[test]
    fn test_window_for_range_adds_grace() {
        let range = range(&[1, 2], (100, 200), &[]);
        let window = Window::for_range(&range, 1);
        assert_eq!(window, Window::new(100, 200 + 86_400));
        assert!(window.contains(100));
        assert!(!window.contains(99));
    }
}
