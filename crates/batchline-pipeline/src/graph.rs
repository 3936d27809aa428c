//! Dependency bookkeeping: forward unresolved-deps map plus the reverse
//! dependents index. Mutated only while the pipeline state lock is held.

use crate::task::TaskId;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    /// task -> dependencies that have not yet COMPLETED.
    forward: HashMap<TaskId, HashSet<TaskId>>,
    /// dependency -> tasks waiting on it.
    reverse: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Walks the unresolved-dependency closure of `deps` and reports
    /// whether it reaches `id`. Completed dependencies are not in the
    /// forward map and cannot close a cycle.
    pub(crate) fn would_cycle(&self, id: &str, deps: &HashSet<TaskId>) -> bool {
        if deps.contains(id) {
            return true;
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> = deps.iter().map(String::as_str).collect();
        while let Some(current) = frontier.pop_front() {
            if current == id {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(next) = self.forward.get(current) {
                frontier.extend(next.iter().map(String::as_str));
            }
        }
        false
    }

    /// Records a task with its unresolved dependencies and the matching
    /// reverse edges.
    pub(crate) fn insert(&mut self, id: &str, unresolved: HashSet<TaskId>) {
        for dep in &unresolved {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .push(id.to_string());
        }
        self.forward.insert(id.to_string(), unresolved);
    }

    /// Removes the completed edge from every dependent and returns the
    /// dependents whose unresolved set just became empty.
    pub(crate) fn resolve(&mut self, completed: &str) -> Vec<TaskId> {
        let mut ready = Vec::new();
        for dependent in self.reverse.remove(completed).unwrap_or_default() {
            if let Some(unresolved) = self.forward.get_mut(&dependent) {
                unresolved.remove(completed);
                if unresolved.is_empty() {
                    self.forward.remove(&dependent);
                    ready.push(dependent);
                }
            }
        }
        ready
    }

    /// Transitively collects every task that can no longer run because
    /// `failed` reached FAILED or CANCELLED. Returns `(task, failed_dep)`
    /// pairs in BFS order; the pairs are removed from the graph.
    pub(crate) fn fail_closure(&mut self, failed: &str) -> Vec<(TaskId, TaskId)> {
        let mut doomed = Vec::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(failed.to_string());
        while let Some(cause) = frontier.pop_front() {
            for dependent in self.reverse.remove(&cause).unwrap_or_default() {
                if self.forward.remove(&dependent).is_some() {
                    doomed.push((dependent.clone(), cause.clone()));
                    frontier.push_back(dependent);
                }
            }
        }
        doomed
    }

    /// Drops a pending task and its reverse edges (used by cancel).
    pub(crate) fn remove(&mut self, id: &str) {
        if let Some(unresolved) = self.forward.remove(id) {
            for dep in unresolved {
                if let Some(dependents) = self.reverse.get_mut(&dep) {
                    dependents.retain(|d| d != id);
                    if dependents.is_empty() {
                        self.reverse.remove(&dep);
                    }
                }
            }
        }
    }

    /// Number of pending tasks with at least one dependency the pipeline
    /// has never seen, i.e. graphs that can only unstick if the missing
    /// parent is eventually submitted.
    pub(crate) fn orphans(&self, known: impl Fn(&str) -> bool) -> usize {
        self.forward
            .values()
            .filter(|deps| deps.iter().any(|d| !known(d)))
            .count()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.forward.len()
    }
}
