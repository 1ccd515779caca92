use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::{Timestamp, VarId};

pub type TxnId = String;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
enum EdgeKind {
    Wr,
    Ww,
    Rw,
}

/// Maintains last-writer-per-variable, per-transaction read/write history,
/// and the serialization graph (WR/WW/RW edges). First-committer-wins and
/// cycle detection are both scoped to this state -- they never need to
/// look outside it, since every committed fact they depend on was
/// recorded here at the moment it became true.
#[derive(Clone, Debug, Default)]
pub struct ConcurrencyControl {
    nodes: BTreeSet<TxnId>,
    last_writer: BTreeMap<VarId, (TxnId, Timestamp)>,
    write_history: BTreeMap<TxnId, BTreeMap<VarId, Timestamp>>,
    read_history: BTreeMap<TxnId, BTreeSet<VarId>>,
    graph: BTreeMap<TxnId, BTreeSet<(TxnId, EdgeKind)>>,
}

impl ConcurrencyControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transaction(&mut self, t: &str) {
        self.nodes.insert(t.to_string());
        self.graph.entry(t.to_string()).or_default();
    }

    /// Record that `t` read variable `i` at the version committed at
    /// `version_ts`. If some other transaction is on record as having
    /// committed exactly that version, add the WR edge writer -> t.
    pub fn record_read(&mut self, t: &str, i: VarId, version_ts: Timestamp) {
        self.read_history.entry(t.to_string()).or_default().insert(i);
        let writer = self
            .write_history
            .iter()
            .find(|(w, vars)| w.as_str() != t && vars.get(&i) == Some(&version_ts))
            .map(|(w, _)| w.clone());
        if let Some(w) = writer {
            self.add_edge(&w, t, EdgeKind::Wr);
        }
    }

    /// Among committed writers only (last_writer is only ever updated at
    /// commit time): if some other transaction committed a write to a
    /// variable `t` intends to write, after `t` began, `t` must abort.
    pub fn check_fcw(&self, t: &str, writes: impl IntoIterator<Item = VarId>, begin_ts: Timestamp) -> Result<(), String> {
        let mut writes: Vec<VarId> = writes.into_iter().collect();
        writes.sort_unstable();
        for i in writes {
            if let Some((writer, commit_ts)) = self.last_writer.get(&i) {
                if writer.as_str() != t && *commit_ts > begin_ts {
                    return Err(format!(
                        "First-committer-wins conflict on x{i} with {writer}"
                    ));
                }
            }
        }
        Ok(())
    }

    /// For each variable `t` writes: add a WW edge from the last committed
    /// writer, and an RW edge from every transaction that has read it.
    /// Then check whether any cycle is now reachable from `t` -- if so,
    /// `t` may not commit.
    pub fn check_serializable(&mut self, t: &str, writes: impl IntoIterator<Item = VarId>) -> Result<(), String> {
        let mut writes: Vec<VarId> = writes.into_iter().collect();
        writes.sort_unstable();
        for i in writes {
            if let Some((writer, _)) = self.last_writer.get(&i).cloned() {
                if writer.as_str() != t {
                    self.add_edge(&writer, t, EdgeKind::Ww);
                }
            }
            let readers: Vec<TxnId> = self
                .read_history
                .iter()
                .filter(|(u, vars)| u.as_str() != t && vars.contains(&i))
                .map(|(u, _)| u.clone())
                .collect();
            for u in readers {
                self.add_edge(&u, t, EdgeKind::Rw);
            }
        }
        if self.has_cycle_from(t) {
            Err("Serialization cycle detected".to_string())
        } else {
            Ok(())
        }
    }

    pub fn commit(&mut self, t: &str, commit_ts: Timestamp, writes: impl IntoIterator<Item = VarId>) {
        let entry = self.write_history.entry(t.to_string()).or_default();
        for i in writes {
            self.last_writer.insert(i, (t.to_string(), commit_ts));
            entry.insert(i, commit_ts);
        }
    }

    /// Purge `t`'s node, all inbound edges to it, and its read/write
    /// history. Aborted transactions must never poison a later cycle
    /// check -- they were never serialized.
    pub fn abort(&mut self, t: &str) {
        self.nodes.remove(t);
        self.graph.remove(t);
        for edges in self.graph.values_mut() {
            edges.retain(|(to, _)| to != t);
        }
        self.read_history.remove(t);
        self.write_history.remove(t);
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let inserted = self
            .graph
            .entry(from.to_string())
            .or_default()
            .insert((to.to_string(), kind));
        if inserted {
            trace!(target: "kvsim", from, to, ?kind, "serialization edge");
        }
    }

    /// DFS from `t`, since `t` is the only node whose edges just changed:
    /// any new cycle must pass through it.
    fn has_cycle_from(&self, t: &str) -> bool {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: BTreeSet<&str> = BTreeSet::new();
        self.dfs(t, &mut visited, &mut stack)
    }

    fn dfs<'a>(&'a self, node: &'a str, visited: &mut BTreeSet<&'a str>, stack: &mut BTreeSet<&'a str>) -> bool {
        if stack.contains(node) {
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visited.insert(node);
        stack.insert(node);
        if let Some(edges) = self.graph.get(node) {
            for (next, _) in edges {
                if self.dfs(next.as_str(), visited, stack) {
                    return true;
                }
            }
        }
        stack.remove(node);
        false
    }
}
