use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::{
    clock::Clock, graph::ConcurrencyControl, is_replicated, router, site::SiteManager,
    version::VersionStore, SiteId, Timestamp, VarId, Value, N_SITES, N_VARS,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

impl TransactionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Aborted => "aborted",
        }
    }
}

/// A buffered local write: the value and the set of sites that were
/// available to receive it at the moment `write()` was called.
#[derive(Clone, Debug)]
struct BufferedWrite {
    value: Value,
    targets: Vec<SiteId>,
}

#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: String,
    pub status: TransactionStatus,
    pub begin_ts: Timestamp,
    pub commit_ts: Option<Timestamp>,
    read_set: BTreeMap<VarId, (SiteId, Timestamp)>,
    write_set: BTreeMap<VarId, BufferedWrite>,
    touched_sites: BTreeSet<SiteId>,
}

impl Transaction {
    fn new(id: String, begin_ts: Timestamp) -> Self {
        Transaction {
            id,
            status: TransactionStatus::Active,
            begin_ts,
            commit_ts: None,
            read_set: BTreeMap::new(),
            write_set: BTreeMap::new(),
            touched_sites: BTreeSet::new(),
        }
    }
}

/// Owns every piece of mutable state: the version store, the site table,
/// the concurrency graph, and the transaction table, all driven by one
/// clock. This is the only type the driver calls into; every directive
/// in spec.md's grammar maps to exactly one method here, and every method
/// returns the lines it wants printed rather than writing to stdout
/// itself, so the same engine runs identically under a file, stdin, or a
/// test harness asserting on its output.
pub struct Simulator {
    clock: Clock,
    store: VersionStore,
    sites: SiteManager,
    cc: ConcurrencyControl,
    txns: BTreeMap<String, Transaction>,
}

impl Simulator {
    pub fn new() -> Self {
        let mut sim = Simulator {
            clock: Clock::new(),
            store: VersionStore::new(),
            sites: SiteManager::new(),
            cc: ConcurrencyControl::new(),
            txns: BTreeMap::new(),
        };
        sim.seed_store();
        sim
    }

    fn seed_store(&mut self) {
        for s in 1..=N_SITES {
            let vars = (1..=N_VARS)
                .filter(|&i| is_replicated(i) || crate::home_site(i) == s)
                .map(|i| (i, crate::initial_value(i)));
            self.store.init_site(s, vars);
        }
    }

    /// Discard every transaction, version, and graph edge and start over,
    /// as a fresh simulator would -- except the clock is not rewound,
    /// since `reset` is itself an event in an ongoing transcript and
    /// rewinding `now` could let a later directive produce a timestamp
    /// earlier than one already emitted.
    pub fn reset(&mut self) {
        let now = self.clock.now();
        *self = Simulator::new();
        for _ in 0..now {
            self.clock.advance();
        }
    }

    pub fn begin(&mut self, t: &str) -> Vec<String> {
        if self.txns.contains_key(t) {
            return vec![format!("{t} already exists")];
        }
        let begin_ts = self.clock.now();
        self.txns.insert(t.to_string(), Transaction::new(t.to_string(), begin_ts));
        self.cc.register_transaction(t);
        self.clock.advance();
        info!(target: "kvsim", t, begin_ts, "begin");
        Vec::new()
    }

    pub fn read(&mut self, t: &str, i: VarId) -> Vec<String> {
        let Some(txn) = self.txns.get(t) else {
            return vec![format!("Unknown transaction {t}")];
        };
        if txn.status != TransactionStatus::Active {
            return vec![format!("{t} is not active")];
        }
        if let Some(w) = txn.write_set.get(&i) {
            let value = w.value;
            return vec![format!("{t}: R(x{i}) -> {value} (from write set)")];
        }

        let begin_ts = txn.begin_ts;
        match router::select_read_site(&self.store, &self.sites, i, begin_ts) {
            None => vec![format!("{t}: R(x{i}) -> cannot read (no eligible site)")],
            Some((s, version_ts)) => {
                let version = self
                    .store
                    .get_version(s, i, begin_ts)
                    .expect("read site just selected must still have this version");
                debug_assert_eq!(version.ts, version_ts);
                let txn = self.txns.get_mut(t).expect("checked above");
                txn.read_set.insert(i, (s, version_ts));
                txn.touched_sites.insert(s);
                self.cc.record_read(t, i, version_ts);
                vec![format!("{t}: R(x{i}) -> {}", version.value)]
            }
        }
    }

    pub fn write(&mut self, t: &str, i: VarId, value: Value) -> Vec<String> {
        let Some(txn) = self.txns.get(t) else {
            return vec![format!("Unknown transaction {t}")];
        };
        if txn.status != TransactionStatus::Active {
            return vec![format!("{t} is not active")];
        }
        let targets = router::select_write_sites(&self.sites, i);
        let txn = self.txns.get_mut(t).expect("checked above");
        for &s in &targets {
            txn.touched_sites.insert(s);
        }
        txn.write_set.insert(i, BufferedWrite { value, targets });
        Vec::new()
    }

    pub fn end(&mut self, t: &str) -> Vec<String> {
        let Some(txn) = self.txns.get(t) else {
            return vec![format!("Unknown transaction {t}")];
        };
        if txn.status != TransactionStatus::Active {
            return vec![format!("{t} already {}", txn.status.as_str())];
        }

        if let Some(reason) = self.validate_for_commit(t) {
            return self.abort(t, &reason);
        }

        // Commit: install every buffered write at its targets still
        // available now, re-enabling replicated reads as we go.
        let commit_ts = self.clock.now();
        let txn = self.txns.get_mut(t).expect("checked above");
        txn.status = TransactionStatus::Committed;
        txn.commit_ts = Some(commit_ts);
        let writes: Vec<(VarId, Value, Vec<SiteId>)> = txn
            .write_set
            .iter()
            .map(|(&i, w)| (i, w.value, w.targets.clone()))
            .collect();

        for (i, value, targets) in &writes {
            for &s in targets {
                if self.sites.is_available(s) {
                    self.store
                        .add_version(s, *i, commit_ts, *value)
                        .expect("commit_ts is fresh and strictly greater than any prior version");
                    if is_replicated(*i) {
                        self.sites.enable_replicated_read(s, *i);
                    }
                }
            }
        }
        self.cc.commit(t, commit_ts, writes.iter().map(|(i, _, _)| *i));
        self.clock.advance();
        info!(target: "kvsim", t, commit_ts, "commit");
        vec![format!("{t} commits")]
    }

    /// Steps 2-5 of the commit protocol (spec.md §4.4). Returns the abort
    /// reason if any check fails, or `None` if `t` may proceed to commit.
    fn validate_for_commit(&mut self, t: &str) -> Option<String> {
        let txn = self.txns.get(t).expect("checked by caller");

        for &s in &txn.touched_sites {
            if !self.sites.is_available(s) {
                return Some("site failure after access".to_string());
            }
        }

        for w in txn.write_set.values() {
            if !w.targets.iter().any(|&s| self.sites.is_available(s)) {
                return Some("no available site for write".to_string());
            }
        }

        let write_vars: Vec<VarId> = txn.write_set.keys().copied().collect();
        if let Err(reason) = self.cc.check_fcw(t, write_vars.iter().copied(), txn.begin_ts) {
            return Some(reason);
        }
        if let Err(reason) = self.cc.check_serializable(t, write_vars) {
            return Some(reason);
        }
        None
    }

    fn abort(&mut self, t: &str, reason: &str) -> Vec<String> {
        if let Some(txn) = self.txns.get_mut(t) {
            txn.status = TransactionStatus::Aborted;
        }
        self.cc.abort(t);
        info!(target: "kvsim", t, reason, "abort");
        vec![format!("{t} aborts ({reason})")]
    }

    /// Invoked immediately after the site manager transitions `s` to
    /// Failed: every Active transaction that has touched `s` aborts right
    /// away, before the fail directive's own clock tick is taken.
    fn handle_site_failure(&mut self, s: SiteId) -> Vec<String> {
        let affected: Vec<String> = self
            .txns
            .values()
            .filter(|txn| txn.status == TransactionStatus::Active && txn.touched_sites.contains(&s))
            .map(|txn| txn.id.clone())
            .collect();
        let mut lines = Vec::new();
        for t in affected {
            lines.extend(self.abort(&t, &format!("site {s} failed")));
        }
        lines
    }

    pub fn fail(&mut self, s: SiteId) -> Vec<String> {
        let now = self.clock.now();
        self.sites.fail(s, now);
        let lines = self.handle_site_failure(s);
        self.clock.advance();
        lines
    }

    pub fn recover(&mut self, s: SiteId) -> Vec<String> {
        let now = self.clock.now();
        self.sites.recover(s, now);
        self.clock.advance();
        Vec::new()
    }

    /// The value a fresh read of `i` would currently see: the version
    /// with the highest timestamp across every site that physically
    /// holds it, regardless of that site's current availability. A site
    /// that was down at commit time simply never received that version;
    /// some site that was up did, since otherwise the write would have
    /// aborted for lack of an available target.
    fn current_value(&self, i: VarId) -> Value {
        SiteManager::sites_for_variable(i)
            .into_iter()
            .filter_map(|s| self.store.get_latest(s, i))
            .max_by_key(|v| v.ts)
            .map(|v| v.value)
            .unwrap_or_else(|| crate::initial_value(i))
    }

    pub fn dump(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for i in 1..=N_VARS {
            let value = self.current_value(i);
            if value != crate::initial_value(i) {
                if is_replicated(i) {
                    lines.push(format!("x{i}: {value} at all sites"));
                } else {
                    lines.push(format!("x{i}: {value} at site {}", crate::home_site(i)));
                }
            }
        }
        if lines.is_empty() {
            lines.push("All variables have their initial values.".to_string());
        } else {
            lines.push("All other variables have their initial values.".to_string());
        }
        lines
    }

    pub fn dump_variable(&self, i: VarId) -> Vec<String> {
        if is_replicated(i) {
            let parts: Vec<String> = SiteManager::sites_for_variable(i)
                .into_iter()
                .map(|s| {
                    let value = self.store.get_latest(s, i).map(|v| v.value).unwrap_or_else(|| crate::initial_value(i));
                    format!("{value} at site {s}")
                })
                .collect();
            vec![format!("x{i}: {}", parts.join(", "))]
        } else {
            let s = crate::home_site(i);
            let value = self.store.get_latest(s, i).map(|v| v.value).unwrap_or_else(|| crate::initial_value(i));
            vec![format!("x{i}: {value} at site {s}")]
        }
    }

    pub fn dump_site(&self, s: SiteId) -> Vec<String> {
        self.store
            .all_variables(s)
            .into_iter()
            .map(|i| {
                let value = self.store.get_latest(s, i).map(|v| v.value).unwrap_or_else(|| crate::initial_value(i));
                format!("x{i}: {value}")
            })
            .collect()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
