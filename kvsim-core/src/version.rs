use std::collections::BTreeMap;

use kvsim_base::{err, Result};

use crate::{SiteId, Timestamp, VarId, Value};

/// A single ⟨timestamp, value⟩ pair. Versions for a given (site, variable)
/// form a strictly increasing sequence in timestamp.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Version {
    pub ts: Timestamp,
    pub value: Value,
}

/// `store[site][variable] = [versions...]`. Per-site, per-variable
/// append-only version lists. The list for any one (site, variable) pair
/// only grows by one entry per committed write to it, so linear scans
/// over it are cheap in practice; we keep it sorted by construction
/// (`add_version` only ever appends with a strictly greater timestamp) so
/// a binary search would also work if this ever got hot.
#[derive(Clone, Debug, Default)]
pub struct VersionStore {
    sites: BTreeMap<SiteId, BTreeMap<VarId, Vec<Version>>>,
}

impl VersionStore {
    pub fn new() -> Self {
        VersionStore::default()
    }

    /// Allocate site `s` and seed each variable in `vars` with its
    /// timestamp-0 initial version.
    pub fn init_site(&mut self, s: SiteId, vars: impl IntoIterator<Item = (VarId, Value)>) {
        let entry = self.sites.entry(s).or_default();
        for (i, initial) in vars {
            entry.insert(i, vec![Version { ts: 0, value: initial }]);
        }
    }

    /// Append a new version. Precondition: site `s` and variable `i` both
    /// already exist (from `init_site`). Appending a timestamp that does
    /// not strictly increase over the existing latest is a programmer
    /// error -- the caller (the transaction manager) must never ask this
    /// to happen, since it would mean two commits claimed the same clock
    /// tick for the same cell.
    pub fn add_version(&mut self, s: SiteId, i: VarId, ts: Timestamp, value: Value) -> Result<()> {
        let versions = self
            .sites
            .get_mut(&s)
            .ok_or_else(|| err(format!("add_version: unknown site {s}")))?
            .get_mut(&i)
            .ok_or_else(|| err(format!("add_version: site {s} does not hold x{i}")))?;
        if let Some(last) = versions.last() {
            if ts <= last.ts {
                return Err(err(format!(
                    "add_version: non-monotone timestamp {ts} <= {} for x{i} at site {s}",
                    last.ts
                )));
            }
        }
        versions.push(Version { ts, value });
        Ok(())
    }

    /// The version with maximal timestamp <= `ts`, or None if `ts` precedes
    /// every version (or the site/variable is unknown).
    pub fn get_version(&self, s: SiteId, i: VarId, ts: Timestamp) -> Option<Version> {
        self.sites
            .get(&s)?
            .get(&i)?
            .iter()
            .rev()
            .find(|v| v.ts <= ts)
            .copied()
    }

    /// The most recently installed version, or None.
    pub fn get_latest(&self, s: SiteId, i: VarId) -> Option<Version> {
        self.sites.get(&s)?.get(&i)?.last().copied()
    }

    pub fn has_variable(&self, s: SiteId, i: VarId) -> bool {
        self.sites.get(&s).is_some_and(|vars| vars.contains_key(&i))
    }

    /// All variables held at site `s`, ascending.
    pub fn all_variables(&self, s: SiteId) -> Vec<VarId> {
        self.sites
            .get(&s)
            .map(|vars| vars.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    fn store_with_x1_at_site_1() -> VersionStore {
        let mut store = VersionStore::new();
        store.init_site(1, [(1, 10)]);
        store
    }

    #[test]
    fn seeds_initial_version() {
        let store = store_with_x1_at_site_1();
        let v = store.get_latest(1, 1).unwrap();
        assert_eq!(v.ts, 0);
        assert_eq!(v.value, 10);
    }

    #[test]
    fn monotone_append_and_point_lookup() {
        let mut store = store_with_x1_at_site_1();
        store.add_version(1, 1, 5, 101).unwrap();
        store.add_version(1, 1, 9, 909).unwrap();

        assert_eq!(store.get_version(1, 1, 0).unwrap().value, 10);
        assert_eq!(store.get_version(1, 1, 4).unwrap().value, 10);
        assert_eq!(store.get_version(1, 1, 5).unwrap().value, 101);
        assert_eq!(store.get_version(1, 1, 8).unwrap().value, 101);
        assert_eq!(store.get_version(1, 1, 9).unwrap().value, 909);
        assert_eq!(store.get_version(1, 1, 100).unwrap().value, 909);
        assert_eq!(store.get_latest(1, 1).unwrap().value, 909);
    }

    #[test]
    fn rejects_non_monotone_append() {
        let mut store = store_with_x1_at_site_1();
        store.add_version(1, 1, 5, 101).unwrap();
        assert!(store.add_version(1, 1, 5, 202).is_err());
        assert!(store.add_version(1, 1, 3, 202).is_err());
    }

    #[test]
    fn unknown_site_or_variable_reads_as_none() {
        let store = store_with_x1_at_site_1();
        assert!(store.get_version(2, 1, 0).is_none());
        assert!(store.get_version(1, 2, 0).is_none());
        assert!(!store.has_variable(1, 2));
        assert!(store.has_variable(1, 1));
    }

    #[test]
    fn all_variables_ascending() {
        let mut store = VersionStore::new();
        store.init_site(1, [(4, 40), (2, 20), (6, 60)]);
        assert_eq!(store.all_variables(1), vec![2, 4, 6]);
    }
}
