use crate::{is_replicated, SiteId, SiteManager, Timestamp, VarId, VersionStore};

/// Available-copies read routing with a continuity check: a version read
/// from site `s` at time `V.ts` is only trustworthy through `begin_ts` if
/// `s` never failed in between, since a failure could have hidden an
/// intervening write from it.
pub fn select_read_site(
    store: &VersionStore,
    sites: &SiteManager,
    i: VarId,
    begin_ts: Timestamp,
) -> Option<(SiteId, Timestamp)> {
    for s in SiteManager::sites_for_variable(i) {
        if !sites.can_read(s, i) {
            continue;
        }
        let Some(v) = store.get_version(s, i, begin_ts) else {
            continue;
        };
        if sites.was_continuously_up(s, v.ts, begin_ts) {
            return Some((s, v.ts));
        }
    }
    None
}

/// Snapshot, at this instant, of where a write to `i` would land.
pub fn select_write_sites(sites: &SiteManager, i: VarId) -> Vec<SiteId> {
    if is_replicated(i) {
        SiteManager::sites_for_variable(i)
            .into_iter()
            .filter(|&s| sites.is_available(s))
            .collect()
    } else {
        let home = crate::home_site(i);
        if sites.is_available(home) {
            vec![home]
        } else {
            Vec::new()
        }
    }
}
