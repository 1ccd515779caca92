use std::collections::BTreeMap;

use kvsim_base::Bitmap256;
use tracing::debug;

use crate::{is_replicated, SiteId, Timestamp, VarId, N_SITES, N_VARS};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SiteState {
    Up,
    Failed,
    Recovering,
}

/// One site's availability history: its current state, the sequence of
/// uptime intervals (at most the last one open), and -- while
/// Recovering -- which replicated variables it has re-admitted via a
/// commit since the recover.
#[derive(Clone, Debug)]
pub struct Site {
    pub id: SiteId,
    pub state: SiteState,
    /// `[start, end]` pairs; `end == None` means still open.
    pub uptime_intervals: Vec<(Timestamp, Option<Timestamp>)>,
    /// One bit per replicated variable (indexed by variable id, 1..=N_VARS);
    /// meaningless for variables this site does not hold.
    replicated_read_enabled: Bitmap256,
}

impl Site {
    fn new(id: SiteId, now: Timestamp) -> Self {
        let mut replicated_read_enabled = Bitmap256::new();
        replicated_read_enabled.set_all();
        Site {
            id,
            state: SiteState::Up,
            uptime_intervals: vec![(now, None)],
            replicated_read_enabled,
        }
    }

    /// Replicated variables this site holds: all of them, every site
    /// carries every even variable.
    fn replicated_vars_held() -> impl Iterator<Item = VarId> {
        (1..=N_VARS).filter(|i| is_replicated(*i))
    }
}

/// Owns the fixed set of `N_SITES` sites and the static placement rules.
#[derive(Clone, Debug)]
pub struct SiteManager {
    sites: BTreeMap<SiteId, Site>,
}

impl SiteManager {
    /// All sites start Up with a single open interval at time 0.
    pub fn new() -> Self {
        let mut sites = BTreeMap::new();
        for s in 1..=N_SITES {
            sites.insert(s, Site::new(s, 0));
        }
        SiteManager { sites }
    }

    pub fn site(&self, s: SiteId) -> Option<&Site> {
        self.sites.get(&s)
    }

    pub fn all_site_ids() -> impl Iterator<Item = SiteId> {
        1..=N_SITES
    }

    pub fn fail(&mut self, s: SiteId, now: Timestamp) {
        let Some(site) = self.sites.get_mut(&s) else { return };
        if site.state == SiteState::Failed {
            return;
        }
        site.state = SiteState::Failed;
        if let Some(last) = site.uptime_intervals.last_mut() {
            last.1 = Some(now);
        }
        debug!(target: "kvsim", site = s, now, "site failed");
    }

    pub fn recover(&mut self, s: SiteId, now: Timestamp) {
        let Some(site) = self.sites.get_mut(&s) else { return };
        if site.state != SiteState::Failed {
            return;
        }
        site.state = SiteState::Recovering;
        site.uptime_intervals.push((now, None));
        site.replicated_read_enabled.clear_all();
        debug!(target: "kvsim", site = s, now, "site recovering");
    }

    /// Called after a commit installs a version of replicated `i` at `s`
    /// while `s` is Recovering. Re-admits the variable, and promotes the
    /// site to Up once every replicated variable it holds is re-enabled.
    pub fn enable_replicated_read(&mut self, s: SiteId, i: VarId) {
        debug_assert!(is_replicated(i));
        let Some(site) = self.sites.get_mut(&s) else { return };
        if site.state != SiteState::Recovering {
            return;
        }
        site.replicated_read_enabled.set(i as u8, true);
        let all_enabled = Site::replicated_vars_held().all(|v| site.replicated_read_enabled.get(v as u8));
        if all_enabled {
            site.state = SiteState::Up;
            debug!(target: "kvsim", site = s, "site recovered to Up");
        }
    }

    pub fn is_available(&self, s: SiteId) -> bool {
        self.sites.get(&s).is_some_and(|site| site.state != SiteState::Failed)
    }

    /// Whether a read of variable `i` may currently be served from site `s`.
    pub fn can_read(&self, s: SiteId, i: VarId) -> bool {
        let Some(site) = self.sites.get(&s) else { return false };
        if site.state == SiteState::Failed {
            return false;
        }
        if !self.holds(s, i) {
            return false;
        }
        if !is_replicated(i) {
            return true;
        }
        match site.state {
            SiteState::Up => true,
            SiteState::Recovering => site.replicated_read_enabled.get(i as u8),
            SiteState::Failed => false,
        }
    }

    /// Whether `s` stayed up through the entire closed window `[a, b]`.
    pub fn was_continuously_up(&self, s: SiteId, a: Timestamp, b: Timestamp) -> bool {
        debug_assert!(a <= b);
        let Some(site) = self.sites.get(&s) else { return false };
        site.uptime_intervals
            .iter()
            .any(|&(start, end)| start <= a && end.map_or(true, |e| e >= b))
    }

    /// Whether `s` physically holds variable `i`, independent of availability.
    pub fn holds(&self, s: SiteId, i: VarId) -> bool {
        if is_replicated(i) {
            (1..=N_SITES).contains(&s)
        } else {
            s == crate::home_site(i)
        }
    }

    /// All sites physically holding `i`, ascending, independent of availability.
    pub fn sites_for_variable(i: VarId) -> Vec<SiteId> {
        if is_replicated(i) {
            (1..=N_SITES).collect()
        } else {
            vec![crate::home_site(i)]
        }
    }
}

impl Default for SiteManager {
    fn default() -> Self {
        Self::new()
    }
}
