mod config;
use log::{debug, info};

use std::collections::HashMap;
use std::ops::AddAssign;

pub use crate::config::*;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
struct CandidateId(u32);

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

// The tally of an initialized engine.
// Invariant: `candidates`, `by_name` and `tally` always describe exactly the
// same candidate set, and `total` equals the sum of all the counts in `tally`.
#[derive(Eq, PartialEq, Debug, Clone)]
struct ActiveTally {
    // The candidates in registration order.
    candidates: Vec<(String, CandidateId)>,
    by_name: HashMap<String, CandidateId>,
    tally: HashMap<CandidateId, VoteCount>,
    total: VoteCount,
}

impl ActiveTally {
    /// The full ranking snapshot: vote count descending, name ascending.
    /// This is a total order, so repeated calls without a mutation in between
    /// return the same sequence.
    fn ranked(&self) -> Vec<RankedEntry> {
        let mut rows: Vec<RankedEntry> = self
            .candidates
            .iter()
            .map(|(name, cid)| {
                let count = self.tally.get(cid).cloned().unwrap_or(VoteCount::EMPTY);
                (name.clone(), count.0)
            })
            .collect();
        rows.sort_by(|(n1, c1), (n2, c2)| c2.cmp(c1).then_with(|| n1.cmp(n2)));
        rows
    }

    fn check_invariant(&self) {
        debug_assert_eq!(self.tally.values().cloned().sum::<VoteCount>(), self.total);
    }
}

/// An in-memory vote tally over a fixed set of candidates.
///
/// The engine has two logical states. It starts *uninitialized*: every
/// operation except [initialize](TallyEngine::initialize) fails with
/// [TallyErrors::NotInitialized]. After the first `initialize` it is *active*
/// and the candidate set is fixed until the next `initialize`, which discards
/// all the state and starts over.
///
/// All the operations are synchronous and run in `O(n log n)` at worst over
/// the number of candidates. The engine owns all of its state; a concurrent
/// caller is expected to wrap it in a single mutual exclusion lock.
pub struct TallyEngine {
    rules: TallyRules,
    state: Option<ActiveTally>,
    // Number of random draws since the last initialization.
    draws: u32,
}

impl TallyEngine {
    pub fn new(rules: &TallyRules) -> TallyEngine {
        TallyEngine {
            rules: *rules,
            state: None,
            draws: 0,
        }
    }

    /// Resets all the state and registers the given candidates with a count
    /// of zero. An empty list is accepted and produces an active engine with
    /// no candidates, which is distinct from an uninitialized engine.
    pub fn initialize(&mut self, names: &[String]) -> Result<(), TallyErrors> {
        let mut candidates: Vec<(String, CandidateId)> = Vec::new();
        let mut by_name: HashMap<String, CandidateId> = HashMap::new();
        let mut tally: HashMap<CandidateId, VoteCount> = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            let cid = CandidateId((idx + 1) as u32);
            if by_name.insert(name.clone(), cid).is_some() {
                return Err(TallyErrors::DuplicateCandidate(name.clone()));
            }
            candidates.push((name.clone(), cid));
            tally.insert(cid, VoteCount::EMPTY);
        }
        info!("initialize: registering {:?} candidates", candidates.len());
        for (name, cid) in candidates.iter() {
            debug!("initialize: candidate {}: {}", cid.0, name);
        }
        self.state = Some(ActiveTally {
            candidates,
            by_name,
            tally,
            total: VoteCount::EMPTY,
        });
        self.draws = 0;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn num_candidates(&self) -> Result<usize, TallyErrors> {
        Ok(self.active()?.candidates.len())
    }

    /// The running total of votes, including the votes added by rigging.
    pub fn total_votes(&self) -> Result<u64, TallyErrors> {
        Ok(self.active()?.total.0)
    }

    /// Adds one vote for the given candidate. Returns `Ok(false)` without any
    /// state change when the name is not registered. The vote is visible in
    /// the very next ranking query.
    pub fn cast_vote(&mut self, name: &str) -> Result<bool, TallyErrors> {
        let state = self.active_mut()?;
        let cid = match state.by_name.get(name) {
            Some(cid) => *cid,
            None => {
                debug!("cast_vote: unknown candidate {:?}", name);
                return Ok(false);
            }
        };
        if let Some(vc) = state.tally.get_mut(&cid) {
            *vc += VoteCount(1);
        }
        state.total += VoteCount(1);
        state.check_invariant();
        Ok(true)
    }

    /// Casts one vote for a candidate drawn from the registered set, and
    /// returns the name of the candidate that received it. Returns `Ok(None)`
    /// when no candidate is registered.
    ///
    /// The draw is deterministic for a given seed and draw sequence: it takes
    /// the head of a fresh crypto permutation of the candidate names.
    pub fn cast_random_vote(&mut self) -> Result<Option<String>, TallyErrors> {
        let seed = self.rules.random_seed;
        let names: Vec<String> = {
            let state = self.active()?;
            state.candidates.iter().map(|(n, _)| n.clone()).collect()
        };
        self.draws += 1;
        let permuted = candidate_permutation_crypto(&names, seed, self.draws);
        let pick = match permuted.into_iter().next() {
            Some(name) => name,
            None => return Ok(None),
        };
        debug!("cast_random_vote: draw {} picked {:?}", self.draws, pick);
        self.cast_vote(&pick)?;
        Ok(Some(pick))
    }

    /// Forces the given candidate into first place, following the configured
    /// [RigPolicy]. Returns `Ok(false)` without any state change when the
    /// name is not registered.
    pub fn rig_election(&mut self, name: &str) -> Result<bool, TallyErrors> {
        let policy = self.rules.rig_policy;
        let state = self.active_mut()?;
        let cid = match state.by_name.get(name) {
            Some(cid) => *cid,
            None => {
                debug!("rig_election: unknown candidate {:?}", name);
                return Ok(false);
            }
        };
        match policy {
            RigPolicy::MinimalIncrement => rig_minimal(state, cid),
            RigPolicy::ResetToTarget(target) => rig_reset(state, cid, target),
        }
        state.check_invariant();
        info!(
            "rig_election: {:?} rigged with policy {:?}, new count: {:?}",
            name,
            policy,
            state.tally.get(&cid)
        );
        Ok(true)
    }

    /// The first `min(k, number of candidates)` names of the ranking
    /// snapshot. Pure query.
    pub fn top_k(&self, k: usize) -> Result<Vec<String>, TallyErrors> {
        let state = self.active()?;
        Ok(state
            .ranked()
            .into_iter()
            .take(k)
            .map(|(name, _)| name)
            .collect())
    }

    /// The full ranking snapshot, one entry per registered candidate. Pure
    /// query, meant for external consumption such as printing an audit.
    pub fn audit(&self) -> Result<Vec<RankedEntry>, TallyErrors> {
        let state = self.active()?;
        Ok(state.ranked())
    }

    fn active(&self) -> Result<&ActiveTally, TallyErrors> {
        self.state.as_ref().ok_or(TallyErrors::NotInitialized)
    }

    fn active_mut(&mut self) -> Result<&mut ActiveTally, TallyErrors> {
        self.state.as_mut().ok_or(TallyErrors::NotInitialized)
    }
}

impl Default for TallyEngine {
    fn default() -> Self {
        TallyEngine::new(&TallyRules::DEFAULT_RULES)
    }
}

// Leaves the other counts untouched and gives the rigged candidate one vote
// more than everyone else combined.
fn rig_minimal(state: &mut ActiveTally, cid: CandidateId) {
    let current = state.tally.get(&cid).cloned().unwrap_or(VoteCount::EMPTY);
    let needed = VoteCount(state.total.0 - current.0 + 1);
    if let Some(vc) = state.tally.get_mut(&cid) {
        *vc += needed;
    }
    state.total += needed;
}

// Rebuilds the tally from scratch around a target total of votes. The
// remaining candidates are topped up in registration order, one vote each,
// while the total stays below the target.
fn rig_reset(state: &mut ActiveTally, cid: CandidateId, target: u64) {
    for vc in state.tally.values_mut() {
        *vc = VoteCount::EMPTY;
    }
    state.total = VoteCount::EMPTY;

    let others = (state.candidates.len() - 1) as u64;
    let rigged = std::cmp::max(target.saturating_sub(others), 1);
    if let Some(vc) = state.tally.get_mut(&cid) {
        *vc = VoteCount(rigged);
    }
    state.total += VoteCount(rigged);

    for (_, other) in state.candidates.iter() {
        if *other != cid && state.total.0 < target {
            if let Some(vc) = state.tally.get_mut(other) {
                *vc = VoteCount(1);
            }
            state.total += VoteCount(1);
        }
    }
}

/// Generates a "random" permutation of the candidates. Random in this context
/// means hard to guess in advance: each name is keyed by a cryptographic hash
/// of the seed, the round and the name, and the names are sorted by key.
pub fn candidate_permutation_crypto(candidates: &[String], seed: u32, round: u32) -> Vec<String> {
    let mut data: Vec<(String, String)> = candidates
        .iter()
        .map(|name| {
            let key = sha256::digest(format!("{:08}{:08}{}", seed, round, name));
            (key, name.clone())
        })
        .collect();
    data.sort();
    data.into_iter().map(|p| p.1).collect()
}

/// Deterministic pick of an index in `0..span`, keyed by a cryptographic hash
/// of the seed and the draw number. `span` must be positive.
pub fn seeded_pick(seed: u32, draw: u32, span: usize) -> usize {
    let digest = sha256::digest(format!("{:08}{:08}", seed, draw));
    let word = u64::from_str_radix(&digest[..16], 16).unwrap_or(0);
    (word % span as u64) as usize
}
