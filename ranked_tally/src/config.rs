// ********* Output data structures ***********

use std::error::Error;
use std::fmt::Display;

/// A ranked entry of the tally: the candidate name and its current vote count.
///
/// Entries are always produced in ranking order: vote count descending,
/// candidate name ascending.
pub type RankedEntry = (String, u64);

/// Errors that prevent an operation on the engine from completing.
///
/// An unknown candidate name is not an error: the corresponding operations
/// report it through their return value and leave the tally unchanged.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyErrors {
    /// An operation was invoked before `initialize`.
    NotInitialized,
    /// The candidate list passed to `initialize` contains the same name twice.
    DuplicateCandidate(String),
}

impl Error for TallyErrors {}

impl Display for TallyErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyErrors::NotInitialized => {
                write!(f, "TallyError: the engine has not been initialized")
            }
            TallyErrors::DuplicateCandidate(name) => {
                write!(f, "TallyError: duplicate candidate name {:?}", name)
            }
        }
    }
}

// ********* Configuration **********

/// The policy applied when a candidate is forced into first place.
///
/// - MinimalIncrement adds exactly enough votes to the rigged candidate to
/// exceed the sum of everyone else's votes by one. All the other counts are
/// left untouched and the running total grows accordingly. This policy always
/// yields a sole first place.
///
/// - ResetToTarget(p) discards all the counts, assigns the rigged candidate
/// `max(p - (n - 1), 1)` votes and then one vote to each remaining candidate
/// until the total reaches `p`. When `p` is small compared to the number of
/// candidates, the rigged candidate may end up tied for first place instead
/// of alone in the lead.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RigPolicy {
    MinimalIncrement,
    ResetToTarget(u64),
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct TallyRules {
    pub rig_policy: RigPolicy,
    /// Seed for the deterministic random vote draws. Two engines built with
    /// the same seed and given the same calls produce the same tallies.
    pub random_seed: u32,
}

impl TallyRules {
    pub const DEFAULT_RULES: TallyRules = TallyRules {
        rig_policy: RigPolicy::MinimalIncrement,
        random_seed: 0,
    };
}
