mod pvpq;

pub use pvpq::*;

use std::fmt;
use std::str::FromStr;

use crate::constr::Constraint;
use crate::{Network, ProblemError, PvpqOpt};

/// Heuristic type.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum HeurType {
    /// PV/PQ switching of generator regulated buses.
    PvpqSwitching = 0,
}

impl HeurType {
    pub const ALL: [HeurType; 1] = [HeurType::PvpqSwitching];

    pub fn name(&self) -> &'static str {
        match self {
            HeurType::PvpqSwitching => "PVPQ_SWITCHING",
        }
    }

    pub fn tag(&self) -> i32 {
        *self as i32
    }
}

impl fmt::Display for HeurType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<i32> for HeurType {
    type Error = ProblemError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        HeurType::ALL
            .into_iter()
            .find(|h| h.tag() == tag)
            .ok_or_else(|| ProblemError::UnknownHeurType(tag.to_string()))
    }
}

impl FromStr for HeurType {
    type Err = ProblemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeurType::ALL
            .into_iter()
            .find(|h| h.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProblemError::UnknownHeurType(s.to_string()))
    }
}

/// Creates a heuristic of the given type with default options.
pub fn new_heur(heur_type: HeurType) -> Box<dyn Heuristic> {
    match heur_type {
        HeurType::PvpqSwitching => Box::new(HeurPvpq::new(PvpqOpt::default())),
    }
}

/// Heuristic adjusts the network state, the state of constraints and the
/// current point between solver iterations.
pub trait Heuristic {
    fn heur_type(&self) -> HeurType;

    fn name(&self) -> &str {
        self.heur_type().name()
    }

    fn clear(&mut self, net: &Network);

    fn apply_step(
        &mut self,
        constrs: &mut [Box<dyn Constraint>],
        net: &mut Network,
        br: usize,
        t: usize,
        x: &mut [f64],
    );
}
