use thiserror::Error;

use crate::ObjType;

/// Recoverable error raised by problem operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProblemError {
    /// A solver supplied vector does not match the problem dimensions.
    #[error("invalid vector size: {name} has length {actual}, expected {expected}")]
    InvalidVectorSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unknown constraint type {0}")]
    UnknownConstrType(String),
    #[error("unknown function type {0}")]
    UnknownFuncType(String),
    #[error("unknown heuristic type {0}")]
    UnknownHeurType(String),
    /// Components were added or the network changed since the last analyze.
    #[error("problem is not analyzed for the current network and components")]
    NotAnalyzed,
}

/// Inconsistency found in a network description.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("duplicate bus number {0}")]
    DuplicateBus(usize),
    #[error("{obj} {index} references missing bus {bus}")]
    BadBusReference { obj: ObjType, index: usize, bus: usize },
    #[error("network is disconnected: {0} buses unreachable from bus {1}")]
    Disconnected(usize, usize),
    #[error("invalid vector size: {actual} values for {expected} variables")]
    InvalidVectorSize { expected: usize, actual: usize },
}
