//! Error types.
//!
//! [`Infeasible`] is not a failure: it tells the evaluator that a branch is dead and
//! never leaves it. Everything else stops the analysis and reaches the caller as an
//! [`AnalysisError`] that names the program point where it happened.

use thiserror::Error;

use crate::address::Address;
use crate::callstring::ProgramCtx;
use crate::range::Range;

/// The state became empty: no concrete execution satisfies the constraints.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("infeasible")]
pub struct Infeasible;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DisassemblyError {
    #[error("no code at address {0:#x}")]
    UnknownCodeAddress(u64),
    #[error("cannot decode instruction at {address:#x}: {reason}")]
    Decode { address: u64, reason: String },
}

/// Failures raised while evaluating one statement.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("jump target {target} at {address} is not a constant")]
    NonConstantTarget { address: Address, target: Range },
    #[error("branch target at {address} could not be resolved to a finite set of addresses")]
    UnresolvedBranch { address: Address },
    #[error("both branch arms at {address} are infeasible")]
    BothBranchesInfeasible { address: Address },
    #[error("statement at {address} has no successors")]
    NoSuccessors { address: Address },
    #[error("native call `{name}` at {address} cannot be evaluated without a system model")]
    UnsupportedNative { address: Address, name: String },
    #[error("no statement at {0}")]
    MissingStatement(Address),
    #[error("evaluation stopped by an error at {address}: {message}")]
    ErrorFlow { address: Address, message: String },
    #[error(transparent)]
    Disassembly(#[from] DisassemblyError),
}

#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("analysis cancelled")]
    Cancelled,
    #[error("unexpected failure: {0}")]
    Panicked(String),
}

/// A fatal analysis failure at a program point.
///
/// The analysis keeps the states and warnings computed before the failure, so they
/// can be inspected after this error is returned.
#[derive(Debug, Clone, Error)]
#[error("analysis failed at {ctx}: {kind}")]
pub struct AnalysisError {
    pub ctx: ProgramCtx,
    pub stmt: Option<String>,
    #[source]
    pub kind: ErrorKind,
}

impl AnalysisError {
    pub fn new(ctx: ProgramCtx, stmt: Option<String>, kind: impl Into<ErrorKind>) -> Self {
        AnalysisError {
            ctx,
            stmt,
            kind: kind.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
