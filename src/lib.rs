//! # rreil-fixpoint: abstract interpretation of binaries
//!
//! **`rreil-fixpoint`** computes a sound over-approximation of the states a binary program
//! can reach. Native code is decoded on demand, lowered to RREIL, and evaluated over an
//! abstract domain until the states of all program points stop growing.
//!
//! ## Key Features
//!
//! - **Call-string sensitivity**: every program point is qualified by the sequence of
//!   calls that led to it, bounded by `k` ([`callstring`]).
//! - **Lazy disassembly**: unreachable code is never decoded ([`code_cache`]).
//! - **Stackable domains**: a domain is any type implementing [`Domain`][crate::domain::Domain].
//!   Layers such as [`Affine`][crate::affine::Affine] wrap a child domain and are
//!   assembled at compile time.
//! - **Partial results**: when the analysis fails or is cancelled, the states and
//!   warnings computed so far remain available.
//!
//! ## Basic Usage
//!
//! The crate does not ship a numeric leaf domain; bring your own `Leaf: Domain`.
//!
//! ```ignore
//! use rreil_fixpoint::prelude::*;
//!
//! let program = LiftedProgram::new()
//!     .with(0, "mov", vec![Stmt::assign(&a, Lin::lit(1))])
//!     .with(1, "hlt", vec![Stmt::halt()]);
//! let initial = Root::new(Affine::new(Leaf::default()));
//! let mut analysis = Analysis::new(Binary::default(), program, initial, Environment::new(), AnalysisConfig::default());
//! analysis.run_from(0)?;
//! for (ctx, state) in analysis.state_space().iter() {
//!     println!("{}: {:?}", ctx, state);
//! }
//! ```
//!
//! ## Core Components
//!
//! - **[`analysis`]**: the fixpoint driver.
//! - **[`evaluator`]**: the transfer function producing [`Flows`][crate::flows::Flows].
//! - **[`state_space`]**: states per program point and the join/widen update.
//! - **[`domain`]**: the domain contract; [`affine`] and [`root`] implement it.

pub mod address;
pub mod affine;
pub mod analysis;
pub mod binary;
pub mod callstring;
pub mod code_cache;
pub mod config;
pub mod disassembler;
pub mod domain;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod flows;
pub mod range;
pub mod root;
pub mod rreil;
pub mod state_space;
pub mod transitions;
pub mod warnings;
pub mod worklist;

pub mod prelude {
    pub use crate::address::{Address, Transition};
    pub use crate::affine::Affine;
    pub use crate::analysis::{Analysis, CancellationToken};
    pub use crate::binary::{Binary, Permissions, Segment};
    pub use crate::callstring::{CallString, ProgramCtx};
    pub use crate::config::AnalysisConfig;
    pub use crate::disassembler::{Disassembler, LiftedProgram, NativeInstruction};
    pub use crate::domain::Domain;
    pub use crate::environment::Environment;
    pub use crate::error::{AnalysisError, Result};
    pub use crate::root::{Root, RootDomain};
    pub use crate::rreil::{Cmp, CmpOp, Lin, Rhs, Rval, Rvar, Stmt};
}
