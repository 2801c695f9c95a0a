//! The DAG and main-chain consensus core (spec.md §4.3-4.4).
//!
//! Submodules are layered leaves-first: [`error`] and [`config`] have no
//! internal dependencies; [`difficulty`], [`reward`], and [`orphan`] are
//! pure data structures; [`validator`] and [`fork_choice`] are read-only
//! checks and planning against a [`crate::store::BlockStore`]; [`engine`]
//! orchestrates all of them into the admission pipeline and epoch-driven
//! election.

pub mod config;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod fork_choice;
pub mod orphan;
pub mod reward;
pub mod validator;

pub use config::ConsensusConfig;
pub use engine::{AdmissionOutcome, DagEngine, ReorgOutcome};
pub use error::{ConsensusError, ValidationError};
pub use orphan::OrphanPool;
