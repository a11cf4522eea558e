//! Deterministic discrete-event simulator of a small peer-to-peer consensus
//! network: N nodes gossiping blocks over a lossy/partitionable link, each
//! running proof-of-work or a hybrid leader-weighted variant, applying a
//! longest-work fork-choice rule with k-deep finality.
//!
//! The simulation core (this crate) has no I/O dependency beyond the
//! [`log::LogSink`] trait: it never touches the filesystem, the clock, or
//! an OS random source directly. All randomness is derived from
//! [`hash::h_int`] seeded by [`config::Config::seed`].

pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod log;
pub mod model;
pub mod network;
pub mod node;
pub mod sim;

pub use config::Config;
pub use error::ConsensusError;
pub use sim::Simulation;
