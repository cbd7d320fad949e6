//! fragprint-core
//!
//! Behavioral fingerprinting of short 6502 instruction sequences.
//!
//! Fragments found in a binary are validated ([`validate`]), rewritten into a
//! canonical address layout ([`canon`]), executed against a fixed battery of
//! machine states ([`vectors`], [`runner`]) over a symbolic bus ([`bus`]), and
//! reduced to per-symbol signatures ([`fingerprint`]). The same machinery turns
//! a behavioral description ([`query`]) into a fingerprint that can be looked
//! up in the fragment database ([`db`]).

pub mod bus;
pub mod canon;
pub mod config;
pub mod cpu;
pub mod db;
pub mod fingerprint;
pub mod query;
pub mod runner;
pub mod scan;
pub mod symbols;
pub mod validate;
pub mod vectors;
