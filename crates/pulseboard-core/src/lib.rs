//! Period-comparison engine for the Pulseboard traffic dashboard.
//!
//! Everything here is a pure function of its inputs: rows fetched from the
//! rollup store go in, ranked comparison records come out. Caching and
//! scheduling belong to the caller.

pub mod aggregate;
pub mod compare;
pub mod config;
pub mod error;
pub mod ignore;
pub mod metric;
pub mod period;
pub mod projection;
pub mod ranking;
pub mod report;
pub mod source;
