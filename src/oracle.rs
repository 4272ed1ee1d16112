//! Identity and vehicle backends
//!
//! Production implementations of [`Oracle`](crate::runtime::Oracle).

mod error;
mod fixture;
mod tracker;

pub use error::{OracleError, OracleErrorKind};
pub use fixture::FixtureOracle;
pub use tracker::TrackerApiOracle;
