//! sd-core: shared foundation for the simulated control device.
//!
//! Contains:
//! - numeric (Real and the protocol's number parsers)
//! - ids (1-based channel identifiers used on the wire)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;

pub use error::{SdError, SdResult};
pub use ids::*;
pub use numeric::*;
