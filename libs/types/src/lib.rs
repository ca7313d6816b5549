//! Types library for the remittance escrow
//!
//! Value types shared by the contract layer and its collaborators.
//!
//! # Modules
//! - `ids`: Account addresses and transfer sequence numbers
//! - `numeric`: Native-currency amounts and timestamps
//! - `errors`: Parse error taxonomy

pub mod ids;
pub mod numeric;
pub mod errors;

pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::errors::*;
}
