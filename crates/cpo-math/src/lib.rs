//! Colony placement math utilities.

pub mod math;

pub use math::beta::*;
pub use math::ewma::*;
pub use math::simplex::*;
pub use math::stable::*;
