//! Core math modules.

pub mod beta;
pub mod ewma;
pub mod simplex;
pub mod stable;
