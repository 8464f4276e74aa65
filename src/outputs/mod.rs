//! Output generation.
//!
//! # Submodules
//!
//! - [`report`]: plain-text report printed after every run
//! - [`json`]: optional JSON dump of the run results

pub mod json;
pub mod report;
