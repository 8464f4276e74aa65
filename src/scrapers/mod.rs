//! Section scrapers.
//!
//! A scraper drives a [`crate::browser::BrowserSession`] in two phases:
//!
//! 1. **Indexing**: open the section listing and collect article URLs
//! 2. **Fetching**: open each article and pull title, body and cover image
//!
//! # Supported Sources
//!
//! | Source | Module | Section |
//! |--------|--------|---------|
//! | El País | [`elpais`] | Opinión |
//!
//! Failures to reach a page end the extraction; a page that loads but lacks
//! a headline is logged and skipped.

pub mod elpais;
