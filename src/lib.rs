//! NWM coastal Total Water Level forecast pipeline.
//!
//! Fetches SHEF short-range coastal forecasts from the National Water
//! Model bucket, reconciles forecast station codes against the IEM
//! station catalog, and publishes normalized JSON artifacts for the
//! static site the mobile client reads.
//!
//! Module layout mirrors the data flow: ingest (fetch + decode +
//! catalog), then analysis (match + aggregate), then export (artifacts),
//! with `pipeline` driving one run end to end.

pub mod analysis;
pub mod config;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
