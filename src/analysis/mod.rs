/// In-memory transforms between ingest and export.
///
/// These are pure functions over decoded records: no I/O, no shared
/// state. All blocking work lives at the ingest/export boundaries.
///
/// Submodules:
/// - `matching` — reconciles forecast station codes against the catalog.
/// - `series` — per-station ordering, dedup, and invariant checks.

pub mod matching;
pub mod series;
