/// Ingest boundary: everything that touches bytes from the outside world.
///
/// Submodules:
/// - `nwm` — downloads SHEF forecast files from the NWM bucket.
/// - `shef` — decodes SHEF text into forecast records.
/// - `iem` — loads the station metadata catalog from IEM.

pub mod iem;
pub mod nwm;
pub mod shef;
