pub mod classification;
pub mod config;
pub mod error;
pub mod record;
pub mod run;
pub mod traits;

pub use classification::{Classification, ErrorCategory};
pub use config::Config;
pub use error::*;
pub use record::{DataKind, Flight, Records, Snapshot, StateVector};
pub use run::{IngestionRun, RunId, RunPatch, RunStatus, Window};
pub use traits::{ArtifactStore, DataSource, StoredArtifact};
