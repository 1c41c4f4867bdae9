
pub mod error;
pub mod frame;
pub mod sequence;
pub mod simulation;
pub mod source;
pub mod sync;
pub mod tracing_init;
pub mod tracker;

pub use error::{SourceError, SyncError};
pub use frame::{CpKind, HalfFrame};
pub use sequence::{ReferenceGenerator, ReferenceWaveform};
pub use source::SampleSource;
pub use sync::{CellIdentity, CellSynchronizer, Detection, SyncConfig, SyncOutcome};
pub use tracker::{AcquisitionTracker, Step, TrackerConfig, TrackerState};
