//! Small shared pieces for the Weft crates: artifact files on disk and the
//! wall clock used by trace records.

mod artifact;
mod clock;

pub use artifact::{write_artifact, ArtifactKind};
pub use clock::unix_time_ms;
