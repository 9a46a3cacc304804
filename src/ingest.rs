//! Track ingestion: normalizes raw per-frame detections into canonical rows.
//!
//! Two producers feed the `tracks` table: a live detection/tracking
//! collaborator exposed as a [`FrameSource`], and legacy entity archives.

mod builder;
mod detection;
mod frames_file;
mod ingestor;
mod legacy;
mod observation;
mod source;

pub use builder::BoxBuilder;
pub use detection::{Detection, UNKNOWN_CLASS, UNTRACKED};
pub use frames_file::FrameResultsFile;
pub use ingestor::TrackIngestor;
pub use legacy::{ClassMap, load_legacy_json, parse_legacy_str};
pub use observation::{BoxObservation, FrameResult};
pub use source::{FrameSource, MemoryFrameSource};
