//! Canonical detection rows shared by every ingestion path.

use serde::{Deserialize, Serialize};

/// Track identifier of a detection that no tracker associated.
pub const UNTRACKED: i64 = -1;

/// Class identifier of a detection whose class is unknown.
pub const UNKNOWN_CLASS: i64 = -1;

/// One observed object in one frame, as stored in the `tracks` table.
///
/// Center and size are in whatever coordinate system the producer used
/// (pixels for live detection, normalized units for legacy archives).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub frame: u32,
    pub track_id: i64,
    pub cls: i64,
    /// Detector score; `None` when the producer reported none.
    #[serde(default)]
    pub conf: Option<f64>,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl Detection {
    /// Whether a tracker assigned this detection to a track.
    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.track_id != UNTRACKED
    }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.cx, self.cy)
    }
}
