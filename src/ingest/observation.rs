//! Boxes reported by the detection/tracking collaborator, one frame at a time.

use serde::{Deserialize, Serialize};

use crate::ingest::detection::{Detection, UNKNOWN_CLASS, UNTRACKED};

/// A single box reported by the detection/tracking collaborator.
///
/// Boxes are stored in corner form (x1, y1, x2, y2). The class, confidence
/// and identifier are optional because detectors without a tracker attached
/// never report an identifier, and some exporters drop class or score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxObservation {
    /// Top-left x coordinate
    pub x1: f64,
    /// Top-left y coordinate
    pub y1: f64,
    /// Bottom-right x coordinate
    pub x2: f64,
    /// Bottom-right y coordinate
    pub y2: f64,
    /// Class id, if reported
    #[serde(default)]
    pub cls: Option<i64>,
    /// Confidence score, if reported
    #[serde(default)]
    pub conf: Option<f64>,
    /// Persistent identifier, only present while a tracker is active
    #[serde(default)]
    pub track_id: Option<i64>,
}

impl BoxObservation {
    /// Create an observation from corner coordinates with no metadata.
    #[inline]
    pub fn from_xyxy(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            ..Self::default()
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Get the center point of the box.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Convert to a canonical detection row for `frame`.
    ///
    /// When `tracked` is false the identifier is discarded even if present,
    /// so untracked runs never leak stale ids into the table.
    pub fn to_detection(&self, frame: u32, tracked: bool) -> Detection {
        let (cx, cy) = self.center();
        let track_id = if tracked {
            self.track_id.unwrap_or(UNTRACKED)
        } else {
            UNTRACKED
        };
        Detection {
            frame,
            track_id,
            cls: self.cls.unwrap_or(UNKNOWN_CLASS),
            conf: self.conf,
            cx,
            cy,
            w: self.width(),
            h: self.height(),
        }
    }
}

/// All boxes the collaborator reported for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame: u32,
    #[serde(default)]
    pub boxes: Vec<BoxObservation>,
}

impl FrameResult {
    pub fn new(frame: u32, boxes: Vec<BoxObservation>) -> Self {
        Self { frame, boxes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_and_size() {
        let b = BoxObservation::from_xyxy(10.0, 20.0, 40.0, 60.0);
        assert_eq!(b.center(), (25.0, 40.0));
        assert_eq!(b.width(), 30.0);
        assert_eq!(b.height(), 40.0);
    }

    #[test]
    fn test_to_detection_defaults() {
        let b = BoxObservation::from_xyxy(0.0, 0.0, 2.0, 4.0);
        let det = b.to_detection(5, true);
        assert_eq!(det.frame, 5);
        assert_eq!(det.track_id, UNTRACKED);
        assert_eq!(det.cls, UNKNOWN_CLASS);
        assert_eq!(det.conf, None);
        assert_eq!((det.cx, det.cy, det.w, det.h), (1.0, 2.0, 2.0, 4.0));
    }

    #[test]
    fn test_untracked_run_drops_ids() {
        let b = BoxObservation {
            track_id: Some(12),
            cls: Some(2),
            conf: Some(0.8),
            ..BoxObservation::from_xyxy(0.0, 0.0, 1.0, 1.0)
        };
        assert_eq!(b.to_detection(0, false).track_id, UNTRACKED);
        let tracked = b.to_detection(0, true);
        assert_eq!(tracked.track_id, 12);
        assert_eq!(tracked.cls, 2);
    }
}
