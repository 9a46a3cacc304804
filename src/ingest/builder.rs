//! Box observations from the corner, center and top-left conventions detectors use.

use crate::ingest::observation::BoxObservation;

/// Builder for creating `BoxObservation` objects from detector outputs that
/// use different box conventions.
#[derive(Debug, Clone, Default)]
pub struct BoxBuilder {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    cls: Option<i64>,
    conf: Option<f64>,
    track_id: Option<i64>,
}

impl BoxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the box in corner format (x1, y1, x2, y2).
    pub fn xyxy(mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Set the box in center format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f64, cy: f64, w: f64, h: f64) -> Self {
        self.x1 = cx - w / 2.0;
        self.y1 = cy - h / 2.0;
        self.x2 = cx + w / 2.0;
        self.y2 = cy + h / 2.0;
        self
    }

    /// Set the box in top-left format (left, top, width, height).
    pub fn tlwh(mut self, l: f64, t: f64, w: f64, h: f64) -> Self {
        self.x1 = l;
        self.y1 = t;
        self.x2 = l + w;
        self.y2 = t + h;
        self
    }

    pub fn class(mut self, cls: i64) -> Self {
        self.cls = Some(cls);
        self
    }

    /// Set the confidence score.
    pub fn score(mut self, conf: f64) -> Self {
        self.conf = Some(conf);
        self
    }

    /// Set the identifier assigned by an active tracker.
    pub fn track_id(mut self, id: i64) -> Self {
        self.track_id = Some(id);
        self
    }

    /// Finish the observation; unset metadata stays unreported.
    pub fn build(self) -> BoxObservation {
        BoxObservation {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2,
            y2: self.y2,
            cls: self.cls,
            conf: self.conf,
            track_id: self.track_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_builder() {
        let obs = BoxBuilder::new()
            .xyxy(10.0, 20.0, 50.0, 80.0)
            .score(0.95)
            .class(2)
            .build();

        assert_eq!(obs.conf, Some(0.95));
        assert_eq!(obs.cls, Some(2));
        assert_eq!(obs.track_id, None);
        assert_eq!(obs.center(), (30.0, 50.0));
    }

    #[test]
    fn test_formats_agree() {
        let a = BoxBuilder::new().xywh(30.0, 50.0, 40.0, 60.0).build();
        let b = BoxBuilder::new().tlwh(10.0, 20.0, 40.0, 60.0).build();
        assert_eq!((a.x1, a.y1, a.x2, a.y2), (b.x1, b.y1, b.x2, b.y2));
    }
}
