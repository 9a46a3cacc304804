//! Flattening of frame sequences into `tracks` table rows.

use tracing::debug;

use crate::ingest::detection::Detection;
use crate::ingest::source::FrameSource;

/// Drives a `FrameSource` to exhaustion and flattens every reported box into
/// a `Detection`.
///
/// With `tracked == false` the run is treated as detection-only and every row
/// gets track id -1, mirroring a detector that has no tracker attached.
pub struct TrackIngestor<S: FrameSource> {
    source: S,
    tracked: bool,
}

impl<S: FrameSource> TrackIngestor<S> {
    pub fn new(source: S, tracked: bool) -> Self {
        Self { source, tracked }
    }

    /// Ingest every frame of the source, starting from its first frame.
    ///
    /// The source is rewound first, so calling this twice yields the same rows.
    pub fn ingest(&mut self) -> Result<Vec<Detection>, S::Error> {
        self.source.rewind()?;

        let mut rows = Vec::new();
        let mut frames = 0usize;
        while let Some(result) = self.source.next_frame()? {
            frames += 1;
            rows.extend(
                result
                    .boxes
                    .iter()
                    .map(|b| b.to_detection(result.frame, self.tracked)),
            );
        }

        debug!(frames, rows = rows.len(), tracked = self.tracked, "ingested frame sequence");
        Ok(rows)
    }

    /// Whether identifiers reported by the source are kept.
    pub fn is_tracked(&self) -> bool {
        self.tracked
    }

    /// Frame source being ingested.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}
