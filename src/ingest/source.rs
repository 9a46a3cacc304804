//! Trait for the detection/tracking collaborator.

use crate::ingest::observation::FrameResult;

/// A restartable, finite, ordered sequence of per-frame results.
///
/// Track ingestion pulls frames synchronously, in frame order, until the
/// source reports `None`. [`FrameResultsFile`](crate::ingest::FrameResultsFile)
/// reads them from an exported NDJSON file; a camera feed replayed from
/// memory only needs an index:
///
/// ```
/// use std::convert::Infallible;
/// use traffic_movements::ingest::{BoxBuilder, FrameResult, FrameSource};
///
/// /// One car crossing the image left to right, one box per frame.
/// struct Replay {
///     frame: u32,
///     last: u32,
/// }
///
/// impl FrameSource for Replay {
///     type Error = Infallible;
///
///     fn next_frame(&mut self) -> Result<Option<FrameResult>, Infallible> {
///         if self.frame > self.last {
///             return Ok(None);
///         }
///         let x = 20.0 * self.frame as f64;
///         let car = BoxBuilder::new().xyxy(x, 100.0, x + 40.0, 130.0).class(2).track_id(1).build();
///         self.frame += 1;
///         Ok(Some(FrameResult::new(self.frame - 1, vec![car])))
///     }
///
///     fn rewind(&mut self) -> Result<(), Infallible> {
///         self.frame = 0;
///         Ok(())
///     }
/// }
///
/// let mut replay = Replay { frame: 0, last: 2 };
/// assert_eq!(replay.next_frame().unwrap().map(|f| f.boxes.len()), Some(1));
/// ```
pub trait FrameSource {
    /// Failure while reading or decoding a frame.
    type Error;

    /// Produce the next frame's result, or `None` once the sequence is exhausted.
    fn next_frame(&mut self) -> Result<Option<FrameResult>, Self::Error>;

    /// Restart the sequence from its first frame.
    fn rewind(&mut self) -> Result<(), Self::Error>;
}

/// In-memory frame sequence, mostly useful for tests and for callers that
/// already hold detector output.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSource {
    frames: Vec<FrameResult>,
    cursor: usize,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<FrameResult>) -> Self {
        Self { frames, cursor: 0 }
    }
}

impl FrameSource for MemoryFrameSource {
    type Error = std::convert::Infallible;

    fn next_frame(&mut self) -> Result<Option<FrameResult>, Self::Error> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<(), Self::Error> {
        self.cursor = 0;
        Ok(())
    }
}

impl From<Vec<FrameResult>> for MemoryFrameSource {
    fn from(frames: Vec<FrameResult>) -> Self {
        Self::new(frames)
    }
}
