//! Frame results exported by a detector as newline-delimited JSON.
//!
//! Each non-blank line holds one frame:
//!
//! ```text
//! {"frame": 0, "boxes": [{"x1": 10, "y1": 20, "x2": 50, "y2": 80, "cls": 2, "conf": 0.9, "track_id": 4}]}
//! ```
//!
//! `frame` may be omitted, in which case the record's position in the file is
//! used. Lines that do not parse are logged and skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::ingest::observation::{BoxObservation, FrameResult};
use crate::ingest::source::FrameSource;

#[derive(Debug, Deserialize)]
struct FrameLine {
    #[serde(default)]
    frame: Option<u32>,
    #[serde(default)]
    boxes: Vec<BoxObservation>,
}

/// A `FrameSource` that streams a frame-results file lazily.
pub struct FrameResultsFile {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    position: u32,
    line_no: usize,
}

impl FrameResultsFile {
    /// Open `path` positioned at its first frame.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut file = Self {
            path: path.into(),
            lines: None,
            position: 0,
            line_no: 0,
        };
        file.rewind()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FrameResultsFile {
    type Error = Error;

    fn next_frame(&mut self) -> Result<Option<FrameResult>> {
        let Self {
            path,
            lines,
            position,
            line_no,
        } = self;
        let Some(lines) = lines.as_mut() else {
            return Ok(None);
        };

        for line in lines.by_ref() {
            let line = line.map_err(|e| Error::io(path.as_path(), e))?;
            *line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameLine>(trimmed) {
                Ok(parsed) => {
                    let frame = parsed.frame.unwrap_or(*position);
                    *position += 1;
                    return Ok(Some(FrameResult::new(frame, parsed.boxes)));
                }
                Err(e) => {
                    warn!(path = %path.display(), line = *line_no, error = %e, "skipping malformed frame record");
                }
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        self.lines = Some(BufReader::new(file).lines());
        self.position = 0;
        self.line_no = 0;
        Ok(())
    }
}
