//! Session recording.
//!
//! A recorder receives exactly the cleaned text each read call returns,
//! in the same chunks. Recording is diagnostic: write failures are logged
//! and otherwise ignored.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::error::DriverError;

/// Append-only sink for session transcripts.
pub struct SessionRecorder {
    sink: Box<dyn Write + Send>,
}

impl SessionRecorder {
    /// Record into an arbitrary writer.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Record into a file, creating parent directories as needed.
    ///
    /// An existing file is truncated.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let session_file_error = |source| DriverError::SessionFile {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(session_file_error)?;
        }
        let file = File::create(path).map_err(session_file_error)?;

        debug!("recording session to {}", path.display());
        Ok(Self::new(file))
    }

    /// Append text to the transcript.
    pub fn record(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.sink.write_all(text.as_bytes()) {
            debug!("session recorder write failed: {}", e);
        }
    }

    /// Flush and release the sink.
    pub fn close(mut self) {
        if let Err(e) = self.sink.flush() {
            debug!("session recorder flush failed: {}", e);
        }
    }
}

impl fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecorder").finish_non_exhaustive()
    }
}
