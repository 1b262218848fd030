use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use super::ScriptError;

/// Text supplier for [`ScriptSplitter`](super::ScriptSplitter).
///
/// The splitter only ever looks at `buffer()`. Streaming sources grow the
/// buffer a line at a time through `load_more` and forget text the splitter
/// has already consumed through `discard`.
pub trait ScriptSource {
    fn buffer(&self) -> &str;

    /// Appends more text to the buffer. Returns `false` at end of input.
    fn load_more(&mut self) -> Result<bool, ScriptError>;

    /// Drops the first `len` bytes of the buffer.
    fn discard(&mut self, len: usize);

    /// Starts over from the first byte of the script.
    fn rewind(&mut self) -> Result<(), ScriptError>;

    /// Whether discarded text is gone for good, so commands must carry their
    /// own copy of the SQL.
    fn is_streaming(&self) -> bool;
}

/// A script that is completely held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource<'s> {
    script: &'s str,
    offset: usize,
}

impl<'s> MemorySource<'s> {
    pub fn new(script: &'s str) -> Self {
        Self { script, offset: 0 }
    }
}

impl ScriptSource for MemorySource<'_> {
    fn buffer(&self) -> &str {
        &self.script[self.offset..]
    }

    fn load_more(&mut self) -> Result<bool, ScriptError> {
        Ok(false)
    }

    fn discard(&mut self, len: usize) {
        self.offset = (self.offset + len).min(self.script.len());
    }

    fn rewind(&mut self) -> Result<(), ScriptError> {
        self.offset = 0;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        false
    }
}

/// A script read line by line from a seekable reader, usually a file that is
/// too large to be loaded into memory.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    buffer: String,
    eof: bool,
}

impl ReaderSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ScriptError> {
        if !path.exists() {
            return Err(ScriptError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead + Seek> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: String::new(),
            eof: false,
        }
    }
}

impl<R: BufRead + Seek> ScriptSource for ReaderSource<R> {
    fn buffer(&self) -> &str {
        &self.buffer
    }

    fn load_more(&mut self) -> Result<bool, ScriptError> {
        if self.eof {
            return Ok(false);
        }
        let read = self.reader.read_line(&mut self.buffer)?;
        if read == 0 {
            self.eof = true;
        }
        Ok(read > 0)
    }

    fn discard(&mut self, len: usize) {
        let len = len.min(self.buffer.len());
        self.buffer.drain(..len);
    }

    fn rewind(&mut self) -> Result<(), ScriptError> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.buffer.clear();
        self.eof = false;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        true
    }
}
