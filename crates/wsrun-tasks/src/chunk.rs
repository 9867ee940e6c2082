//! Output chunks captured from script subprocesses

use std::fmt;
use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches CSI sequences, OSC sequences and two-character escapes
static ANSI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]|\x9b[0-?]*[ -/]*[@-~]",
    )
    .expect("Invalid regex")
});

/// Which standard stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStreamName {
    Stdout,
    Stderr,
}

impl OutputStreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`OutputChunk::decode`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Remove ANSI escape sequences from the decoded text
    pub strip_ansi: bool,
}

/// One unit of raw output from one stream of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    /// The stream that produced the bytes
    pub stream_name: OutputStreamName,
    /// The bytes as read from the pipe
    pub raw: Bytes,
}

impl OutputChunk {
    pub fn new(stream_name: OutputStreamName, raw: impl Into<Bytes>) -> Self {
        Self {
            stream_name,
            raw: raw.into(),
        }
    }

    /// Decode the raw bytes as UTF-8, replacing invalid sequences
    pub fn decode(&self, options: DecodeOptions) -> String {
        let text = String::from_utf8_lossy(&self.raw);
        if options.strip_ansi {
            strip_ansi(&text)
        } else {
            text.into_owned()
        }
    }
}

/// Remove ANSI escape sequences from `text`
pub fn strip_ansi(text: &str) -> String {
    ANSI_REGEX.replace_all(text, "").into_owned()
}
