//! Output formatting utilities

use std::collections::HashMap;

use console::style;

use wsrun_tasks::{DecodeOptions, OutputChunk, OutputStreamName};

/// Print a success message
pub fn success(message: &str) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Splits output chunks into whole lines and prefixes each with its label.
///
/// Chunks do not respect line boundaries, so the bytes of a partial trailing
/// line are held back per (label, stream) until the rest arrives or
/// [`flush`] is called. A line is only decoded once it is complete, so
/// multi-byte characters and escape sequences split across chunks survive.
///
/// [`flush`]: LinePrefixer::flush
#[derive(Debug, Default)]
pub struct LinePrefixer {
    options: DecodeOptions,
    pending: HashMap<(String, OutputStreamName), Vec<u8>>,
}

impl LinePrefixer {
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            options: DecodeOptions { strip_ansi },
            pending: HashMap::new(),
        }
    }

    /// Feed a chunk and return the complete lines it finished, already prefixed
    pub fn push(&mut self, label: &str, chunk: &OutputChunk) -> Vec<String> {
        let stream = chunk.stream_name;
        let buffer = self.pending.entry((label.to_string(), stream)).or_default();
        buffer.extend_from_slice(&chunk.raw);

        let Some(last_newline) = buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(buffer, rest);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(|line| self.format(label, stream, line))
            .collect()
    }

    /// Emit every held-back partial line
    pub fn flush(&mut self) -> Vec<(OutputStreamName, String)> {
        let mut pending: Vec<_> = self
            .pending
            .drain()
            .filter(|(_, bytes)| !bytes.is_empty())
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        pending
            .into_iter()
            .map(|((label, stream), bytes)| (stream, self.format(&label, stream, &bytes)))
            .collect()
    }

    fn format(&self, label: &str, stream: OutputStreamName, line: &[u8]) -> String {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let text = OutputChunk::new(stream, line.to_vec()).decode(self.options);
        format!("{} {}", style(format!("[{}]", label)).dim(), text)
    }
}
