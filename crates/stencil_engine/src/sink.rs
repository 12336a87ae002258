use std::io::Write;

use parking_lot::Mutex;

/// Destination for script output.
pub trait OutputSink: Send + Sync {
    /// Emit one line of output produced on the thread labelled `label`.
    fn emit(&self, label: &str, text: &str);
}

/// Writes `Thread: <label> <text>` lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, label: &str, text: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout is not a script error.
        let _ = writeln!(stdout, "Thread: {label} {text}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub label: String,
    pub text: String,
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<OutputLine>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<OutputLine> {
        self.lines.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines.lock().iter().map(|line| line.text.clone()).collect()
    }

    /// Number of emitted lines whose text contains `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.text.contains(needle))
            .count()
    }
}

impl OutputSink for BufferSink {
    fn emit(&self, label: &str, text: &str) {
        self.lines.lock().push(OutputLine {
            label: label.to_string(),
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_collects_lines() {
        let sink = BufferSink::new();
        sink.emit("main", "hello");
        sink.emit("worker", "hello again");

        assert_eq!(sink.texts(), vec!["hello", "hello again"]);
        assert_eq!(sink.count_containing("hello"), 2);
        assert_eq!(sink.lines()[1].label, "worker");
    }
}
