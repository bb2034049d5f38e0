//! Capture-line sources.
//!
//! This module provides different sources for the line-oriented capture
//! stream:
//! - External capture subprocess stdout (tcpdump or compatible)
//! - Saved capture text files (replay)
//! - Stub source (testing)
//!
//! All sources produce raw text lines that flow into the parser. A source is
//! responsible only for delivery; it never parses, and it never blocks on
//! registry locks. A read that fails or reaches end of stream stops that
//! producer cleanly without affecting the rest of the system.

pub mod parser;
pub mod vendor;

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

/// Blocking source of capture lines.
pub trait LineSource: Send {
    /// Read the next line. `Ok(None)` means the stream ended.
    ///
    /// Blocking here is the producer's natural waiting state; cancellation is
    /// cooperative and happens between reads.
    fn next_line(&mut self) -> Result<Option<String>>;

    /// Human-readable description for lifecycle logging.
    fn describe(&self) -> String;
}

/// Build the default capture invocation from the configured interface,
/// filter, and snapshot length.
pub fn default_capture_command(interface: &str, filter: &str, buffer_size: u32) -> Vec<String> {
    let mut cmd: Vec<String> = [
        "tcpdump", "-I", "-e", "-vvv", "-i", interface, "-n", "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    cmd.push(buffer_size.to_string());
    cmd.extend(filter.split_whitespace().map(|s| s.to_string()));
    cmd
}

// ----------------------------------------------------------------------------
// Subprocess source
// ----------------------------------------------------------------------------

/// Lines read from a spawned capture subprocess's stdout.
///
/// The subprocess itself (privileges, interface setup) is the operator's
/// concern; this source only consumes its output. Dropping the source kills
/// the child.
pub struct CommandCapture {
    child: Child,
    reader: BufReader<ChildStdout>,
    description: String,
    lines_read: u64,
}

impl CommandCapture {
    /// Spawn `argv[0]` with the remaining arguments, stdout piped.
    pub fn spawn(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .context("capture command must not be empty")?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn capture command {}", program))?;
        let stdout = child
            .stdout
            .take()
            .context("capture subprocess has no stdout")?;
        let description = argv.join(" ");
        log::info!("capture source: spawned `{}`", description);
        Ok(Self {
            child,
            reader: BufReader::new(stdout),
            description,
            lines_read: 0,
        })
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl LineSource for CommandCapture {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .context("read from capture subprocess")?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        Ok(Some(line.trim_end().to_string()))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

impl Drop for CommandCapture {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ----------------------------------------------------------------------------
// File replay source
// ----------------------------------------------------------------------------

/// Lines replayed from a saved capture text file.
pub struct FileCapture {
    reader: BufReader<File>,
    description: String,
}

impl FileCapture {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open capture file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
            description: format!("file:{}", path.display()),
        })
    }
}

impl LineSource for FileCapture {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end().to_string()))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

// ----------------------------------------------------------------------------
// Stub source for tests
// ----------------------------------------------------------------------------

/// Fixed list of lines, then end of stream.
pub struct StubCapture {
    lines: VecDeque<String>,
}

impl StubCapture {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineSource for StubCapture {
    fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_command_carries_interface_and_filter() {
        let cmd = default_capture_command("en0", "type mgt subtype probe-req", 256);
        assert_eq!(cmd[0], "tcpdump");
        assert!(cmd.contains(&"en0".to_string()));
        assert!(cmd.contains(&"256".to_string()));
        assert!(cmd.ends_with(&[
            "type".to_string(),
            "mgt".to_string(),
            "subtype".to_string(),
            "probe-req".to_string()
        ]));
    }

    #[test]
    fn file_capture_replays_lines_then_ends() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "first line")?;
        writeln!(file, "second line")?;

        let mut source = FileCapture::open(file.path())?;
        assert_eq!(source.next_line()?.as_deref(), Some("first line"));
        assert_eq!(source.next_line()?.as_deref(), Some("second line"));
        assert_eq!(source.next_line()?, None);
        Ok(())
    }

    #[test]
    fn stub_capture_drains_in_order() -> Result<()> {
        let mut source = StubCapture::new(["a", "b"]);
        assert_eq!(source.next_line()?.as_deref(), Some("a"));
        assert_eq!(source.next_line()?.as_deref(), Some("b"));
        assert_eq!(source.next_line()?, None);
        Ok(())
    }
}
