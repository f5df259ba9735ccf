/// Run log for spectrum-image analyses
///
/// Each stack operation appends one step: what ran, on which channels, and
/// the `spim` command that repeats it. A log belongs to one input stack and
/// carries its geometry and calibration, so a saved log alone says what
/// data the steps were applied to.
///
/// Steps added by an operation that later fails are rolled back to a
/// checkpoint taken before it started.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use crate::data::SpectrumStack;

/// One recorded operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based position in the run.
    pub step: usize,
    pub timestamp: DateTime<Local>,
    pub operation: String,
    pub description: String,
    /// `spim` invocation repeating this step; `#`-prefixed when there is none.
    pub command: String,
}

impl LogEntry {
    fn has_command(&self) -> bool {
        !self.command.is_empty() && !self.command.starts_with('#')
    }
}

/// Geometry and calibration of the stack a log refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackInfo {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub offset: f64,
    pub scale: f64,
    pub unit: String,
}

impl StackInfo {
    pub fn of(stack: &SpectrumStack) -> Self {
        let axis = stack.axis();
        Self {
            width: stack.width(),
            height: stack.height(),
            channels: stack.channels(),
            offset: axis.offset,
            scale: axis.scale,
            unit: axis.unit.clone(),
        }
    }

    /// e.g. `32 x 32 px, 256 ch, 250.000..377.500 eV (0.5000 eV/ch)`
    pub fn summary(&self) -> String {
        let last = self.offset + self.scale * self.channels.saturating_sub(1) as f64;
        format!(
            "{} x {} px, {} ch, {:.3}..{:.3} {} ({:.4} {}/ch)",
            self.width,
            self.height,
            self.channels,
            self.offset,
            last,
            self.unit,
            self.scale,
            self.unit
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproLog {
    pub session_id: String,
    pub session_start: DateTime<Local>,
    pub source_file: String,
    #[serde(default)]
    pub stack: Option<StackInfo>,
    pub version: String,
    pub entries: Vec<LogEntry>,
}

impl ReproLog {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            session_start: Local::now(),
            source_file: String::new(),
            stack: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            entries: Vec::new(),
        }
    }

    pub fn set_source(&mut self, source: &str) {
        self.source_file = source.to_string();
    }

    pub fn describe_stack(&mut self, stack: &SpectrumStack) {
        self.stack = Some(StackInfo::of(stack));
    }

    pub fn add_entry(&mut self, operation: &str, description: &str, command: &str) {
        let step = self.entries.len() + 1;
        self.entries.push(LogEntry {
            step,
            timestamp: Local::now(),
            operation: operation.to_string(),
            description: description.to_string(),
            command: command.to_string(),
        });
        log::info!("step {}: {}: {}", step, operation, description);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position to roll back to if the next operation fails.
    pub fn checkpoint(&self) -> usize {
        self.entries.len()
    }

    /// Drop every step recorded after `mark`.
    pub fn rollback(&mut self, mark: usize) {
        if mark < self.entries.len() {
            for e in &self.entries[mark..] {
                log::debug!("discarding step {} ({})", e.step, e.operation);
            }
            self.entries.truncate(mark);
        }
    }

    fn stack_line(&self) -> String {
        self.stack
            .as_ref()
            .map(StackInfo::summary)
            .unwrap_or_else(|| "unknown geometry".to_string())
    }

    /// Plain-text run summary, one block per step.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "spim {} run {}", self.version, self.session_id);
        let _ = writeln!(
            out,
            "started {}",
            self.session_start.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "input   {}", self.source_file);
        let _ = writeln!(out, "stack   {}", self.stack_line());
        out.push('\n');

        for e in &self.entries {
            let _ = writeln!(
                out,
                "{:>3}. {} [{}]",
                e.step,
                e.operation,
                e.timestamp.format("%H:%M:%S")
            );
            let _ = writeln!(out, "     {}", e.description);
            if e.has_command() {
                let _ = writeln!(out, "     $ {}", e.command);
            }
        }

        let elapsed = self
            .entries
            .last()
            .map(|e| (e.timestamp - self.session_start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let _ = writeln!(out, "\n{} step(s) in {:.1} s", self.entries.len(), elapsed);
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Bash script repeating every step that has a command.
    pub fn to_shell_script(&self) -> String {
        let mut out = String::from("#!/usr/bin/env bash\n");
        let _ = writeln!(out, "# Replays spim run {}", self.session_id);
        let _ = writeln!(out, "# input: {} ({})", self.source_file, self.stack_line());
        out.push_str("set -euo pipefail\n");

        for e in &self.entries {
            let _ = writeln!(out, "\n# {}. {}: {}", e.step, e.operation, e.description);
            if e.has_command() {
                let _ = writeln!(out, "{}", e.command);
            }
        }
        out
    }

    pub fn save_text(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_text())
    }

    pub fn save_json(&self, path: &Path) -> io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Write the replay script and mark it executable.
    pub fn save_script(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_shell_script())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

impl Default for ReproLog {
    fn default() -> Self {
        Self::new()
    }
}
