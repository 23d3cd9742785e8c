//! Render log entries for the terminal

use std::io::{self, Write};
use std::sync::Mutex;

use colored::Colorize;

use crate::errors::CliError;
use crate::logstream::aggregator::LogSink;
use crate::logstream::LogEntry;

/// Writes one line per log entry
pub struct LogPresenter {
    pub json: bool,
    pub color: bool,
    pub hide_instance: bool,
    pub hide_region: bool,
    pub remove_newlines: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl LogPresenter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            json: false,
            color: true,
            hide_instance: false,
            hide_region: false,
            remove_newlines: false,
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Format an entry without writing it
    pub fn format(&self, entry: &LogEntry) -> Result<String, CliError> {
        if self.json {
            return Ok(serde_json::to_string(entry)?);
        }

        let mut line = String::new();
        line.push_str(&entry.timestamp);

        if !self.hide_instance {
            line.push(' ');
            line.push_str(&self.paint_instance(&entry.instance));
        }

        if !self.hide_region {
            line.push(' ');
            line.push_str(&entry.region);
        }

        line.push_str(" [");
        line.push_str(&self.paint_level(&entry.level));
        line.push_str("] ");

        if self.remove_newlines {
            line.push_str(&entry.message.replace(['\r', '\n'], " "));
        } else {
            line.push_str(entry.message.trim_end_matches(['\r', '\n']));
        }

        Ok(line)
    }

    fn paint_instance(&self, instance: &str) -> String {
        if self.color {
            instance.cyan().to_string()
        } else {
            instance.to_string()
        }
    }

    fn paint_level(&self, level: &str) -> String {
        if !self.color {
            return level.to_string();
        }
        match level.to_ascii_lowercase().as_str() {
            "error" | "fatal" => level.red().to_string(),
            "warn" | "warning" => level.yellow().to_string(),
            "info" => level.blue().to_string(),
            _ => level.dimmed().to_string(),
        }
    }
}

impl LogSink for LogPresenter {
    fn write(&self, entry: &LogEntry) -> Result<(), CliError> {
        let line = self.format(entry)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| CliError::Internal("log output poisoned".to_string()))?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}
