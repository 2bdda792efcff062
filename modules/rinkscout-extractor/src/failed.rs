//! The failure log: one comma-joined line per player whose fetch
//! exhausted its retries, consumed by the retry pass at the end of a
//! run. Format: `id,username,context,timestamp,message` with commas
//! and newlines stripped from the message so the line stays parseable.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct FailedPlayer {
    pub id: String,
    pub username: String,
    pub context: String,
    pub timestamp: String,
    pub message: String,
}

impl FailedPlayer {
    pub fn new(id: &str, username: &str, context: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            context: context.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            message: message.replace(',', ";").replace('\n', " "),
        }
    }

    /// Parse a log line; `None` for lines without at least id and
    /// username.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(5, ',');
        let id = parts.next()?.trim().to_string();
        let username = parts.next()?.trim().to_string();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            username,
            context: parts.next().unwrap_or("").trim().to_string(),
            timestamp: parts.next().unwrap_or("").trim().to_string(),
            message: parts.next().unwrap_or("").trim().to_string(),
        })
    }
}

impl fmt::Display for FailedPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.id, self.username, self.context, self.timestamp, self.message
        )
    }
}

pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one failure. Logged and swallowed on I/O error; losing a
    /// retry candidate must not abort the run.
    pub fn append(&self, entry: &FailedPlayer) {
        let line = format!("{entry}\n");
        let write = || -> std::io::Result<()> {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(line.as_bytes())
        };
        if let Err(e) = write() {
            warn!(path = %self.path.display(), "Failed to record failure: {e}");
        }
    }

    /// All parseable entries currently on disk.
    pub fn load(&self) -> Vec<FailedPlayer> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(FailedPlayer::parse_line)
            .collect()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the log with the entries that still fail; delete it
    /// when everything was resolved.
    pub fn rewrite(&self, survivors: &[FailedPlayer]) -> Result<()> {
        if survivors.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
            }
        } else {
            let body: String = survivors.iter().map(|s| format!("{s}\n")).collect();
            std::fs::write(&self.path, body)
                .with_context(|| format!("rewriting {}", self.path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_round_trip() {
        let entry = FailedPlayer::new("123", "erik-example", "team-visit", "boom, with commas\nand newline");
        assert_eq!(entry.message, "boom; with commas and newline");

        let parsed = FailedPlayer::parse_line(&entry.to_string()).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn short_lines_are_rejected() {
        assert!(FailedPlayer::parse_line("justanid").is_none());
        assert!(FailedPlayer::parse_line(",noid,x,y,z").is_none());
    }

    #[test]
    fn message_commas_do_not_break_the_format() {
        let line = "1,slug,ctx,2026-01-01T00:00:00Z,timeout; after; retries; more";
        let parsed = FailedPlayer::parse_line(line).unwrap();
        assert_eq!(parsed.message, "timeout; after; retries; more");
    }

    #[test]
    fn rewrite_deletes_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("failed.txt"));

        log.append(&FailedPlayer::new("1", "a", "ctx", "err"));
        log.append(&FailedPlayer::new("2", "b", "ctx", "err"));
        assert_eq!(log.load().len(), 2);

        let survivors = vec![log.load()[1].clone()];
        log.rewrite(&survivors).unwrap();
        assert_eq!(log.load().len(), 1);
        assert_eq!(log.load()[0].id, "2");

        log.rewrite(&[]).unwrap();
        assert!(!log.exists());
    }
}
