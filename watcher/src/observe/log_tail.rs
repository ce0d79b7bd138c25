//! Tail of the selected log stream

use serde::Serialize;

use crate::models::pipeline::LogLine;
use crate::models::status::Status;

/// Log stream that can be tailed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum LogTarget {
    Job(i64),
    Deployment,
}

/// One log read, stamped with the owner status known when it was issued
///
/// Logs only count as final when the owner was already terminal before the
/// read went out. A read that races the owner's completion may miss the
/// last lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSnapshot {
    pub owner_status: Option<Status>,
    pub lines: Vec<LogLine>,
}

/// Lines of the currently selected log stream
///
/// The backend always returns a stream's complete content, so every update
/// replaces the lines wholesale. Each reset starts a new generation and
/// updates stamped with an older generation are ignored, which keeps a
/// previous target's lines from reappearing after a switch.
#[derive(Debug, Clone)]
pub struct LogTail {
    target: Option<LogTarget>,
    lines: Vec<String>,
    generation: u64,
    loaded: bool,
    follow: bool,
    scroll_revision: u64,
}

impl LogTail {
    pub fn new() -> Self {
        Self {
            target: None,
            lines: Vec::new(),
            generation: 0,
            loaded: false,
            follow: true,
            scroll_revision: 0,
        }
    }

    /// Switch to a new target, clearing the lines. Returns the new generation.
    pub fn reset(&mut self, target: Option<LogTarget>) -> u64 {
        self.target = target;
        self.lines.clear();
        self.loaded = false;
        self.generation += 1;
        self.generation
    }

    /// Replace the lines with a freshly fetched stream
    ///
    /// Returns false when the update belongs to an older generation.
    pub fn replace(&mut self, generation: u64, lines: &[LogLine]) -> bool {
        if generation != self.generation || self.target.is_none() {
            return false;
        }

        let previous_len = self.lines.len();
        self.lines = lines.iter().map(|line| line.content.clone()).collect();
        self.loaded = true;

        if self.follow && self.lines.len() != previous_len {
            self.scroll_revision += 1;
        }
        true
    }

    /// Toggle auto-follow. Re-enabling it jumps back to the tail.
    pub fn set_follow(&mut self, follow: bool) {
        if follow && !self.follow {
            self.scroll_revision += 1;
        }
        self.follow = follow;
    }

    pub fn target(&self) -> Option<LogTarget> {
        self.target
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the current target has been fetched at least once
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Bumped whenever the presentation should scroll to the last line
    pub fn scroll_revision(&self) -> u64 {
        self.scroll_revision
    }

    /// Lines with their 1-based display numbers
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| (i + 1, line.as_str()))
    }

    /// The last `n` lines
    pub fn tail(&self, n: usize) -> &[String] {
        let start = self.lines.len().saturating_sub(n);
        &self.lines[start..]
    }
}

impl Default for LogTail {
    fn default() -> Self {
        Self::new()
    }
}
