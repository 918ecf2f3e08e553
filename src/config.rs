//! Engine-wide configuration (§2.1 ambient stack). No external config-file
//! format is introduced — the teacher has none, so this stays a plain
//! struct built programmatically by whoever embeds the kernel.

use std::path::PathBuf;
use std::time::Duration;

use crate::buffer::ReplacerPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        if cfg!(feature = "read_uncommitted") {
            IsolationLevel::ReadUncommitted
        } else if cfg!(feature = "repeatable_read") {
            IsolationLevel::RepeatableRead
        } else if cfg!(feature = "serializable") {
            IsolationLevel::Serializable
        } else {
            IsolationLevel::ReadCommitted
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub db_path: PathBuf,
    pub buffer_pool_frames: usize,
    pub replacer_policy: ReplacerPolicy,
    pub isolation_level: IsolationLevel,
    pub cycle_detection_interval: Duration,
}

impl EngineOptions {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            buffer_pool_frames: 256,
            replacer_policy: ReplacerPolicy::Clock,
            isolation_level: IsolationLevel::default(),
            cycle_detection_interval: Duration::from_millis(100),
        }
    }

    pub fn with_buffer_pool_frames(mut self, frames: usize) -> Self {
        self.buffer_pool_frames = frames;
        self
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn with_cycle_detection_interval(mut self, interval: Duration) -> Self {
        self.cycle_detection_interval = interval;
        self
    }
}
