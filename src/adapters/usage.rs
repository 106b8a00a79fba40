//! Usage-reporting side channel.
//!
//! Implements [`UsageReporter`] by writing records to the console with a
//! `USAGE` tag.  Records are buffered until [`UsageReporter::init`] so
//! nothing is reported before the link is up.

use log::{debug, info};

use crate::app::ports::UsageReporter;

/// Records kept before `init`.  Older ones are dropped first.
const BACKLOG: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub event: String,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct LogUsageReporter {
    ready: bool,
    backlog: heapless::Deque<UsageRecord, BACKLOG>,
    sent: u32,
}

impl LogUsageReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Records written so far.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    fn write(&mut self, record: &UsageRecord) {
        self.sent = self.sent.wrapping_add(1);
        info!(
            "USAGE | event='{}' category='{}' message='{}'",
            record.event, record.category, record.message
        );
    }
}

impl UsageReporter for LogUsageReporter {
    fn init(&mut self) {
        if self.ready {
            return;
        }
        self.ready = true;
        debug!("Usage: side channel up, {} buffered record(s)", self.backlog.len());
        while let Some(record) = self.backlog.pop_front() {
            self.write(&record);
        }
    }

    fn send_sync(&mut self, event: &str, category: &str, message: &str) {
        let record = UsageRecord {
            event: event.to_owned(),
            category: category.to_owned(),
            message: message.to_owned(),
        };
        if self.ready {
            self.write(&record);
            return;
        }
        if self.backlog.is_full() {
            let _ = self.backlog.pop_front();
        }
        let _ = self.backlog.push_back(record);
    }
}
