//! In-process channel source and attempt log.

use crate::dispatcher::{AttemptLog, ChannelSource};
use async_trait::async_trait;
use opsmon_common::types::{NotificationAttempt, NotificationChannelConfig};
use std::sync::Mutex;

#[derive(Default)]
pub struct StaticChannelSource {
    channels: Vec<NotificationChannelConfig>,
}

impl StaticChannelSource {
    pub fn new(channels: Vec<NotificationChannelConfig>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl ChannelSource for StaticChannelSource {
    async fn list_channels(&self, tenant_id: &str) -> anyhow::Result<Vec<NotificationChannelConfig>> {
        Ok(self
            .channels
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryAttemptLog {
    attempts: Mutex<Vec<NotificationAttempt>>,
}

impl MemoryAttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<NotificationAttempt> {
        self.attempts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl AttemptLog for MemoryAttemptLog {
    async fn record_attempt(&self, attempt: &NotificationAttempt) -> anyhow::Result<()> {
        self.attempts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(attempt.clone());
        Ok(())
    }
}
