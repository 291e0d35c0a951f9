//! File-backed daily quota ledger.
//!
//! One JSON file per channel (`quota-<channel>.json`, shape `{date, count}`).
//! The ledger is loaded once; each committed call is written through so the
//! count survives a crash later in the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Channel, QuotaLimits};
use crate::clock::Clock;
use crate::storage::{read_json_or_default, write_json, StoreError};

/// Calls made on one channel during one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyQuota {
    pub date: Option<NaiveDate>,
    pub count: u32,
}

impl DailyQuota {
    /// Reset the counter if it belongs to a different day.
    ///
    /// Returns true when a reset happened.
    fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.date != Some(today) {
            self.date = Some(today);
            self.count = 0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    quota: DailyQuota,
    /// Calls admitted by `check_and_reserve` but not yet committed or released.
    reserved: u32,
}

/// Shared quota ledger for all channels.
#[derive(Clone)]
pub struct QuotaLedger {
    dir: PathBuf,
    limits: QuotaLimits,
    clock: Arc<dyn Clock>,
    channels: Arc<Mutex<HashMap<Channel, ChannelState>>>,
}

impl QuotaLedger {
    /// Load counters for every channel from `dir`.
    pub fn load(dir: impl Into<PathBuf>, limits: QuotaLimits, clock: Arc<dyn Clock>) -> Self {
        let dir = dir.into();
        let channels = Channel::ALL
            .iter()
            .map(|&channel| {
                let quota: DailyQuota = read_json_or_default(&Self::file_for(&dir, channel));
                (
                    channel,
                    ChannelState {
                        quota,
                        reserved: 0,
                    },
                )
            })
            .collect();

        Self {
            dir,
            limits,
            clock,
            channels: Arc::new(Mutex::new(channels)),
        }
    }

    fn file_for(dir: &Path, channel: Channel) -> PathBuf {
        dir.join(format!("quota-{}.json", channel.as_str()))
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Today's usage for a channel, after applying day rollover.
    pub async fn usage(&self, channel: Channel) -> DailyQuota {
        let today = self.clock.today();
        let mut channels = self.channels.lock().await;
        let state = channels.entry(channel).or_default();
        state.quota.roll_over(today);
        state.quota
    }

    /// Calls still available today for a channel.
    pub async fn remaining(&self, channel: Channel) -> u32 {
        let used = self.usage(channel).await.count;
        self.limits.limit_for(channel).saturating_sub(used)
    }

    /// Admit one call if today's budget allows it.
    ///
    /// The stored counter is reset first when its date is not today, so a
    /// budget exhausted yesterday never blocks today's first call.
    pub async fn check_and_reserve(&self, channel: Channel) -> bool {
        let today = self.clock.today();
        let limit = self.limits.limit_for(channel);
        let mut channels = self.channels.lock().await;
        let state = channels.entry(channel).or_default();

        if state.quota.roll_over(today) {
            info!("{} quota reset for {}", channel, today);
        }

        let in_use = state.quota.count + state.reserved;
        if in_use >= limit {
            warn!(
                "{} daily quota exhausted ({}/{})",
                channel, state.quota.count, limit
            );
            return false;
        }

        state.reserved += 1;
        debug!(
            "{} quota: {}/{} used, reserving one (remaining after: {})",
            channel,
            state.quota.count,
            limit,
            limit - in_use - 1
        );
        true
    }

    /// Count a completed call against today's budget and persist it.
    pub async fn commit(&self, channel: Channel) -> Result<(), StoreError> {
        let today = self.clock.today();
        let mut channels = self.channels.lock().await;
        let state = channels.entry(channel).or_default();

        state.quota.roll_over(today);
        state.quota.count += 1;
        state.reserved = state.reserved.saturating_sub(1);

        info!(
            "{} quota usage: {}/{}",
            channel,
            state.quota.count,
            self.limits.limit_for(channel)
        );
        write_json(&Self::file_for(&self.dir, channel), &state.quota)
    }

    /// Return a reservation whose call did not go through.
    pub async fn release(&self, channel: Channel) {
        let mut channels = self.channels.lock().await;
        let state = channels.entry(channel).or_default();
        state.reserved = state.reserved.saturating_sub(1);
    }
}
