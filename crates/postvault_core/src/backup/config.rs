//! Backup policy configuration.
//!
//! Persisted inside the backup index, so a store carries its own policy.
//! All fields have serde defaults; a config written by an older version
//! deserializes cleanly.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use super::PeriodKind;

/// Policy knobs for the backup engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Whether diff-only incremental snapshots are captured on save
    #[serde(default = "default_incrementals_enabled")]
    pub incrementals_enabled: bool,

    /// Maximum number of incremental records retained (oldest pruned first)
    #[serde(default = "default_max_incrementals")]
    pub max_incrementals: usize,

    /// How many days a daily generation is retained
    #[serde(default = "default_daily_retention_days")]
    pub daily_retention_days: i64,

    /// How many weeks a weekly generation is retained
    #[serde(default = "default_weekly_retention_weeks")]
    pub weekly_retention_weeks: i64,

    /// How many months a monthly generation is retained
    #[serde(default = "default_monthly_retention_months")]
    pub monthly_retention_months: u32,

    /// Write attempts for snapshot blobs before giving up
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

fn default_incrementals_enabled() -> bool {
    true
}

fn default_max_incrementals() -> usize {
    50
}

fn default_daily_retention_days() -> i64 {
    7
}

fn default_weekly_retention_weeks() -> i64 {
    4
}

fn default_monthly_retention_months() -> u32 {
    12
}

fn default_write_attempts() -> u32 {
    3
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            incrementals_enabled: default_incrementals_enabled(),
            max_incrementals: default_max_incrementals(),
            daily_retention_days: default_daily_retention_days(),
            weekly_retention_weeks: default_weekly_retention_weeks(),
            monthly_retention_months: default_monthly_retention_months(),
            write_attempts: default_write_attempts(),
        }
    }
}

impl BackupConfig {
    /// Records of `kind` created before this instant are past retention.
    pub fn retention_cutoff(&self, kind: PeriodKind, now: DateTime<Utc>) -> DateTime<Utc> {
        match kind {
            PeriodKind::Daily => now - Duration::days(self.daily_retention_days),
            PeriodKind::Weekly => now - Duration::weeks(self.weekly_retention_weeks),
            PeriodKind::Monthly => now
                .checked_sub_months(Months::new(self.monthly_retention_months))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: BackupConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BackupConfig::default());
        assert!(config.incrementals_enabled);
        assert_eq!(config.max_incrementals, 50);
    }

    #[test]
    fn test_retention_cutoffs() {
        let now: DateTime<Utc> = "2026-03-15T00:00:00Z".parse().unwrap();
        let config = BackupConfig::default();

        let daily = config.retention_cutoff(PeriodKind::Daily, now);
        assert_eq!(daily, "2026-03-08T00:00:00Z".parse::<DateTime<Utc>>().unwrap());

        let weekly = config.retention_cutoff(PeriodKind::Weekly, now);
        assert_eq!(weekly, "2026-02-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap());

        let monthly = config.retention_cutoff(PeriodKind::Monthly, now);
        assert_eq!(monthly, "2025-03-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
