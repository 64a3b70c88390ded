//! Time-indexed wave records and their extrapolation.

use std::time::Duration;

use horde_core::EnemyKind;
use serde::Deserialize;

use crate::tuning::{ConfigError, ExtrapolationTuning};

/// Population target and cadence taking effect at a given survival minute.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WaveRecord {
    /// Survival minute at which the record takes effect.
    pub start_minute: f32,
    /// Population the scheduler tops up to in deficit mode.
    pub min_population: u32,
    /// Interval between steady-state spawn groups.
    pub spawn_interval_ms: u32,
    /// Kinds that may be drawn. Empty means every regular kind.
    #[serde(default)]
    pub eligible_types: Vec<EnemyKind>,
    /// Enables the boss timer while the record is active.
    #[serde(default)]
    pub boss: bool,
}

impl WaveRecord {
    /// Creates a record without the boss flag.
    #[must_use]
    pub fn new(
        start_minute: f32,
        min_population: u32,
        spawn_interval_ms: u32,
        eligible_types: Vec<EnemyKind>,
    ) -> Self {
        Self {
            start_minute,
            min_population,
            spawn_interval_ms,
            eligible_types,
            boss: false,
        }
    }

    /// Enables the boss timer for this record.
    #[must_use]
    pub fn with_boss(mut self) -> Self {
        self.boss = true;
        self
    }
}

/// Parameters resolved for the current survival time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveWave {
    /// Position of the governing record in the table.
    pub index: usize,
    /// Population target, extrapolated past the last record.
    pub min_population: usize,
    /// Steady-state interval, extrapolated past the last record.
    pub spawn_interval: Duration,
    /// Whether the boss timer runs.
    pub boss: bool,
}

/// Validated, sorted wave table.
#[derive(Clone, Debug)]
pub struct WaveTable {
    records: Vec<WaveRecord>,
    extrapolation: ExtrapolationTuning,
}

impl WaveTable {
    /// Validates the records and builds the table.
    pub fn new(
        records: Vec<WaveRecord>,
        extrapolation: ExtrapolationTuning,
    ) -> Result<Self, ConfigError> {
        if records.is_empty() {
            return Err(ConfigError::EmptyWaveTable);
        }
        for (index, record) in records.iter().enumerate() {
            if !record.start_minute.is_finite() || record.start_minute < 0.0 {
                return Err(ConfigError::InvalidStartMinute { index });
            }
            if record.spawn_interval_ms == 0 {
                return Err(ConfigError::ZeroSpawnInterval { index });
            }
        }
        if let Some(index) = records
            .windows(2)
            .position(|pair| pair[1].start_minute < pair[0].start_minute)
        {
            return Err(ConfigError::UnsortedWaves {
                index: index + 1,
                start_minute: records[index + 1].start_minute,
                previous: records[index].start_minute,
            });
        }
        Ok(Self {
            records,
            extrapolation,
        })
    }

    /// Record at the provided position.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<&WaveRecord> {
        self.records.get(index)
    }

    /// Number of records in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; validation rejects empty tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolves the parameters governing the provided survival time.
    ///
    /// Times before the first record use the first record. Past the last
    /// record, population grows and the interval shrinks per whole minute.
    #[must_use]
    pub fn resolve(&self, survival: Duration) -> ActiveWave {
        let minutes = survival.as_secs_f32() / 60.0;
        let index = self
            .records
            .partition_point(|record| record.start_minute <= minutes)
            .saturating_sub(1);
        let record = &self.records[index];

        let mut min_population = record.min_population;
        let mut interval_ms = record.spawn_interval_ms;

        if index + 1 == self.records.len() {
            let extra = (minutes - record.start_minute).max(0.0).floor() as u32;
            let tuning = &self.extrapolation;
            let cap = tuning.population_cap.max(record.min_population);
            min_population = record
                .min_population
                .saturating_add(extra.saturating_mul(tuning.population_growth_per_minute))
                .min(cap);
            let floor = tuning.interval_floor_ms.clamp(1, record.spawn_interval_ms);
            interval_ms = record
                .spawn_interval_ms
                .saturating_sub(extra.saturating_mul(tuning.interval_step_ms))
                .max(floor);
        }

        ActiveWave {
            index,
            min_population: min_population as usize,
            spawn_interval: Duration::from_millis(u64::from(interval_ms)),
            boss: record.boss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> WaveTable {
        WaveTable::new(
            vec![
                WaveRecord::new(0.0, 10, 1_000, Vec::new()),
                WaveRecord::new(2.0, 40, 600, Vec::new()).with_boss(),
            ],
            ExtrapolationTuning {
                population_growth_per_minute: 15,
                population_cap: 80,
                interval_step_ms: 100,
                interval_floor_ms: 250,
            },
        )
        .expect("valid table")
    }

    fn at_minutes(minutes: f32) -> Duration {
        Duration::from_secs_f32(minutes * 60.0)
    }

    #[test]
    fn picks_latest_started_record() {
        let table = table();
        let early = table.resolve(at_minutes(1.5));
        assert_eq!(early.index, 0);
        assert_eq!(early.min_population, 10);
        assert!(!early.boss);

        let later = table.resolve(at_minutes(2.5));
        assert_eq!(later.index, 1);
        assert_eq!(later.min_population, 40);
        assert_eq!(later.spawn_interval, Duration::from_millis(600));
        assert!(later.boss);
    }

    #[test]
    fn extrapolates_past_last_record() {
        let table = table();
        let wave = table.resolve(at_minutes(4.2));
        assert_eq!(wave.min_population, 70);
        assert_eq!(wave.spawn_interval, Duration::from_millis(400));

        let capped = table.resolve(at_minutes(60.0));
        assert_eq!(capped.min_population, 80);
        assert_eq!(capped.spawn_interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_empty_and_unsorted_tables() {
        assert!(matches!(
            WaveTable::new(Vec::new(), ExtrapolationTuning::default()),
            Err(ConfigError::EmptyWaveTable)
        ));
        let unsorted = vec![
            WaveRecord::new(3.0, 10, 500, Vec::new()),
            WaveRecord::new(1.0, 20, 500, Vec::new()),
        ];
        assert!(matches!(
            WaveTable::new(unsorted, ExtrapolationTuning::default()),
            Err(ConfigError::UnsortedWaves { index: 1, .. })
        ));
    }

    #[test]
    fn rejects_zero_interval() {
        let records = vec![WaveRecord::new(0.0, 10, 0, Vec::new())];
        assert!(matches!(
            WaveTable::new(records, ExtrapolationTuning::default()),
            Err(ConfigError::ZeroSpawnInterval { index: 0 })
        ));
    }
}
