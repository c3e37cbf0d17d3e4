//! Calendar periods and the read-only catalog that provides them.
//!
//! Periods are generated by an external job and are immutable at runtime. The catalog is
//! injected wherever periods are needed so that tests can use synthetic calendars.

use crate::error::Res;
use crate::utils;
use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// The calendar unit that a budget amount is denominated against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Weekly,
    #[default]
    Monthly,
    #[value(name = "half_month")]
    HalfMonth,
}

serde_plain::derive_display_from_serialize!(Granularity);
serde_plain::derive_fromstr_from_deserialize!(Granularity);

/// Which half of a month a day falls in. The first half is always days 1-15.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    First,
    Second,
}

/// The last day of the first half of every month.
pub const FIRST_HALF_DAYS: u32 = 15;

impl Half {
    pub fn of(date: NaiveDate) -> Self {
        if date.day() <= FIRST_HALF_DAYS {
            Half::First
        } else {
            Half::Second
        }
    }

    /// Parses the 1-based `half_index` carried by half-month periods.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Half::First),
            2 => Some(Half::Second),
            _ => None,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            Half::First => 1,
            Half::Second => 2,
        }
    }

    /// The number of days in this half of the month containing `date`: 15 for the first half,
    /// 13 to 16 for the second.
    pub fn days(&self, date: NaiveDate) -> u32 {
        match self {
            Half::First => FIRST_HALF_DAYS,
            Half::Second => days_in_month(date) - FIRST_HALF_DAYS,
        }
    }
}

/// The number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    u32::from(date.num_days_in_month())
}

/// The inclusive number of days from `start` to `end`. Zero if `end` precedes `start`.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    ((end - start).num_days() + 1).max(0)
}

/// One immutable period from the calendar catalog. `start` and `end` are both inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CalendarPeriod {
    pub id: String,
    pub granularity: Granularity,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub half_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_number: Option<u32>,
}

impl CalendarPeriod {
    pub fn new(
        id: impl Into<String>,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            granularity,
            start,
            end,
            year: start.year(),
            half_index: None,
            week_number: None,
        }
    }

    /// Inclusive day count.
    pub fn day_count(&self) -> i64 {
        inclusive_days(self.start, self.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// True if the period shares at least one day with `from..=to`.
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start <= to && from <= self.end
    }

    /// The half this period was generated for, if it is a half-month period.
    pub fn half(&self) -> Option<Half> {
        self.half_index.and_then(Half::from_index)
    }

    /// Iterates every day of the period.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        std::iter::successors(Some(self.start), |d| d.succ_opt()).take_while(move |d| *d <= end)
    }
}

/// A read-only provider of calendar periods.
pub trait CalendarCatalog: Send + Sync {
    /// All periods of `granularity` overlapping `from..=to`, ordered by start date.
    fn periods(&self, granularity: Granularity, from: NaiveDate, to: NaiveDate)
        -> Vec<CalendarPeriod>;

    /// Look up a period by id.
    fn period(&self, id: &str) -> Option<CalendarPeriod>;

    /// The period of `granularity` containing `date`.
    fn period_containing(&self, granularity: Granularity, date: NaiveDate)
        -> Option<CalendarPeriod>;
}

/// A `CalendarCatalog` held in memory, validated on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryCatalog {
    by_granularity: BTreeMap<Granularity, Vec<CalendarPeriod>>,
}

impl InMemoryCatalog {
    /// Builds a catalog, checking that per granularity every period has `end >= start`, that no
    /// periods overlap and that periods of the same year are contiguous.
    pub fn new(periods: impl IntoIterator<Item = CalendarPeriod>) -> Res<Self> {
        let mut ids = BTreeSet::new();
        let mut by_granularity: BTreeMap<Granularity, Vec<CalendarPeriod>> = BTreeMap::new();
        for period in periods {
            if period.end < period.start {
                bail!(
                    "Calendar period '{}' ends ({}) before it starts ({})",
                    period.id,
                    period.end,
                    period.start
                );
            }
            if !ids.insert(period.id.clone()) {
                bail!("Duplicate calendar period id '{}'", period.id);
            }
            by_granularity
                .entry(period.granularity)
                .or_default()
                .push(period);
        }

        for (granularity, list) in by_granularity.iter_mut() {
            list.sort_by_key(|p| p.start);
            for pair in list.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                if next.start <= prev.end {
                    bail!(
                        "Calendar periods '{}' and '{}' ({granularity}) overlap",
                        prev.id,
                        next.id
                    );
                }
                if prev.year == next.year && prev.end.succ_opt() != Some(next.start) {
                    bail!(
                        "Calendar periods '{}' and '{}' ({granularity}) leave a gap within {}",
                        prev.id,
                        next.id,
                        prev.year
                    );
                }
            }
        }

        Ok(Self { by_granularity })
    }

    /// Parses a catalog from CSV with the header
    /// `id,granularity,start,end,year,half_index,week_number`.
    pub fn from_csv(csv_data: &str) -> Res<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(Cursor::new(csv_data.as_bytes()));

        let mut periods = Vec::new();
        for (ix, result) in rdr.deserialize().enumerate() {
            let period: CalendarPeriod =
                result.with_context(|| format!("Unable to parse calendar row {}", ix + 2))?;
            periods.push(period);
        }
        Self::new(periods)
    }

    /// Loads a CSV catalog file.
    pub async fn load(path: &Path) -> Res<Self> {
        let content = utils::read(path).await?;
        let catalog = Self::from_csv(&content)
            .with_context(|| format!("Invalid calendar catalog at {}", path.display()))?;
        debug!(
            "Loaded {} calendar periods from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.by_granularity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CalendarCatalog for InMemoryCatalog {
    fn periods(
        &self,
        granularity: Granularity,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<CalendarPeriod> {
        self.by_granularity
            .get(&granularity)
            .map(|list| {
                list.iter()
                    .filter(|p| p.overlaps(from, to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn period(&self, id: &str) -> Option<CalendarPeriod> {
        self.by_granularity
            .values()
            .flat_map(|list| list.iter())
            .find(|p| p.id == id)
            .cloned()
    }

    fn period_containing(
        &self,
        granularity: Granularity,
        date: NaiveDate,
    ) -> Option<CalendarPeriod> {
        let list = self.by_granularity.get(&granularity)?;
        // Periods are sorted and non-overlapping, so the candidate is the last one starting on
        // or before `date`.
        let ix = list.partition_point(|p| p.start <= date);
        list.get(ix.checked_sub(1)?)
            .filter(|p| p.contains(date))
            .cloned()
    }
}
