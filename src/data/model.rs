use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Record – one row of the adoption dataset
// ---------------------------------------------------------------------------

/// A single user's feature-adoption event (one row of the source table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Device category, e.g. `mobile`, `desktop`, `tablet`.
    pub device_type: String,
    /// Acquisition channel, e.g. `email`, `organic`, `ads`.
    pub channel: String,
    pub signup_date: NaiveDate,
    /// Whether the user adopted the feature (`1` in the source).
    pub feature_adopted: bool,
    /// Number of uses. Only meaningful for adopters.
    pub feature_used_times: u32,
}

// ---------------------------------------------------------------------------
// CategoricalColumn – the columns a filter can be built from
// ---------------------------------------------------------------------------

/// A categorical column whose distinct values populate filter options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoricalColumn {
    DeviceType,
    Channel,
}

impl CategoricalColumn {
    pub const ALL: [CategoricalColumn; 2] =
        [CategoricalColumn::DeviceType, CategoricalColumn::Channel];

    /// Column name as it appears in the source table.
    pub fn name(self) -> &'static str {
        match self {
            CategoricalColumn::DeviceType => "device_type",
            CategoricalColumn::Channel => "channel",
        }
    }

    fn value_of(self, record: &Record) -> &str {
        match self {
            CategoricalColumn::DeviceType => &record.device_type,
            CategoricalColumn::Channel => &record.channel,
        }
    }
}

impl fmt::Display for CategoricalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CategoricalColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device_type" => Ok(CategoricalColumn::DeviceType),
            "channel" => Ok(CategoricalColumn::Channel),
            other => Err(format!("'{other}' is not a categorical column")),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// The full parsed dataset with pre-computed category indices.
///
/// Immutable after construction; share it behind an `Arc` when several
/// sessions read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    device_types: IndexSet<String>,
    channels: IndexSet<String>,
}

impl Dataset {
    /// Build category indices from the loaded records.
    pub fn from_records(records: Vec<Record>) -> Self {
        let device_types = distinct_in_order(&records, CategoricalColumn::DeviceType);
        let channels = distinct_in_order(&records, CategoricalColumn::Channel);
        Dataset {
            records,
            device_types,
            channels,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Unique values of `column`, in first-seen order.
    pub fn distinct_values(&self, column: CategoricalColumn) -> &IndexSet<String> {
        match column {
            CategoricalColumn::DeviceType => &self.device_types,
            CategoricalColumn::Channel => &self.channels,
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn distinct_in_order(records: &[Record], column: CategoricalColumn) -> IndexSet<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    for record in records {
        let value = column.value_of(record);
        if !seen.contains(value) {
            seen.insert(value.to_string());
        }
    }
    seen
}
