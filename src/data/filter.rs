use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{Dataset, Record};

// ---------------------------------------------------------------------------
// Filter selection: which categories are selected per dimension
// ---------------------------------------------------------------------------

/// Selected device types and channels.
///
/// `None` means "no restriction on this dimension". An empty set is treated
/// the same way: clearing every value in a dropdown shows everything again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub devices: Option<BTreeSet<String>>,
    pub channels: Option<BTreeSet<String>>,
}

impl FilterSelection {
    /// A selection that lets every record through.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a selection from raw value lists, e.g. repeated CLI flags.
    pub fn from_lists<D, C>(devices: D, channels: C) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            devices: non_empty(devices.into_iter().map(Into::into).collect()),
            channels: non_empty(channels.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `record` passes both dimension filters.
    pub fn matches(&self, record: &Record) -> bool {
        passes(self.devices.as_ref(), &record.device_type)
            && passes(self.channels.as_ref(), &record.channel)
    }

    /// Whether the selection restricts nothing.
    pub fn is_unrestricted(&self) -> bool {
        is_open(self.devices.as_ref()) && is_open(self.channels.as_ref())
    }
}

fn non_empty(values: BTreeSet<String>) -> Option<BTreeSet<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn is_open(selected: Option<&BTreeSet<String>>) -> bool {
    selected.map_or(true, BTreeSet::is_empty)
}

fn passes(selected: Option<&BTreeSet<String>>, value: &str) -> bool {
    match selected {
        Some(set) if !set.is_empty() => set.contains(value),
        _ => true,
    }
}

/// Records that pass `selection`, in dataset order.
pub fn filtered_records<'a>(dataset: &'a Dataset, selection: &FilterSelection) -> Vec<&'a Record> {
    dataset
        .records()
        .iter()
        .filter(|record| selection.matches(record))
        .collect()
}
