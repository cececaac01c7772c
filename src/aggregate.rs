//! Filter-and-aggregate engine.
//!
//! [`compute`] is a pure function of the dataset and a selection: nothing is
//! cached between calls and nothing is logged, so the same inputs always give
//! the same view and any number of threads may call it on a shared dataset.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::filter::{filtered_records, FilterSelection};
use crate::data::model::{Dataset, Record};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// The four banner values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_users: usize,
    pub adopted_users: usize,
    /// Percentage in `[0, 100]`; `0.0` for an empty subset.
    pub adoption_rate_pct: f64,
    /// Mean uses over adopters; `0.0` when nobody adopted.
    pub avg_uses_among_adopters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAdoption {
    pub device_type: String,
    /// Fraction in `[0, 1]`.
    pub adoption_rate: f64,
}

/// One bar per device type, in order of first appearance.
pub type DeviceAdoptionSeries = Vec<DeviceAdoption>;

/// Raw use counts of adopters, keyed by channel in order of first appearance.
/// Channels without adopters are absent.
pub type ChannelUsageDistribution = IndexMap<String, Vec<u32>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub device_type: String,
    pub channel: String,
    /// Fraction in `[0, 1]`.
    pub adoption_rate: f64,
}

/// One cell per `(device_type, channel)` pair present in the subset.
pub type AdoptionHeatmap = Vec<HeatmapCell>;

/// Everything the dashboard shows for one selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub kpis: KpiSummary,
    pub device_adoption: DeviceAdoptionSeries,
    pub channel_usage: ChannelUsageDistribution,
    pub heatmap: AdoptionHeatmap,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Filter `dataset` by `selection` and derive every dashboard projection.
///
/// Never fails: a selection matching nothing yields zeroed KPIs and empty
/// tables.
pub fn compute(dataset: &Dataset, selection: &FilterSelection) -> DashboardView {
    let subset = filtered_records(dataset, selection);

    DashboardView {
        kpis: kpi_summary(&subset),
        device_adoption: device_adoption(&subset),
        channel_usage: channel_usage(&subset),
        heatmap: adoption_heatmap(&subset),
    }
}

/// Running adopter count for one group.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: usize,
    adopted: usize,
}

impl Tally {
    fn add(&mut self, record: &Record) {
        self.total += 1;
        if record.feature_adopted {
            self.adopted += 1;
        }
    }

    fn rate(self) -> f64 {
        adoption_rate(self.adopted, self.total)
    }
}

/// Fraction of adopters; `0.0` when the group is empty.
#[allow(clippy::cast_precision_loss)]
pub fn adoption_rate(adopted: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    adopted as f64 / total as f64
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = u32>) -> f64 {
    let (sum, count) = values.fold((0u64, 0usize), |(sum, count), v| {
        (sum + u64::from(v), count + 1)
    });
    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64
}

fn kpi_summary(subset: &[&Record]) -> KpiSummary {
    let mut tally = Tally::default();
    for record in subset {
        tally.add(record);
    }

    KpiSummary {
        total_users: tally.total,
        adopted_users: tally.adopted,
        adoption_rate_pct: tally.rate() * 100.0,
        avg_uses_among_adopters: mean(adopters(subset).map(|r| r.feature_used_times)),
    }
}

fn adopters<'a>(subset: &'a [&'a Record]) -> impl Iterator<Item = &'a Record> + 'a {
    subset.iter().copied().filter(|r| r.feature_adopted)
}

/// Group records with an insertion-ordered map so output order follows the
/// subset, never hash order.
fn tally_by<'a, K, F>(subset: &[&'a Record], key: F) -> IndexMap<K, Tally>
where
    K: std::hash::Hash + Eq,
    F: Fn(&'a Record) -> K,
{
    subset.iter().copied().fold(IndexMap::new(), |mut groups, record| {
        groups.entry(key(record)).or_insert_with(Tally::default).add(record);
        groups
    })
}

fn device_adoption(subset: &[&Record]) -> DeviceAdoptionSeries {
    tally_by(subset, |r| r.device_type.as_str())
        .into_iter()
        .map(|(device, tally)| DeviceAdoption {
            device_type: device.to_string(),
            adoption_rate: tally.rate(),
        })
        .collect()
}

fn channel_usage(subset: &[&Record]) -> ChannelUsageDistribution {
    adopters(subset).fold(IndexMap::new(), |mut groups, record| {
        groups
            .entry(record.channel.clone())
            .or_insert_with(Vec::new)
            .push(record.feature_used_times);
        groups
    })
}

fn adoption_heatmap(subset: &[&Record]) -> AdoptionHeatmap {
    tally_by(subset, |r| (r.device_type.as_str(), r.channel.as_str()))
        .into_iter()
        .map(|((device, channel), tally)| HeatmapCell {
            device_type: device.to_string(),
            channel: channel.to_string(),
            adoption_rate: tally.rate(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::data::model::tests::{record, sample_dataset};

    fn only(values: &[&str]) -> Option<BTreeSet<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    fn devices(view: &DashboardView) -> Vec<(&str, f64)> {
        view.device_adoption
            .iter()
            .map(|d| (d.device_type.as_str(), d.adoption_rate))
            .collect()
    }

    fn cells(view: &DashboardView) -> Vec<(&str, &str, f64)> {
        view.heatmap
            .iter()
            .map(|c| (c.device_type.as_str(), c.channel.as_str(), c.adoption_rate))
            .collect()
    }

    #[test]
    fn unfiltered_view_matches_hand_computed_values() {
        let view = compute(&sample_dataset(), &FilterSelection::all());

        assert_eq!(
            view.kpis,
            KpiSummary {
                total_users: 4,
                adopted_users: 3,
                adoption_rate_pct: 75.0,
                avg_uses_among_adopters: 3.0,
            }
        );
        assert_eq!(devices(&view), vec![("mobile", 0.5), ("desktop", 1.0)]);

        let usage: Vec<(&str, &[u32])> = view
            .channel_usage
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        assert_eq!(usage, vec![("email", &[3u32, 5][..]), ("organic", &[1u32][..])]);

        assert_eq!(
            cells(&view),
            vec![
                ("mobile", "email", 1.0),
                ("mobile", "ads", 0.0),
                ("desktop", "email", 1.0),
                ("desktop", "organic", 1.0),
            ]
        );
    }

    #[test]
    fn device_filter_restricts_every_projection() {
        let selection = FilterSelection {
            devices: only(&["mobile"]),
            channels: None,
        };
        let view = compute(&sample_dataset(), &selection);

        assert_eq!(view.kpis.total_users, 2);
        assert_eq!(view.kpis.adopted_users, 1);
        assert_eq!(view.kpis.adoption_rate_pct, 50.0);
        assert_eq!(view.kpis.avg_uses_among_adopters, 3.0);
        assert_eq!(devices(&view), vec![("mobile", 0.5)]);
        assert_eq!(
            cells(&view),
            vec![("mobile", "email", 1.0), ("mobile", "ads", 0.0)]
        );
    }

    #[test]
    fn selection_matching_nothing_yields_zeroes() {
        let selection = FilterSelection {
            devices: only(&["tablet"]),
            channels: None,
        };
        let view = compute(&sample_dataset(), &selection);

        assert_eq!(view.kpis.total_users, 0);
        assert_eq!(view.kpis.adopted_users, 0);
        assert_eq!(view.kpis.adoption_rate_pct, 0.0);
        assert_eq!(view.kpis.avg_uses_among_adopters, 0.0);
        assert!(view.device_adoption.is_empty());
        assert!(view.channel_usage.is_empty());
        assert!(view.heatmap.is_empty());
    }

    #[test]
    fn subset_without_adopters_has_zero_average() {
        let ds = Dataset::from_records(vec![
            record("tablet", "ads", false, 0),
            record("tablet", "ads", false, 9),
        ]);
        let view = compute(&ds, &FilterSelection::all());

        assert_eq!(view.kpis.total_users, 2);
        assert_eq!(view.kpis.adoption_rate_pct, 0.0);
        assert_eq!(view.kpis.avg_uses_among_adopters, 0.0);
        assert!(view.channel_usage.is_empty());
        assert_eq!(cells(&view), vec![("tablet", "ads", 0.0)]);
    }

    #[test]
    fn repeated_calls_are_identical() {
        let ds = sample_dataset();
        let selection = FilterSelection {
            devices: None,
            channels: only(&["email", "organic"]),
        };
        let first = compute(&ds, &selection);
        let second = compute(&ds, &selection);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    /// A dataset large enough to exercise grouping with repeated keys.
    fn mixed_dataset() -> Dataset {
        let devices = ["mobile", "desktop", "tablet"];
        let channels = ["email", "organic", "ads", "referral"];
        let records = (0..60u32)
            .map(|i| {
                record(
                    devices[(i % 3) as usize],
                    channels[((i / 2) % 4) as usize],
                    i % 5 != 0,
                    i % 7,
                )
            })
            .collect();
        Dataset::from_records(records)
    }

    #[test]
    fn aggregate_invariants_hold_for_every_selection() {
        let ds = mixed_dataset();
        let selections = vec![
            FilterSelection::all(),
            FilterSelection::from_lists(vec!["mobile"], Vec::<String>::new()),
            FilterSelection::from_lists(vec!["desktop", "tablet"], vec!["ads"]),
            FilterSelection::from_lists(Vec::<String>::new(), vec!["email", "referral"]),
            FilterSelection::from_lists(vec!["phone"], vec!["email"]),
        ];

        for selection in &selections {
            let subset = filtered_records(&ds, selection);
            let view = compute(&ds, selection);
            let kpis = &view.kpis;

            assert!(subset.len() <= ds.len());
            assert_eq!(kpis.total_users, subset.len());
            assert!(kpis.adopted_users <= kpis.total_users);
            assert!((0.0..=100.0).contains(&kpis.adoption_rate_pct));

            let distributed: usize = view.channel_usage.values().map(Vec::len).sum();
            assert_eq!(distributed, kpis.adopted_users);

            let expected_pairs: HashSet<(&str, &str)> = subset
                .iter()
                .map(|r| (r.device_type.as_str(), r.channel.as_str()))
                .collect();
            let heatmap_pairs: Vec<(&str, &str)> = view
                .heatmap
                .iter()
                .map(|c| (c.device_type.as_str(), c.channel.as_str()))
                .collect();
            assert_eq!(heatmap_pairs.len(), expected_pairs.len());
            assert_eq!(
                heatmap_pairs.iter().copied().collect::<HashSet<_>>(),
                expected_pairs
            );

            for series in &view.device_adoption {
                assert!((0.0..=1.0).contains(&series.adoption_rate));
            }
        }
    }

    #[test]
    fn unrestricted_selection_covers_the_whole_dataset() {
        let ds = mixed_dataset();
        let view = compute(&ds, &FilterSelection::all());
        assert_eq!(view.kpis.total_users, ds.len());
    }

    #[test]
    fn adoption_rate_handles_empty_groups() {
        assert_eq!(adoption_rate(0, 0), 0.0);
        assert_eq!(adoption_rate(1, 4), 0.25);
    }

    #[test]
    fn channel_usage_serializes_in_first_seen_order() {
        let view = compute(&sample_dataset(), &FilterSelection::all());
        let json = serde_json::to_string(&view.channel_usage).unwrap();
        assert_eq!(json, r#"{"email":[3,5],"organic":[1]}"#);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn dataset_and_view_are_send_and_sync() {
        assert_send_sync::<Dataset>();
        assert_send_sync::<DashboardView>();
        assert_send_sync::<FilterSelection>();
    }

    #[test]
    fn concurrent_computes_match_the_single_threaded_view() {
        let ds = Arc::new(mixed_dataset());
        let selections = vec![
            FilterSelection::all(),
            FilterSelection::from_lists(vec!["mobile"], Vec::<String>::new()),
            FilterSelection::from_lists(vec!["desktop", "tablet"], vec!["ads", "email"]),
            FilterSelection::from_lists(Vec::<String>::new(), vec!["referral"]),
        ];
        let expected: Vec<DashboardView> = selections.iter().map(|s| compute(&ds, s)).collect();

        let handles: Vec<_> = selections
            .into_iter()
            .map(|selection| {
                let ds = Arc::clone(&ds);
                thread::spawn(move || compute(&ds, &selection))
            })
            .collect();

        for (handle, expected) in handles.into_iter().zip(&expected) {
            assert_eq!(&handle.join().unwrap(), expected);
        }
    }
}
