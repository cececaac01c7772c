use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexSet;
use log::debug;

use crate::aggregate::{compute, DashboardView};
use crate::data::filter::FilterSelection;
use crate::data::model::{CategoricalColumn, Dataset};

// ---------------------------------------------------------------------------
// Dashboard session
// ---------------------------------------------------------------------------

/// The operator's filter state, independent of rendering.
///
/// The dataset is shared and read-only, so many sessions can run over one
/// loaded table. Every selection change recomputes the view.
pub struct DashboardSession {
    dataset: Arc<Dataset>,

    /// Per-dimension filter selections.
    selection: FilterSelection,

    /// View for the current selection.
    view: DashboardView,
}

impl DashboardSession {
    /// Start with no restriction on either dimension.
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let selection = FilterSelection::all();
        let view = compute(&dataset, &selection);
        Self {
            dataset,
            selection,
            view,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    /// Options for the device dropdown.
    pub fn device_options(&self) -> &IndexSet<String> {
        self.dataset.distinct_values(CategoricalColumn::DeviceType)
    }

    /// Options for the channel dropdown.
    pub fn channel_options(&self) -> &IndexSet<String> {
        self.dataset.distinct_values(CategoricalColumn::Channel)
    }

    /// Replace the whole selection.
    pub fn set_selection(&mut self, selection: FilterSelection) {
        self.selection = selection;
        self.refresh();
    }

    /// Toggle a single device type in the device filter.
    pub fn toggle_device(&mut self, value: &str) {
        toggle(&mut self.selection.devices, value);
        self.refresh();
    }

    /// Toggle a single channel in the channel filter.
    pub fn toggle_channel(&mut self, value: &str) {
        toggle(&mut self.selection.channels, value);
        self.refresh();
    }

    /// Drop the device restriction.
    pub fn clear_devices(&mut self) {
        self.selection.devices = None;
        self.refresh();
    }

    /// Drop the channel restriction.
    pub fn clear_channels(&mut self) {
        self.selection.channels = None;
        self.refresh();
    }

    fn refresh(&mut self) {
        self.view = compute(&self.dataset, &self.selection);
        debug!(
            "Selection {:?} matched {} of {} records",
            self.selection,
            self.view.kpis.total_users,
            self.dataset.len()
        );
    }
}

/// Add `value` if absent, remove it if present. An emptied set collapses to
/// `None` so the dimension reads as unrestricted.
fn toggle(selected: &mut Option<BTreeSet<String>>, value: &str) {
    let set = selected.get_or_insert_with(BTreeSet::new);
    if !set.remove(value) {
        set.insert(value.to_string());
    }
    if set.is_empty() {
        *selected = None;
    }
}
