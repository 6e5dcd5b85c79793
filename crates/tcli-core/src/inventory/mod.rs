//! Device inventory and target filtering.
//!
//! The inventory loads a [`DeviceTable`] from a [`DeviceSource`] on a
//! background thread and derives the current target list from a set of
//! filters:
//!
//! - `targets` / `xtargets` match device names.
//! - one inclusion and one exclusion (`x` prefixed) filter per attribute.
//!
//! Filter values are comma separated. An entry starting with `^` is a case
//! insensitive regular expression anchored at both ends; anything else is a
//! literal, compared case insensitively. A device is a target when it
//! matches every non-empty inclusion and no non-empty exclusion. An empty
//! `targets` filter matches nothing.

pub mod csv;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use regex::{Regex, RegexBuilder};
use tracing::{debug, error};

use crate::error::InventoryError;
use crate::signal::Signal;
use crate::types::{Mode, Request, Uid};

pub use self::csv::CsvSource;

/// Default ceiling on the number of targets.
pub const DEFAULT_MAXTARGETS: usize = 50;

/// Name of the device-name inclusion filter.
pub const TARGETS: &str = "targets";

/// Name of the device-name exclusion filter.
pub const XTARGETS: &str = "xtargets";

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// One device and its attribute values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    /// Attribute name to values. Most attributes hold one value; list
    /// columns such as `flags` may hold several.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Device {
    /// Values of `attribute`, if the device has it.
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }
}

/// Every device known to a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    /// Attribute names, in source order.
    pub attributes: Vec<String>,
    /// Devices keyed by name.
    pub devices: BTreeMap<String, Device>,
}

/// Where device data comes from.
pub trait DeviceSource: Send + Sync {
    /// Short identifier of the source, e.g. `csv`.
    fn name(&self) -> &str;

    /// Fetches every device. Called on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an [`InventoryError`] when the data cannot be read or parsed.
    fn fetch(&self) -> Result<DeviceTable, InventoryError>;
}

/// A parsed filter value.
#[derive(Debug, Clone, Default)]
struct Filter {
    text: String,
    literals: Vec<String>,
    patterns: Vec<Regex>,
}

impl Filter {
    fn parse(text: &str) -> Result<Self, InventoryError> {
        if text.is_empty() || text == "^" {
            return Ok(Self::default());
        }

        let mut filter = Self {
            text: text.to_string(),
            ..Self::default()
        };
        for item in text.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            if item.starts_with('^') {
                let anchored = if item.ends_with('$') {
                    item.to_string()
                } else {
                    format!("{item}$")
                };
                let pattern = RegexBuilder::new(&anchored)
                    .case_insensitive(true)
                    .build()
                    .map_err(|_| InventoryError::InvalidFilter(anchored.clone()))?;
                filter.patterns.push(pattern);
            } else {
                filter.literals.push(item.to_lowercase());
            }
        }
        Ok(filter)
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn matches(&self, value: &str) -> bool {
        let lower = value.to_lowercase();
        self.literals.iter().any(|literal| *literal == lower)
            || self.patterns.iter().any(|pattern| pattern.is_match(value))
    }

    fn matches_any(&self, values: &[String]) -> bool {
        values.iter().any(|value| self.matches(value))
    }
}

#[derive(Debug)]
struct FilterState {
    filters: BTreeMap<String, Filter>,
    exclusions: BTreeMap<String, Filter>,
    maxtargets: usize,
    device_list: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct Loaded {
    table: RwLock<Option<Result<Arc<DeviceTable>, String>>>,
    ready: Signal,
}

/// Device inventory with target filters.
pub struct Inventory {
    source: Arc<dyn DeviceSource>,
    loaded: Arc<Loaded>,
    load_lock: Mutex<()>,
    state: Mutex<FilterState>,
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("source", &self.source.name())
            .field("ready", &self.loaded.ready.is_set())
            .finish_non_exhaustive()
    }
}

impl Inventory {
    /// Inventory over `source`. Nothing is loaded until [`Inventory::load`].
    pub fn new(source: impl DeviceSource + 'static) -> Self {
        let loaded = Loaded::default();
        // No load pending yet, so readers must not block.
        loaded.ready.set();
        Self {
            source: Arc::new(source),
            loaded: Arc::new(loaded),
            load_lock: Mutex::new(()),
            state: Mutex::new(FilterState {
                filters: BTreeMap::from([(TARGETS.to_string(), Filter::default())]),
                exclusions: BTreeMap::from([(XTARGETS.to_string(), Filter::default())]),
                maxtargets: DEFAULT_MAXTARGETS,
                device_list: None,
            }),
        }
    }

    /// Identifier of the device source.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Starts fetching devices on a background thread.
    ///
    /// Waits for any load already in flight first. Readers block until the
    /// new load completes.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Io`] if the loader thread cannot start.
    pub fn load(&self) -> Result<(), InventoryError> {
        let _guard = self.load_lock.lock();
        self.loaded.ready.wait();
        self.loaded.ready.reset();

        let source = Arc::clone(&self.source);
        let loaded = Arc::clone(&self.loaded);
        let spawned = std::thread::Builder::new()
            .name("device-loader".into())
            .spawn(move || {
                let result = source.fetch().map(Arc::new).map_err(|e| {
                    error!(source = source.name(), error = %e, "Device load failed");
                    e.to_string()
                });
                if let Ok(table) = &result {
                    debug!(count = table.devices.len(), "Devices loaded");
                }
                *loaded.table.write() = Some(result);
                loaded.ready.set();
            });

        if let Err(e) = spawned {
            self.loaded.ready.set();
            return Err(InventoryError::Io(e));
        }
        self.state.lock().device_list = None;
        Ok(())
    }

    /// Fetches devices and waits for the result.
    ///
    /// # Errors
    ///
    /// Returns the load failure, or [`InventoryError::NoDevices`].
    pub fn reload(&self) -> Result<Arc<DeviceTable>, InventoryError> {
        self.load()?;
        self.devices()
    }

    /// Loaded devices. Blocks while a load is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Load`] if the last load failed and
    /// [`InventoryError::NoDevices`] if nothing was loaded.
    pub fn devices(&self) -> Result<Arc<DeviceTable>, InventoryError> {
        self.loaded.ready.wait();
        match &*self.loaded.table.read() {
            Some(Ok(table)) if !table.devices.is_empty() => Ok(Arc::clone(table)),
            Some(Err(msg)) => Err(InventoryError::Load(msg.clone())),
            _ => Err(InventoryError::NoDevices),
        }
    }

    /// Attribute names declared by the source.
    ///
    /// # Errors
    ///
    /// See [`Inventory::devices`].
    pub fn attribute_names(&self) -> Result<Vec<String>, InventoryError> {
        Ok(self.devices()?.attributes.clone())
    }

    /// Creates a request for `command` on `target` with a fresh uid.
    ///
    /// Uids are unique and increasing for the life of the process.
    pub fn create_request(&self, target: &str, command: &str, mode: Mode) -> Request {
        let uid = Uid(NEXT_UID.fetch_add(1, Ordering::Relaxed));
        debug!(%uid, target, command, "Built request");
        Request {
            uid,
            target: target.to_string(),
            command: command.to_string(),
            mode,
        }
    }

    /// Current `targets` filter text.
    pub fn targets(&self) -> String {
        self.state
            .lock()
            .filters
            .get(TARGETS)
            .map(|filter| filter.text.clone())
            .unwrap_or_default()
    }

    /// Current target ceiling; 0 means unlimited.
    pub fn maxtargets(&self) -> usize {
        self.state.lock().maxtargets
    }

    /// Sets the target ceiling; 0 means unlimited.
    pub fn set_maxtargets(&self, maxtargets: usize) {
        let mut state = self.state.lock();
        state.maxtargets = maxtargets;
        state.device_list = None;
    }

    /// Device names passing every filter, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::MaxTargets`] when the list exceeds the
    /// ceiling, or a load error.
    pub fn device_list(&self) -> Result<Vec<String>, InventoryError> {
        let mut state = self.state.lock();
        if let Some(list) = &state.device_list {
            return Ok(list.clone());
        }

        if state.filters.get(TARGETS).is_none_or(Filter::is_empty) {
            state.device_list = Some(Vec::new());
            return Ok(Vec::new());
        }

        let table = self.devices()?;
        let list: Vec<String> = table
            .devices
            .iter()
            .filter(|(name, device)| {
                !excluded(&state.exclusions, name, device) && included(&state.filters, name, device)
            })
            .map(|(name, _)| name.clone())
            .collect();

        if state.maxtargets > 0 && list.len() > state.maxtargets {
            return Err(InventoryError::MaxTargets(state.maxtargets));
        }
        debug!(count = list.len(), "Device list rebuilt");
        state.device_list = Some(list.clone());
        Ok(list)
    }

    /// Shows or updates the filter `name`.
    ///
    /// `name` is `targets`, `xtargets`, an attribute, or `x` followed by an
    /// attribute. With no value the current setting is returned as a
    /// labelled line. With `append` the value is joined to the current one
    /// with a comma.
    ///
    /// # Errors
    ///
    /// [`InventoryError::UnknownAttribute`] for an unknown filter name,
    /// [`InventoryError::InvalidFilter`] for a bad regex, and
    /// [`InventoryError::UnknownLiteral`] when a literal matches nothing.
    pub fn filter(
        &self,
        name: &str,
        value: Option<&str>,
        append: bool,
    ) -> Result<Option<String>, InventoryError> {
        let exclusion = self.filter_kind(name)?;
        let current = {
            let state = self.state.lock();
            let filters = if exclusion {
                &state.exclusions
            } else {
                &state.filters
            };
            filters.get(name).map(|f| f.text.clone()).unwrap_or_default()
        };

        let Some(value) = value else {
            let caps = if exclusion { 2 } else { 1 };
            return Ok(Some(label_and_value(name, &current, caps)));
        };

        let text = if append && !value.is_empty() && !current.is_empty() {
            format!("{current},{value}")
        } else {
            value.to_string()
        };

        let filter = Filter::parse(&text)?;
        if !filter.literals.is_empty() {
            self.validate_literals(name, exclusion, &filter)?;
        }

        let mut state = self.state.lock();
        let filters = if exclusion {
            &mut state.exclusions
        } else {
            &mut state.filters
        };
        filters.insert(name.to_string(), filter);
        state.device_list = None;
        Ok(None)
    }

    /// Shows every inclusion (or exclusion) filter, one per line.
    ///
    /// # Errors
    ///
    /// See [`Inventory::attribute_names`].
    pub fn show_filters(&self, exclusions: bool) -> Result<String, InventoryError> {
        let mut names = vec![if exclusions { XTARGETS } else { TARGETS }.to_string()];
        for attribute in self.attribute_names().unwrap_or_default() {
            names.push(if exclusions {
                format!("x{attribute}")
            } else {
                attribute
            });
        }
        names.sort();

        let mut lines = Vec::with_capacity(names.len());
        for name in names {
            if let Some(line) = self.filter(&name, None, false)? {
                lines.push(line);
            }
        }
        Ok(lines.join("\n"))
    }

    /// Inventory settings for the `env` command.
    pub fn show_env(&self) -> String {
        let attributes = self.attribute_names().unwrap_or_default();
        let state = self.state.lock();

        let mut names = vec![TARGETS.to_string()];
        names.extend(attributes);
        names.sort();

        let mut lines = vec![
            "Inventory:".to_string(),
            format!("  Max Targets: {}", state.maxtargets),
            "  Filters:".to_string(),
        ];
        for name in names {
            let xname = format!("x{name}");
            let value = state.filters.get(&name).map(|f| f.text.as_str()).unwrap_or_default();
            let xvalue = state
                .exclusions
                .get(&xname)
                .map(|f| f.text.as_str())
                .unwrap_or_default();
            lines.push(format!(
                "    {}, {}",
                label_and_value(&name, value, 1),
                label_and_value(&xname, xvalue, 2)
            ));
        }
        lines.join("\n")
    }

    /// Returns true for an exclusion filter name, false for an inclusion.
    fn filter_kind(&self, name: &str) -> Result<bool, InventoryError> {
        if name == TARGETS {
            return Ok(false);
        }
        if name == XTARGETS {
            return Ok(true);
        }

        let attributes = self
            .attribute_names()
            .map_err(|_| InventoryError::UnknownAttribute(name.to_string()))?;
        if attributes.iter().any(|a| a == name) {
            return Ok(false);
        }
        if name
            .strip_prefix('x')
            .is_some_and(|stripped| attributes.iter().any(|a| a == stripped))
        {
            return Ok(true);
        }
        Err(InventoryError::UnknownAttribute(name.to_string()))
    }

    fn validate_literals(
        &self,
        name: &str,
        exclusion: bool,
        filter: &Filter,
    ) -> Result<(), InventoryError> {
        let table = self.devices()?;
        let attribute = if exclusion { &name[1..] } else { name };

        let known: Vec<String> = if attribute == TARGETS {
            table.devices.keys().map(|n| n.to_lowercase()).collect()
        } else {
            table
                .devices
                .values()
                .filter_map(|device| device.values(attribute))
                .flatten()
                .map(|v| v.to_lowercase())
                .collect()
        };

        if let Some(unknown) = filter.literals.iter().find(|l| !known.contains(l)) {
            return Err(InventoryError::UnknownLiteral(unknown.clone()));
        }
        Ok(())
    }
}

fn excluded(exclusions: &BTreeMap<String, Filter>, name: &str, device: &Device) -> bool {
    exclusions.iter().any(|(key, filter)| {
        if filter.is_empty() {
            return false;
        }
        if key == XTARGETS {
            return filter.matches(name);
        }
        // Devices without the attribute are never excluded by it.
        device
            .values(&key[1..])
            .is_some_and(|values| filter.matches_any(values))
    })
}

fn included(filters: &BTreeMap<String, Filter>, name: &str, device: &Device) -> bool {
    filters.iter().all(|(key, filter)| {
        if filter.is_empty() {
            return true;
        }
        if key == TARGETS {
            return filter.matches(name);
        }
        device
            .values(key)
            .is_some_and(|values| filter.matches_any(values))
    })
}

/// `Label: value` with the first `caps` characters upper-cased.
fn label_and_value(label: &str, value: &str, caps: usize) -> String {
    let split = label
        .char_indices()
        .nth(caps)
        .map_or(label.len(), |(index, _)| index);
    format!("{}{}: {value}", label[..split].to_uppercase(), &label[split..])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory source used across the crate's tests.
    pub(crate) struct StaticSource(pub DeviceTable);

    impl DeviceSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        fn fetch(&self) -> Result<DeviceTable, InventoryError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn table() -> DeviceTable {
        let device = |pop: &str, realm: &str, vendor: &str, flags: &[&str]| Device {
            attributes: BTreeMap::from([
                ("pop".to_string(), vec![pop.to_string()]),
                ("realm".to_string(), vec![realm.to_string()]),
                ("vendor".to_string(), vec![vendor.to_string()]),
                (
                    "flags".to_string(),
                    flags.iter().map(ToString::to_string).collect(),
                ),
            ]),
        };
        DeviceTable {
            attributes: vec!["pop".into(), "realm".into(), "vendor".into(), "flags".into()],
            devices: BTreeMap::from([
                ("device_a".to_string(), device("abc01", "prod", "juniper", &["f1"])),
                ("device_b".to_string(), device("xyz02", "prod", "cisco", &[])),
                ("device_c".to_string(), device("abc01", "lab", "juniper", &["f1", "f2"])),
                ("device_d".to_string(), device("xyz02", "lab", "cisco", &["f2"])),
            ]),
        }
    }

    pub(crate) fn inventory() -> Inventory {
        let inventory = Inventory::new(StaticSource(table()));
        inventory.load().unwrap();
        inventory
    }

    #[test]
    fn empty_targets_matches_nothing() {
        let inventory = inventory();
        assert!(inventory.device_list().unwrap().is_empty());
    }

    #[test]
    fn literal_and_regex_targets() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("device_a,^DEVICE_[cd]"), false).unwrap();
        assert_eq!(
            inventory.device_list().unwrap(),
            vec!["device_a", "device_c", "device_d"]
        );
    }

    #[test]
    fn regex_is_anchored_at_end() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("^device"), false).unwrap();
        assert!(inventory.device_list().unwrap().is_empty());
    }

    #[test]
    fn exclusions_win_over_inclusions() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("^device_.*"), false).unwrap();
        inventory.filter(XTARGETS, Some("device_b"), false).unwrap();
        inventory.filter("xvendor", Some("juniper"), false).unwrap();
        assert_eq!(inventory.device_list().unwrap(), vec!["device_d"]);
    }

    #[test]
    fn attribute_filters_must_all_match() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("^.*"), false).unwrap();
        inventory.filter("realm", Some("lab"), false).unwrap();
        inventory.filter("vendor", Some("^jun.*"), false).unwrap();
        assert_eq!(inventory.device_list().unwrap(), vec!["device_c"]);
    }

    #[test]
    fn list_attributes_match_any_element() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("^.*"), false).unwrap();
        inventory.filter("flags", Some("f2"), false).unwrap();
        assert_eq!(inventory.device_list().unwrap(), vec!["device_c", "device_d"]);
    }

    #[test]
    fn append_joins_with_comma_and_caret_clears() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("device_a"), false).unwrap();
        inventory.filter(TARGETS, Some("device_b"), true).unwrap();
        assert_eq!(inventory.targets(), "device_a,device_b");
        assert_eq!(inventory.device_list().unwrap().len(), 2);

        inventory.filter(TARGETS, Some("^"), false).unwrap();
        assert_eq!(inventory.targets(), "");
        assert!(inventory.device_list().unwrap().is_empty());
    }

    #[test]
    fn unknown_literal_is_rejected() {
        let inventory = inventory();
        let err = inventory.filter(TARGETS, Some("device_z"), false).unwrap_err();
        assert!(matches!(err, InventoryError::UnknownLiteral(_)));
        assert_eq!(inventory.targets(), "");
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let inventory = inventory();
        let err = inventory.filter(TARGETS, Some("^dev(ice"), false).unwrap_err();
        assert!(matches!(err, InventoryError::InvalidFilter(_)));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let inventory = inventory();
        let err = inventory.filter("colour", Some("red"), false).unwrap_err();
        assert!(matches!(err, InventoryError::UnknownAttribute(_)));
    }

    #[test]
    fn maxtargets_limits_device_list() {
        let inventory = inventory();
        inventory.set_maxtargets(2);
        inventory.filter(TARGETS, Some("^.*"), false).unwrap();
        assert!(matches!(
            inventory.device_list().unwrap_err(),
            InventoryError::MaxTargets(2)
        ));
        inventory.set_maxtargets(0);
        assert_eq!(inventory.device_list().unwrap().len(), 4);
    }

    #[test]
    fn show_filter_labels() {
        let inventory = inventory();
        inventory.filter(TARGETS, Some("device_a"), false).unwrap();
        assert_eq!(
            inventory.filter(TARGETS, None, false).unwrap().unwrap(),
            "Targets: device_a"
        );
        assert_eq!(
            inventory.filter(XTARGETS, None, false).unwrap().unwrap(),
            "XTargets: "
        );
    }

    #[test]
    fn show_env_pairs_filters_with_exclusions() {
        let env = inventory().show_env();
        assert!(env.starts_with("Inventory:\n  Max Targets: 50\n  Filters:"));
        assert!(env.contains("    Targets: , XTargets: "));
        assert!(env.contains("    Vendor: , XVendor: "));
    }

    #[test]
    fn uids_increase() {
        let inventory = inventory();
        let first = inventory.create_request("device_a", "show version", Mode::Cli);
        let second = inventory.create_request("device_a", "show version", Mode::Cli);
        assert!(second.uid > first.uid);
    }

    #[test]
    fn failed_load_is_reported() {
        struct Broken;
        impl DeviceSource for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn fetch(&self) -> Result<DeviceTable, InventoryError> {
                Err(InventoryError::Csv("bad header".into()))
            }
        }

        let inventory = Inventory::new(Broken);
        inventory.load().unwrap();
        assert!(matches!(inventory.devices().unwrap_err(), InventoryError::Load(_)));
    }

    #[test]
    fn unloaded_inventory_has_no_devices() {
        let inventory = Inventory::new(StaticSource(table()));
        assert!(matches!(inventory.devices().unwrap_err(), InventoryError::NoDevices));
    }
}
