use std::collections::BTreeSet;
use std::fs::{self, File};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Which remote entities are visible in the linkable pool.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct FilterPreferences {
    #[serde(default = "FilterPreferences::default_domains")]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub device_classes: BTreeSet<String>,
    #[serde(default)]
    pub show_all_domains: bool,
}

impl Default for FilterPreferences {
    fn default() -> Self {
        Self {
            domains: Self::default_domains(),
            device_classes: BTreeSet::new(),
            show_all_domains: false,
        }
    }
}

impl FilterPreferences {
    pub const DEFAULT_DOMAINS: &'static [&'static str] =
        &["automation", "binary_sensor", "number", "sensor", "switch"];

    fn default_domains() -> BTreeSet<String> {
        Self::DEFAULT_DOMAINS
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn clean(value: &str) -> Option<String> {
        let value = value.trim().to_ascii_lowercase();
        (!value.is_empty()).then_some(value)
    }

    fn toggle(set: &mut BTreeSet<String>, value: &str) -> bool {
        let Some(value) = Self::clean(value) else {
            return false;
        };
        if set.remove(&value) {
            false
        } else {
            set.insert(value);
            true
        }
    }

    /// Returns whether the domain is selected after the toggle.
    pub fn toggle_domain(&mut self, domain: &str) -> bool {
        Self::toggle(&mut self.domains, domain)
    }

    /// Returns whether the device class is selected after the toggle.
    pub fn toggle_device_class(&mut self, device_class: &str) -> bool {
        Self::toggle(&mut self.device_classes, device_class)
    }

    pub fn normalize(&mut self) {
        self.domains = self.domains.iter().filter_map(|x| Self::clean(x)).collect();
        self.device_classes = self
            .device_classes
            .iter()
            .filter_map(|x| Self::clean(x))
            .collect();
    }
}

/// File-backed [`FilterPreferences`]. Every mutation is written through.
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    file: Utf8PathBuf,
    prefs: FilterPreferences,
}

impl PreferenceStore {
    pub fn load(file: Utf8PathBuf) -> ApiResult<Self> {
        let mut prefs = if file.is_file() {
            match fs::read_to_string(&file)
                .map_err(ApiError::from)
                .and_then(|raw| Ok(serde_yml::from_str::<FilterPreferences>(&raw)?))
            {
                Ok(prefs) => prefs,
                Err(err) => {
                    log::warn!("Failed to parse {}, using defaults: {}", file, err);
                    FilterPreferences::default()
                }
            }
        } else {
            FilterPreferences::default()
        };
        prefs.normalize();

        let store = Self { file, prefs };
        if !store.file.is_file() {
            store.save()?;
        }
        Ok(store)
    }

    pub fn save(&self) -> ApiResult<()> {
        let file = File::create(&self.file)?;
        serde_yml::to_writer(file, &self.prefs)?;
        Ok(())
    }

    #[must_use]
    pub const fn prefs(&self) -> &FilterPreferences {
        &self.prefs
    }

    pub fn toggle_domain(&mut self, domain: &str) -> ApiResult<bool> {
        let enabled = self.prefs.toggle_domain(domain);
        self.save()?;
        Ok(enabled)
    }

    pub fn toggle_device_class(&mut self, device_class: &str) -> ApiResult<bool> {
        let enabled = self.prefs.toggle_device_class(device_class);
        self.save()?;
        Ok(enabled)
    }

    pub fn set_show_all_domains(&mut self, show_all: bool) -> ApiResult<()> {
        self.prefs.show_all_domains = show_all;
        self.save()
    }

    pub fn reset(&mut self) -> ApiResult<()> {
        self.prefs = FilterPreferences::default();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use crate::model::prefs::{FilterPreferences, PreferenceStore};

    fn temp_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("prefs.yaml")).unwrap()
    }

    #[test]
    fn toggle_adds_then_removes() {
        let mut prefs = FilterPreferences::default();
        assert!(prefs.toggle_domain("Light "));
        assert!(prefs.domains.contains("light"));
        assert!(!prefs.toggle_domain("light"));
        assert!(!prefs.domains.contains("light"));
    }

    #[test]
    fn blank_toggle_is_ignored() {
        let mut prefs = FilterPreferences::default();
        let before = prefs.clone();
        assert!(!prefs.toggle_device_class("  "));
        assert_eq!(prefs, before);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);

        let store = PreferenceStore::load(path.clone()).unwrap();
        assert_eq!(store.prefs(), &FilterPreferences::default());
        assert!(path.is_file());
    }

    #[test]
    fn changes_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);

        let mut store = PreferenceStore::load(path.clone()).unwrap();
        store.toggle_domain("switch").unwrap();
        store.toggle_device_class("humidity").unwrap();
        store.set_show_all_domains(true).unwrap();

        let reloaded = PreferenceStore::load(path).unwrap();
        assert!(!reloaded.prefs().domains.contains("switch"));
        assert!(reloaded.prefs().device_classes.contains("humidity"));
        assert!(reloaded.prefs().show_all_domains);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir);
        std::fs::write(&path, "domains: [unterminated").unwrap();

        let store = PreferenceStore::load(path).unwrap();
        assert_eq!(store.prefs(), &FilterPreferences::default());
    }
}
