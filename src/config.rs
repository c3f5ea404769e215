use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::location::UnknownVillageMap;
use crate::profile::{builtin_profiles, ImportProfile};

/// Environment variable that overrides `[photos].root`.
pub const PHOTO_ROOT_ENV: &str = "PHOTO_ROOT_PATH";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub photos: PhotosConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub locations: LocationsConfig,
    #[serde(default)]
    pub repair: RepairConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhotosConfig {
    #[serde(default = "default_photo_root")]
    pub root: PathBuf,
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            root: default_photo_root(),
        }
    }
}

fn default_photo_root() -> PathBuf {
    PathBuf::from("/data/photos")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_user_id")]
    pub officer_id: i64,
    #[serde(default = "default_user_id")]
    pub audit_user_id: i64,
    #[serde(default)]
    pub profiles: BTreeMap<String, ImportProfile>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            officer_id: default_user_id(),
            audit_user_id: default_user_id(),
            profiles: BTreeMap::new(),
        }
    }
}

fn default_profile() -> String {
    "ecrvs".to_string()
}
fn default_user_id() -> i64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationsConfig {
    #[serde(default = "default_unknown_village_id")]
    pub global_unknown_village_id: i64,
    /// LGA id (as a string key) → placeholder village id.
    #[serde(default)]
    pub unknown_villages: BTreeMap<String, i64>,
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            global_unknown_village_id: default_unknown_village_id(),
            unknown_villages: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepairConfig {
    #[serde(default = "default_unknown_village_id")]
    pub unknown_village_id: i64,
    #[serde(default = "default_first_new_location_id")]
    pub first_new_location_id: i64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            unknown_village_id: default_unknown_village_id(),
            first_new_location_id: default_first_new_location_id(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_unknown_village_id() -> i64 {
    5857
}
fn default_first_new_location_id() -> i64 {
    4881
}
fn default_batch_size() -> usize {
    1000
}

impl Config {
    /// Built-in profiles overlaid with the ones from the config file.
    pub fn profiles(&self) -> BTreeMap<String, ImportProfile> {
        let mut profiles = builtin_profiles();
        profiles.extend(self.import.profiles.clone());
        profiles
    }

    /// Look up a profile by name, falling back to `[import].profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<ImportProfile> {
        let name = name.unwrap_or(&self.import.profile);
        let mut profiles = self.profiles();
        match profiles.remove(name) {
            Some(profile) => Ok(profile),
            None => bail!(
                "Unknown import profile: '{}'. Available: {}",
                name,
                profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    pub fn unknown_villages(&self) -> Result<UnknownVillageMap> {
        let mut by_lga = HashMap::new();
        for (key, village_id) in &self.locations.unknown_villages {
            let lga_id: i64 = key
                .trim()
                .parse()
                .with_context(|| format!("locations.unknown_villages key '{}' is not an id", key))?;
            by_lga.insert(lga_id, *village_id);
        }
        Ok(UnknownVillageMap::new(by_lga))
    }

    /// Apply environment overrides.
    fn apply_env(&mut self, photo_root: Option<String>) {
        if let Some(root) = photo_root.filter(|r| !r.trim().is_empty()) {
            self.photos.root = PathBuf::from(root);
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)?;
    config.apply_env(std::env::var(PHOTO_ROOT_ENV).ok());
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate profiles
    for (name, profile) in config.profiles() {
        if profile.delimiter_byte().is_none() {
            bail!(
                "import.profiles.{}.delimiter must be a single ASCII character",
                name
            );
        }
    }
    config.profile(None)?;

    // Validate repair
    if config.repair.batch_size == 0 {
        bail!("repair.batch_size must be > 0");
    }

    config.unknown_villages()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ExistingPolicy;

    const MINIMAL: &str = r#"
[db]
path = "./data/insurees.sqlite"
"#;

    #[test]
    fn test_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.photos.root, PathBuf::from("/data/photos"));
        assert_eq!(config.import.profile, "ecrvs");
        assert_eq!(config.repair.unknown_village_id, 5857);
        assert_eq!(config.repair.first_new_location_id, 4881);
        assert_eq!(config.repair.batch_size, 1000);
        assert!(config.unknown_villages().unwrap().is_empty());
    }

    #[test]
    fn test_profile_override_and_unknown_villages() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[import]
profile = "campaign"

[import.profiles.campaign]
delimiter = ";"
existing = "skip"

[locations.unknown_villages]
"10" = 4873
"11" = 4874
"#,
        )
        .unwrap();
        let profile = config.profile(None).unwrap();
        assert_eq!(profile.delimiter, ';');
        assert_eq!(profile.existing, ExistingPolicy::Skip);
        assert!(config.profile(Some("legacy")).is_ok());
        let map = config.unknown_villages().unwrap();
        assert_eq!(map.placeholder_for(10), Some(4873));
        assert_eq!(map.placeholder_for(12), None);
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let err = parse_config(
            r#"
[db]
path = "x.sqlite"
[import]
profile = "nope"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown import profile"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_batch = format!("{}\n[repair]\nbatch_size = 0\n", MINIMAL);
        assert!(parse_config(&bad_batch).is_err());

        let bad_key = format!("{}\n[locations.unknown_villages]\nBanjul = 4873\n", MINIMAL);
        assert!(parse_config(&bad_key).is_err());

        let bad_delim = format!(
            "{}\n[import.profiles.x]\ndelimiter = \"§\"\n",
            MINIMAL
        );
        assert!(parse_config(&bad_delim).is_err());
    }

    #[test]
    fn test_env_overrides_photo_root() {
        let mut config = parse_config(MINIMAL).unwrap();
        config.apply_env(Some("/srv/photos".to_string()));
        assert_eq!(config.photos.root, PathBuf::from("/srv/photos"));
        config.apply_env(Some("  ".to_string()));
        assert_eq!(config.photos.root, PathBuf::from("/srv/photos"));
    }
}
