use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{fs, path::Path};

/// A single monitored location. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSpec {
    /// Sort-prefixed display name, e.g. `a_Nashville`. Used as the
    /// `location` tag so downstream tables order locations by intent.
    pub display_name: String,
    /// Free-text query sent verbatim to the weather API.
    pub query: String,
    pub country: String,
}

/// Entry as written by the user, before the registry applies sort prefixes.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationEntry {
    pub name: String,
    pub query: String,
    pub country: String,
}

#[derive(Debug, Deserialize)]
struct LocationsFile {
    #[serde(default)]
    locations: Vec<LocationEntry>,
}

/// Ordered, read-only set of monitored locations.
#[derive(Debug, Clone)]
pub struct Registry {
    locations: Vec<LocationSpec>,
}

impl Registry {
    /// Built-in default set.
    pub fn with_defaults() -> Self {
        let defaults = [
            ("Nashville", "Nashville, TN", "US"),
            ("Los Gatos", "Los Gatos, CA", "US"),
            ("San Francisco", "San Francisco, CA", "US"),
            ("London", "London, UK", "GB"),
            ("Tokyo", "Tokyo, JP", "JP"),
            ("Rome", "Rome, IT", "IT"),
            ("Dublin", "Dublin, IE", "IE"),
            ("New York City", "New York City, NY", "US"),
            ("Seattle", "Seattle, WA", "US"),
            ("Paris", "Paris, FR", "FR"),
        ];

        let locations = defaults
            .into_iter()
            .enumerate()
            .map(|(index, (name, query, country))| LocationSpec {
                display_name: format!("{}_{}", sort_prefix(index), name),
                query: query.to_string(),
                country: country.to_string(),
            })
            .collect();

        Self { locations }
    }

    /// Build a registry from raw entries, validating each one and applying
    /// the sort prefix in entry order.
    pub fn from_entries(entries: impl IntoIterator<Item = LocationEntry>) -> Result<Self> {
        let mut locations = Vec::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let name = entry.name.trim();
            let query = entry.query.trim();
            let country = entry.country.trim();

            if name.is_empty() || query.is_empty() || country.is_empty() {
                bail!(
                    "location entry {} is incomplete: name, query and country must all be non-empty",
                    index + 1
                );
            }

            locations.push(LocationSpec {
                display_name: format!("{}_{}", sort_prefix(index), name),
                query: query.to_string(),
                country: country.to_string(),
            });
        }

        if locations.is_empty() {
            bail!("location registry is empty; at least one location is required");
        }

        Ok(Self { locations })
    }

    /// Load a registry from a TOML file:
    ///
    /// ```toml
    /// [[locations]]
    /// name = "Paris"
    /// query = "Paris, FR"
    /// country = "FR"
    /// ```
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read locations file: {}", path.display()))?;

        let file: LocationsFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse locations file: {}", path.display()))?;

        Self::from_entries(file.locations)
            .with_context(|| format!("Invalid locations file: {}", path.display()))
    }

    pub fn locations(&self) -> &[LocationSpec] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Lexical prefix for the n-th entry: `a` .. `z`, then `aa`, `ab`, ...
fn sort_prefix(index: usize) -> String {
    let mut n = index;
    let mut prefix = String::new();

    loop {
        let letter = (b'a' + (n % 26) as u8) as char;
        prefix.insert(0, letter);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }

    prefix
}
