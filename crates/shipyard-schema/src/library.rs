use serde::Serialize;
use std::collections::BTreeMap;

const BUILTIN_LIBRARIES: &[(&str, &str)] = &[
    ("windows_64", "https://example.com/downloads/SunnyNet64.dll"),
    ("windows_32", "https://example.com/downloads/SunnyNet.dll"),
    ("linux_64", "https://example.com/downloads/SunnyNet64.so"),
    ("linux_32", "https://example.com/downloads/SunnyNet.so"),
    ("darwin_64", "https://example.com/downloads/SunnyNet64.dylib"),
    ("darwin_32", "https://example.com/downloads/SunnyNet.dylib"),
];

/// Native library download URLs keyed by `"{system}_{arch}"`.
///
/// The system name is lowercased when forming the key; the architecture is
/// used as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryTable {
    urls: BTreeMap<String, String>,
}

impl LibraryTable {
    pub fn with_defaults() -> Self {
        Self {
            urls: BUILTIN_LIBRARIES
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    /// Built-in entries overlaid with `overrides` (raw keys, as in `[libraries]`).
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut table = Self::with_defaults();
        for (key, url) in overrides {
            table.urls.insert(key.to_lowercase(), url.clone());
        }
        table
    }

    pub fn key(system: &str, arch: &str) -> String {
        format!("{}_{arch}", system.to_lowercase())
    }

    pub fn get(&self, system: &str, arch: &str) -> Option<&str> {
        self.urls.get(&Self::key(system, arch)).map(String::as_str)
    }

    pub fn set(&mut self, system: &str, arch: &str, url: impl Into<String>) {
        self.urls.insert(Self::key(system, arch), url.into());
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.urls.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
