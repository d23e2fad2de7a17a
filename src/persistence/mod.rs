//! Save archive
//!
//! A small key/value tree: flat values plus named nested sections. The sector
//! grid and the session counters write into it; the on-disk format is plain
//! JSON through serde_json.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    #[serde(default)]
    values: BTreeMap<String, Value>,
    #[serde(default)]
    sections: BTreeMap<String, Archive>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn write<T: Serialize>(&mut self, key: &str, value: &T) -> SimResult<()> {
        let value = serde_json::to_value(value).map_err(|_| SimError::Archive {
            key: key.to_string(),
        })?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str) -> SimResult<T> {
        self.values
            .get(key)
            .and_then(|v| T::deserialize(v).ok())
            .ok_or_else(|| SimError::Archive {
                key: key.to_string(),
            })
    }

    /// Read `key`, or `default` if it was never written
    pub fn read_or<T: DeserializeOwned>(&self, key: &str, default: T) -> SimResult<T> {
        if self.values.contains_key(key) {
            self.read(key)
        } else {
            Ok(default)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn section(&self, name: &str) -> SimResult<&Archive> {
        self.sections.get(name).ok_or_else(|| SimError::Archive {
            key: name.to_string(),
        })
    }

    /// Nested section, created on first use
    pub fn section_mut(&mut self, name: &str) -> &mut Archive {
        self.sections.entry(name.to_string()).or_default()
    }

    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Archive { key: e.to_string() })
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|e| SimError::Archive { key: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_and_nested_values() {
        let mut archive = Archive::new();
        archive.write("level", &3u32).unwrap();
        archive.section_mut("sectors").write("columns", &8usize).unwrap();

        assert_eq!(archive.read::<u32>("level"), Ok(3));
        assert_eq!(archive.section("sectors").and_then(|s| s.read::<usize>("columns")), Ok(8));
        assert!(archive.section("missing").is_err());
    }

    #[test]
    fn test_wrong_type_is_an_error() {
        let mut archive = Archive::new();
        archive.write("score", &"lots").unwrap();
        assert_eq!(
            archive.read::<u64>("score"),
            Err(SimError::Archive {
                key: "score".into()
            })
        );
        assert_eq!(archive.read_or::<u64>("wave", 5), Ok(5));
    }

    #[test]
    fn test_survives_json() {
        let mut archive = Archive::new();
        archive.write("flags", &vec![true, false, true]).unwrap();
        archive.section_mut("session").write("score", &1200u64).unwrap();
        let json = archive.to_json().unwrap();
        let back = Archive::from_json(&json).unwrap();
        assert_eq!(back, archive);
    }
}
