use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;

// Biography document, read once at startup and never written
#[derive(Debug, Clone, Default)]
pub struct Bio {
    data: Map<String, Value>,
}

impl Bio {
    #[cfg(test)]
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// A missing file yields an empty document, a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path_str, "bio file not found, starting with an empty bio");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path: path_str, source }),
        };

        let data: Map<String, Value> = serde_json::from_str(&raw)
            .map_err(|source| ConfigError::Json { path: path_str.clone(), source })?;
        info!(path = %path_str, keys = data.len(), "bio loaded");
        Ok(Self { data })
    }

    // Whole document, or only the requested keys (absent keys map to null)
    pub fn get(&self, keys: Option<&[String]>) -> Value {
        match keys {
            Some(keys) if !keys.is_empty() => Value::Object(
                keys.iter()
                    .map(|k| (k.clone(), self.data.get(k).cloned().unwrap_or(Value::Null)))
                    .collect(),
            ),
            _ => Value::Object(self.data.clone()),
        }
    }

    pub fn profile(&self) -> Value {
        self.data
            .get("profile")
            .cloned()
            .unwrap_or_else(|| Value::Object(self.data.clone()))
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    // Portfolio site link, either top-level or under "links"
    pub fn site_url(&self) -> Option<&str> {
        self.string("site").or_else(|| {
            self.data
                .get("links")
                .and_then(|l| l.get("site"))
                .and_then(Value::as_str)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.data.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Bio {
        let Value::Object(map) = json!({
            "name": "Alex Doe",
            "links": { "site": "https://alex.example" },
            "profile": { "experience": ["backend"] }
        }) else {
            unreachable!()
        };
        Bio::from_map(map)
    }

    #[test]
    fn get_filters_keys() {
        let bio = sample();
        let keys = vec!["name".to_string(), "missing".to_string()];
        assert_eq!(bio.get(Some(&keys)), json!({ "name": "Alex Doe", "missing": null }));
        assert_eq!(bio.get(None)["name"], "Alex Doe");
    }

    #[test]
    fn profile_and_site_lookup() {
        let bio = sample();
        assert_eq!(bio.profile(), json!({ "experience": ["backend"] }));
        assert_eq!(bio.site_url(), Some("https://alex.example"));
    }

    #[test]
    fn loads_file_and_reports_malformed_json() {
        let dir = std::env::temp_dir().join(format!("bio-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("bio.json");
        std::fs::write(&good, r#"{"name": "Alex Doe", "site": "https://alex.example"}"#).unwrap();
        let bio = Bio::load(&good).unwrap();
        assert_eq!(bio.site_url(), Some("https://alex.example"));

        let bad = dir.join("broken.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(Bio::load(&bad), Err(ConfigError::Json { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_empty_bio() {
        let bio = Bio::load("/nonexistent/bio.json").unwrap();
        assert!(bio.is_empty());
    }
}
