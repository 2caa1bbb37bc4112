use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// What a discovered group is announced as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Light,
    Cover,
    Switch,
    Relay,
    Pir,
}

impl DeviceKind {
    /// Parse an overlay `types` value. Unknown values yield `None`.
    pub fn from_override(value: &str) -> Option<DeviceKind> {
        match value {
            "light" => Some(DeviceKind::Light),
            "cover" => Some(DeviceKind::Cover),
            "switch" => Some(DeviceKind::Switch),
            "relay" => Some(DeviceKind::Relay),
            "pir" => Some(DeviceKind::Pir),
            _ => None,
        }
    }

    /// The Home Assistant component this kind is published under.
    pub fn component(&self) -> &'static str {
        match self {
            DeviceKind::Light => "light",
            DeviceKind::Cover => "cover",
            DeviceKind::Switch | DeviceKind::Relay => "switch",
            DeviceKind::Pir => "binary_sensor",
        }
    }

    /// Human name used in fallback entity names.
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceKind::Light => "Light",
            DeviceKind::Cover => "Cover",
            DeviceKind::Switch => "Switch",
            DeviceKind::Relay => "Relay",
            DeviceKind::Pir => "PIR",
        }
    }
}

/// Optional per-group customization applied on top of the C-Gate tree,
/// keyed by `N/A/G`.
///
/// The overlay is a value type: the bridge replaces the whole snapshot on
/// reload and a discovery pass reads one snapshot throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelOverlay {
    /// Human names taking precedence over TREEXML labels.
    pub labels: BTreeMap<String, String>,

    /// Raw `types` values; resolved with [`LabelOverlay::resolved_override`].
    pub type_overrides: BTreeMap<String, String>,

    /// Home Assistant `object_id` overrides.
    pub entity_ids: BTreeMap<String, String>,

    /// Groups never announced through discovery.
    pub exclude: BTreeSet<String>,
}

/// On-disk shape of the overlay file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LabelFile {
    labels: BTreeMap<String, String>,
    types: BTreeMap<String, String>,
    entity_ids: BTreeMap<String, String>,
    exclude: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum LabelError {
    #[error("Failed to read label file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse label file {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LabelOverlay {
    /// Read the overlay from a JSON file.
    pub fn from_file(path: &Path) -> Result<LabelOverlay, LabelError> {
        let content = std::fs::read_to_string(path).map_err(|source| LabelError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        let file: LabelFile =
            serde_json::from_str(&content).map_err(|source| LabelError::FileParse {
                path: path.display().to_string(),
                source,
            })?;

        Ok(LabelOverlay {
            labels: file.labels,
            type_overrides: file.types,
            entity_ids: file.entity_ids,
            exclude: file.exclude.into_iter().collect(),
        })
    }

    pub fn label_for(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn entity_id_for(&self, key: &str) -> Option<&str> {
        self.entity_ids.get(key).map(String::as_str)
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude.contains(key)
    }

    /// The type override for a group, if any. An unknown value falls back
    /// to a light with a warning.
    pub fn resolved_override(&self, key: &str) -> Option<DeviceKind> {
        let value = self.type_overrides.get(key)?;
        match DeviceKind::from_override(value) {
            Some(kind) => Some(kind),
            None => {
                warn!("Unknown type override {value:?} for {key}, treating as a light");
                Some(DeviceKind::Light)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn overlay_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("a temp file");
        file.write_all(content.as_bytes()).expect("writable file");
        file
    }

    #[test]
    fn the_overlay_is_read_from_json() {
        let file = overlay_file(
            r#"{
                "labels": {"254/56/10": "Kitchen"},
                "types": {"254/56/10": "cover"},
                "entity_ids": {"254/56/10": "kitchen_blind"},
                "exclude": ["254/56/11"]
            }"#,
        );

        let overlay = LabelOverlay::from_file(file.path()).unwrap();
        assert_eq!(overlay.label_for("254/56/10"), Some("Kitchen"));
        assert_eq!(overlay.resolved_override("254/56/10"), Some(DeviceKind::Cover));
        assert_eq!(overlay.entity_id_for("254/56/10"), Some("kitchen_blind"));
        assert!(overlay.is_excluded("254/56/11"));
        assert!(!overlay.is_excluded("254/56/10"));
    }

    #[test]
    fn an_unknown_type_override_falls_back_to_light() {
        let overlay = LabelOverlay {
            type_overrides: [("254/56/10".to_string(), "dimmer".to_string())].into(),
            ..LabelOverlay::default()
        };
        assert_eq!(overlay.resolved_override("254/56/10"), Some(DeviceKind::Light));
        assert_eq!(overlay.resolved_override("254/56/11"), None);
    }

    #[test]
    fn a_malformed_file_is_rejected() {
        let file = overlay_file("not json");
        assert!(matches!(
            LabelOverlay::from_file(file.path()),
            Err(LabelError::FileParse { .. })
        ));
    }

    #[test]
    fn relay_and_switch_share_the_switch_component() {
        assert_eq!(DeviceKind::Switch.component(), "switch");
        assert_eq!(DeviceKind::Relay.component(), "switch");
        assert_eq!(DeviceKind::Pir.component(), "binary_sensor");
    }
}
