//! The `app.json` document: per-process healthcheck declarations.
//!
//! [`AppJson`] is the typed view used by `check`. [`AppJsonDocument`] keeps
//! the raw JSON so `add` and `convert` can rewrite the `healthchecks` key
//! without dropping anything else the file contains.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum AppJsonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid app.json: '{0}' must be a JSON object")]
    NotAnObject(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppJson {
    #[serde(default)]
    pub healthchecks: BTreeMap<String, Vec<HealthcheckEntry>>,
}

impl AppJson {
    pub fn read(path: &Path) -> Result<Self, AppJsonError> {
        let contents = std::fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Entries declared for `process_type` whose `type` equals `check_type`.
    pub fn healthchecks_for(&self, process_type: &str, check_type: &str) -> Vec<HealthcheckEntry> {
        self.healthchecks
            .get(process_type)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.check_type == check_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A healthcheck exactly as written in app.json.
///
/// Field order matters: it fixes the serialisation used to derive names for
/// unnamed entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<HttpHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub listening: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub check_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub warn: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<OnFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnFailure {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppJsonDocument {
    root: Map<String, Value>,
}

impl Default for AppJsonDocument {
    fn default() -> Self {
        Self { root: Map::new() }
    }
}

impl AppJsonDocument {
    pub fn from_slice(contents: &[u8]) -> Result<Self, AppJsonError> {
        match serde_json::from_slice(contents)? {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(AppJsonError::NotAnObject("$".to_string())),
        }
    }

    /// Reads `path`, treating a missing file as an empty document.
    pub fn read_or_default(path: &Path) -> Result<Self, AppJsonError> {
        match std::fs::read(path) {
            Ok(contents) => Self::from_slice(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn healthcheck_count(&self, process_type: &str) -> usize {
        self.root
            .get("healthchecks")
            .and_then(|checks| checks.get(process_type))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    pub fn append_healthcheck(
        &mut self,
        process_type: &str,
        entry: &HealthcheckEntry,
    ) -> Result<(), AppJsonError> {
        let entry = serde_json::to_value(entry)?;
        let process = self.healthchecks_mut()?.entry(process_type).or_insert(Value::Null);
        match process {
            Value::Array(entries) => entries.push(entry),
            other => *other = Value::Array(vec![entry]),
        }
        Ok(())
    }

    /// Replaces every healthcheck declared for `process_type`.
    pub fn set_healthchecks(
        &mut self,
        process_type: &str,
        entries: &[HealthcheckEntry],
    ) -> Result<(), AppJsonError> {
        let entries = serde_json::to_value(entries)?;
        self.healthchecks_mut()?
            .insert(process_type.to_string(), entries);
        Ok(())
    }

    pub fn to_bytes(&self, pretty: bool) -> Result<Vec<u8>, AppJsonError> {
        if pretty {
            Ok(serde_json::to_vec_pretty(&self.root)?)
        } else {
            Ok(serde_json::to_vec(&self.root)?)
        }
    }

    fn healthchecks_mut(&mut self) -> Result<&mut Map<String, Value>, AppJsonError> {
        let checks = self
            .root
            .entry("healthchecks")
            .or_insert_with(|| Value::Object(Map::new()));
        if checks.is_null() {
            *checks = Value::Object(Map::new());
        }
        checks
            .as_object_mut()
            .ok_or_else(|| AppJsonError::NotAnObject("healthchecks".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_JSON: &str = r#"{
        "name": "demo",
        "healthchecks": {
            "web": [
                {"type": "startup", "name": "web check", "path": "/health", "attempts": 2},
                {"type": "liveness", "command": ["true"]},
                {"type": "startup", "listening": true, "port": 3000, "warn": true}
            ],
            "worker": [
                {"type": "startup", "uptime": 10}
            ]
        }
    }"#;

    #[test]
    fn test_parse_and_filter() {
        let app: AppJson = serde_json::from_str(APP_JSON).expect("valid app.json");
        let web = app.healthchecks_for("web", "startup");
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].name, "web check");
        assert_eq!(web[0].path, "/health");
        assert_eq!(web[0].attempts, Some(2));
        assert!(web[1].listening);
        assert_eq!(web[1].port, Some(3000));
        assert!(web[1].warn);

        assert_eq!(app.healthchecks_for("web", "liveness").len(), 1);
        assert!(app.healthchecks_for("release", "startup").is_empty());
    }

    #[test]
    fn test_missing_healthchecks_key() {
        let app: AppJson = serde_json::from_str(r#"{"name": "demo"}"#).unwrap();
        assert!(app.healthchecks.is_empty());
    }

    #[test]
    fn test_on_failure_parsing() {
        let entry: HealthcheckEntry = serde_json::from_str(
            r#"{"uptime": 5, "onFailure": {"command": ["echo", "down"], "url": "http://hook"}}"#,
        )
        .unwrap();
        let on_failure = entry.on_failure.expect("onFailure parsed");
        assert_eq!(on_failure.command, vec!["echo", "down"]);
        assert_eq!(on_failure.url, "http://hook");
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let entry = HealthcheckEntry {
            name: "default".to_string(),
            check_type: "startup".to_string(),
            uptime: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"name":"default","type":"startup","uptime":1}"#);
    }

    #[test]
    fn test_document_append_preserves_other_keys() {
        let mut doc = AppJsonDocument::from_slice(APP_JSON.as_bytes()).unwrap();
        assert_eq!(doc.healthcheck_count("web"), 3);
        assert_eq!(doc.healthcheck_count("release"), 0);

        let entry = HealthcheckEntry {
            name: "default".to_string(),
            uptime: Some(1),
            ..Default::default()
        };
        doc.append_healthcheck("web", &entry).unwrap();
        doc.append_healthcheck("release", &entry).unwrap();
        assert_eq!(doc.healthcheck_count("web"), 4);
        assert_eq!(doc.healthcheck_count("release"), 1);

        let value: Value = serde_json::from_slice(&doc.to_bytes(false).unwrap()).unwrap();
        assert_eq!(value["name"], "demo");
    }

    #[test]
    fn test_document_set_replaces_entries() {
        let mut doc = AppJsonDocument::default();
        doc.set_healthchecks(
            "web",
            &[HealthcheckEntry {
                path: "/".to_string(),
                ..Default::default()
            }],
        )
        .unwrap();
        assert_eq!(doc.healthcheck_count("web"), 1);
        let bytes = doc.to_bytes(false).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"healthchecks":{"web":[{"path":"/"}]}}"#
        );
    }

    #[test]
    fn test_document_rejects_non_object_healthchecks() {
        let mut doc = AppJsonDocument::from_slice(br#"{"healthchecks": []}"#).unwrap();
        let res = doc.append_healthcheck("web", &HealthcheckEntry::default());
        assert!(matches!(res, Err(AppJsonError::NotAnObject(_))), "{:?}", res);
    }

    #[test]
    fn test_read_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = AppJsonDocument::read_or_default(&dir.path().join("app.json")).unwrap();
        assert_eq!(doc, AppJsonDocument::default());
    }

    #[test]
    fn test_read_app_json_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(&path, APP_JSON).unwrap();
        let app = AppJson::read(&path).unwrap();
        assert_eq!(app.healthchecks_for("worker", "startup")[0].uptime, Some(10));
    }
}
