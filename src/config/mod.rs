// querytree/src/config/mod.rs
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::backup::materialize::OverwritePolicy;
use crate::errors::{BackupError, Result};
use crate::utils::paths::{TargetRoot, normalize};

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const QUERY_FILE_NAME: &str = "query.sql";

// Struct for deserializing settings.json. `null` counts as absent.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSettings {
    pub connection: Option<Value>,
    pub storage: Option<Value>,
    pub overwriting: Option<Value>,
}

/// libpq connection parameters, taken verbatim from the `connection` object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub target_root: TargetRoot,
    pub overwrite: OverwritePolicy,
}

impl Settings {
    /// Reads `settings.json` from the project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let content = read_artifact(project_dir, SETTINGS_FILE_NAME)?;
        Self::from_json(&content, project_dir)
    }

    pub fn from_json(content: &str, project_dir: &Path) -> Result<Self> {
        let raw: RawSettings =
            serde_json::from_str(content).map_err(|source| BackupError::MalformedSettings {
                name: SETTINGS_FILE_NAME.to_string(),
                source,
            })?;

        let connection = match raw.connection {
            None | Some(Value::Null) => return Err(missing_field("connection")),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(invalid_field("connection", "должно быть JSON-объектом")),
        };
        let mut params = BTreeMap::new();
        for (key, value) in connection {
            let text = scalar_text(&value).ok_or_else(|| {
                invalid_field(
                    &format!("connection.{}", key),
                    "должно быть строкой, числом или логическим значением",
                )
            })?;
            params.insert(key, text);
        }

        let storage = raw.storage.ok_or_else(|| missing_field("storage"))?;
        let storage = scalar_text(&storage)
            .ok_or_else(|| invalid_field("storage", "должно содержать путь к папке"))?;
        let label = normalize(&storage);
        let absolute = if label.is_absolute() {
            label.clone()
        } else {
            project_dir.join(&label)
        };

        let overwriting = raw.overwriting.ok_or_else(|| missing_field("overwriting"))?;

        Ok(Settings {
            connection: ConnectionSettings { params },
            target_root: TargetRoot::new(absolute, label),
            overwrite: OverwritePolicy::from_flag(is_truthy(&overwriting)),
        })
    }
}

impl ConnectionSettings {
    /// Builds a libpq key/value connection string. `database` is accepted as
    /// an alias for `dbname`.
    pub fn conninfo(&self) -> String {
        self.params
            .iter()
            .map(|(key, value)| {
                let key = if key == "database" { "dbname" } else { key.as_str() };
                format!("{}={}", key, quote_conninfo_value(value))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn pg_config(&self) -> std::result::Result<postgres::Config, postgres::Error> {
        self.conninfo().parse()
    }
}

/// Reads the query text from `query.sql` in the project directory.
pub fn load_query(project_dir: &Path) -> Result<String> {
    read_artifact(project_dir, QUERY_FILE_NAME)
}

fn read_artifact(project_dir: &Path, name: &str) -> Result<String> {
    fs::read_to_string(project_dir.join(name)).map_err(|source| match source.kind() {
        ErrorKind::NotFound => BackupError::MissingArtifact { name: name.to_string() },
        _ => BackupError::UnreadableArtifact {
            name: name.to_string(),
            source,
        },
    })
}

fn missing_field(field: &str) -> BackupError {
    BackupError::MissingSettingsField {
        name: SETTINGS_FILE_NAME.to_string(),
        field: field.to_string(),
    }
}

fn invalid_field(field: &str, reason: &str) -> BackupError {
    BackupError::InvalidSettingsField {
        name: SETTINGS_FILE_NAME.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Text of a JSON scalar: strings verbatim, numbers and booleans as written.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn quote_conninfo_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
