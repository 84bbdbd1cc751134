use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::validator::{close_object_schemas, validate_params};

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Method-keyed registry of compiled params validators.
pub struct SchemaRegistry {
    validators: HashMap<String, Validator>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Empty registry using `RegistryConfig::default()`.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Empty registry using `config`.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Register a params schema for `method` from a JSON string.
    pub fn register(&mut self, method: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)?;
        self.register_value(method, &schema)
    }

    /// Register a params schema for `method`.
    ///
    /// Replaces any schema previously registered under the same name.
    pub fn register_value(&mut self, method: &str, schema: &Value) -> Result<()> {
        let mut schema = schema.clone();
        if self.config.strict_mode {
            close_object_schemas(&mut schema);
        }

        let compiled =
            jsonschema::validator_for(&schema).map_err(|err| SchemaError::CompileFailed {
                method: method.to_string(),
                message: err.to_string(),
            })?;

        debug!(method, "registered params schema");
        self.validators.insert(method.to_string(), compiled);
        Ok(())
    }

    /// Load every `<method>.schema.json` file in a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Same as [`SchemaRegistry::from_directory`] with explicit limits.
    ///
    /// Symlinked schema files are refused. Other files are ignored.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(method) = file_name.strip_suffix(SCHEMA_SUFFIX) else {
                continue;
            };

            let entry_path = entry.path();
            let file_type = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?
                .file_type();
            if file_type.is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !file_type.is_file() {
                continue;
            }
            if !is_method_name(method) {
                return Err(SchemaError::LoadFailed(format!(
                    "schema filename is not a method name: {file_name}"
                )));
            }

            if registry.validators.len() >= registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    registry.config.max_schemas_from_directory
                )));
            }

            let content = read_limited(&entry_path, registry.config.max_schema_file_size)?;
            registry.register(method, &content)?;
        }

        info!(
            dir = %path.display(),
            schemas = registry.validators.len(),
            "loaded params schemas"
        );
        Ok(registry)
    }

    /// Validate `params` for `method`.
    ///
    /// Methods without a schema pass unless `fail_on_missing_schema` is set.
    pub fn validate(&self, method: &str, params: &Value) -> Result<()> {
        match self.validators.get(method) {
            Some(validator) => validate_params(method, params, validator),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(method.to_string()))
            }
            None => Ok(()),
        }
    }

    /// Check if a method has a registered schema.
    pub fn has_schema(&self, method: &str) -> bool {
        self.validators.contains_key(method)
    }

    /// Methods that have registered schemas, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.validators.keys().cloned().collect();
        methods.sort_unstable();
        methods
    }

    /// Active configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("methods", &self.methods())
            .field("config", &self.config)
            .finish()
    }
}

fn is_method_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn read_limited(path: &Path, max_bytes: usize) -> Result<String> {
    let file = File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;

    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;

    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large (max {max_bytes} bytes): {}",
            path.display()
        )));
    }
    Ok(content)
}
