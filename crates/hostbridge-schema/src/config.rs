/// Limits and strictness for a [`crate::SchemaRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Close every object schema so undeclared params keys are rejected.
    pub strict_mode: bool,
    /// Reject calls to methods that have no registered schema.
    pub fail_on_missing_schema: bool,
    /// Cap on `<method>.schema.json` files accepted by a directory load.
    pub max_schemas_from_directory: usize,
    /// Cap on the size in bytes of a single schema file.
    pub max_schema_file_size: usize,
}

impl RegistryConfig {
    /// Config used by `hostbridge serve --schemas`: closed objects, unknown
    /// methods still allowed.
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            ..Self::default()
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            fail_on_missing_schema: false,
            max_schemas_from_directory: 256,
            max_schema_file_size: 256 * 1024,
        }
    }
}
