//! Parser configuration types.

/// Default ceiling for a single literal held in memory (100 MiB).
pub const DEFAULT_MAX_LITERAL_SIZE: u32 = 100 * 1024 * 1024;

/// Default BODYSTRUCTURE nesting limit.
pub const DEFAULT_MAX_BODY_DEPTH: usize = 64;

/// Response parser configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Key identifying the server account, passed to the namespace registry.
    pub server_key: String,
    /// Largest literal collected into memory.
    pub max_literal_size: u32,
    /// Deepest BODYSTRUCTURE nesting accepted.
    pub max_body_depth: usize,
    /// Delimiter used when no namespace information exists.
    pub default_hierarchy_delimiter: char,
}

impl ParserConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            max_literal_size: DEFAULT_MAX_LITERAL_SIZE,
            max_body_depth: DEFAULT_MAX_BODY_DEPTH,
            default_hierarchy_delimiter: '/',
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(server_key: impl Into<String>) -> ParserConfigBuilder {
        ParserConfigBuilder::new(server_key)
    }
}

/// Builder for parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    /// Creates a new builder for the given server key.
    #[must_use]
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            config: ParserConfig::new(server_key),
        }
    }

    /// Sets the literal ceiling.
    #[must_use]
    pub const fn max_literal_size(mut self, size: u32) -> Self {
        self.config.max_literal_size = size;
        self
    }

    /// Sets the BODYSTRUCTURE nesting limit.
    #[must_use]
    pub const fn max_body_depth(mut self, depth: usize) -> Self {
        self.config.max_body_depth = depth;
        self
    }

    /// Sets the fallback hierarchy delimiter.
    #[must_use]
    pub const fn default_hierarchy_delimiter(mut self, delimiter: char) -> Self {
        self.config.default_hierarchy_delimiter = delimiter;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ParserConfig {
        self.config
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = ParserConfig::new("imap.example.com");
        assert_eq!(config.server_key, "imap.example.com");
        assert_eq!(config.max_literal_size, 104857600);
        assert_eq!(config.max_body_depth, 64);
        assert_eq!(config.default_hierarchy_delimiter, '/');
    }

    #[test]
    fn test_config_builder() {
        let config = ParserConfig::builder("imap.example.com")
            .max_literal_size(4096)
            .max_body_depth(8)
            .default_hierarchy_delimiter('.')
            .build();

        assert_eq!(config.server_key, "imap.example.com");
        assert_eq!(config.max_literal_size, 4096);
        assert_eq!(config.max_body_depth, 8);
        assert_eq!(config.default_hierarchy_delimiter, '.');
    }
}
