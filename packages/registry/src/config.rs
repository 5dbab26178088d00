//! Configuration for the subscription registry.

use std::path::Path;

use serde::{Deserialize, Serialize};
use subreg_coord::StorePath;

use crate::codec::CodecKind;
use crate::error::{RegistryError, Result};
use crate::executor::DispatchMode;
use crate::paths::DEFAULT_ROOT;

/// Registry settings.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
///
/// # Example
/// ```
/// use subreg::{CodecKind, RegistryConfig};
///
/// let config: RegistryConfig = serde_json::from_str(r#"{ "codec": "json" }"#).unwrap();
/// assert_eq!(config.codec, CodecKind::Json);
/// assert_eq!(config.root, "/__vertx.subs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Identity of this node. Part of every leaf name this node writes.
    ///
    /// Default: a random UUID v4
    pub node_id: String,

    /// Root of the registry subtree in the store.
    ///
    /// Must match every other node in the cluster.
    /// Default: `/__vertx.subs`
    pub root: String,

    /// Encoding of stored records. Must match every other node.
    ///
    /// Default: binary
    pub codec: CodecKind,

    /// How notification-driven sink calls are dispatched.
    ///
    /// Default: serial
    pub dispatch: DispatchMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            root: DEFAULT_ROOT.to_string(),
            codec: CodecKind::default(),
            dispatch: DispatchMode::default(),
        }
    }
}

impl RegistryConfig {
    /// Default config with the given node id.
    pub fn with_node_id(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Create config from environment variables.
    ///
    /// Environment variables:
    /// - `SUBREG_NODE_ID`: Node id (default: random UUID)
    /// - `SUBREG_ROOT`: Registry root path (default: /__vertx.subs)
    /// - `SUBREG_CODEC`: `binary` or `json` (default: binary)
    /// - `SUBREG_DISPATCH`: `inline`, `serial` or `blocking` (default: serial)
    ///
    /// Unrecognized values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            node_id: lookup("SUBREG_NODE_ID")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.node_id),
            root: lookup("SUBREG_ROOT")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.root),
            codec: lookup("SUBREG_CODEC")
                .and_then(|s| CodecKind::from_name(&s))
                .unwrap_or(defaults.codec),
            dispatch: lookup("SUBREG_DISPATCH")
                .and_then(|s| DispatchMode::from_name(&s))
                .unwrap_or(defaults.dispatch),
        }
    }

    /// Load config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::config(format!("reading {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| RegistryError::config(format!("parsing {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed registry root.
    pub fn root_path(&self) -> Result<StorePath> {
        let root = StorePath::parse(&self.root)
            .map_err(|e| RegistryError::config(format!("root '{}': {}", self.root, e)))?;
        if root.is_empty() {
            return Err(RegistryError::config("root must not be the store root"));
        }
        Ok(root)
    }

    /// Check the node id and root.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(RegistryError::config("node id is empty"));
        }
        if self.node_id.contains(['/', '\0']) {
            return Err(RegistryError::config(format!(
                "node id '{}' contains '/' or NUL",
                self.node_id.escape_debug()
            )));
        }
        self.root_path().map(|_| ())
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}
