//! Absolute node paths in the coordination store.

use std::fmt;

/// Errors related to path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path component cannot name a store node.
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
    /// The path string is invalid.
    InvalidPath { message: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::InvalidComponent {
                component,
                position,
                message,
            } => {
                write!(
                    f,
                    "invalid path component '{}' at position {}: {}",
                    component, position, message
                )
            }
            PathError::InvalidPath { message } => {
                write!(f, "invalid path: {}", message)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// A validated, absolute path to a node in the coordination store.
///
/// The store namespace is a tree of named nodes. A path is the list of node
/// names from the store root down to the node; the empty list is the root
/// itself and displays as `/`.
///
/// Components may contain any character except `/` and NUL, and may not be
/// `.` or `..`. This is looser than identifier rules on purpose: addresses
/// such as `svc.foo` and leaf names such as `node-a-3` are ordinary
/// components.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorePath {
    pub components: Vec<String>,
}

impl StorePath {
    /// The store root.
    pub fn root() -> Self {
        StorePath {
            components: Vec::new(),
        }
    }

    /// Parse a path string, validating components.
    ///
    /// # Path Syntax
    ///
    /// - Components are separated by `/`
    /// - A leading `/` is optional
    /// - Empty components are ignored (normalizes `//` and trailing `/`)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use subreg_coord::StorePath;
    ///
    /// let path = StorePath::parse("/__vertx.subs/svc.foo/node-1").unwrap();
    /// assert_eq!(path.len(), 3);
    /// assert_eq!(path.to_string(), "/__vertx.subs/svc.foo/node-1");
    ///
    /// assert_eq!(StorePath::parse("/a/b/").unwrap(), StorePath::parse("a//b").unwrap());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let components: Vec<String> = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();

        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }

        Ok(StorePath { components })
    }

    /// Try to create a path from components, validating each.
    pub fn try_from_components(components: Vec<String>) -> Result<Self, PathError> {
        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }
        Ok(StorePath { components })
    }

    /// Validate a single path component.
    pub fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        let invalid = |message: &str| PathError::InvalidComponent {
            component: component.to_string(),
            position,
            message: message.to_string(),
        };

        if component.is_empty() {
            return Err(invalid("empty component"));
        }
        if component == "." || component == ".." {
            return Err(invalid("relative components are not allowed"));
        }
        if let Some(c) = component.chars().find(|c| *c == '/' || *c == '\0') {
            return Err(invalid(&format!("invalid character {:?}", c)));
        }
        Ok(())
    }

    /// Append a single validated component.
    pub fn child(&self, name: &str) -> Result<StorePath, PathError> {
        Self::validate_component(name, self.components.len())?;
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(StorePath { components })
    }

    /// Check if this path is the store root.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Iterate over components.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// Name of the node this path points to. `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// Path of the parent node. `None` for the root.
    pub fn parent(&self) -> Option<StorePath> {
        if self.components.is_empty() {
            return None;
        }
        Some(StorePath {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    /// Join this path with another.
    #[must_use]
    pub fn join(&self, other: &StorePath) -> StorePath {
        let mut components = self.components.clone();
        components.extend(other.components.iter().cloned());
        StorePath { components }
    }

    /// Check if this path has the given prefix.
    pub fn has_prefix(&self, prefix: &StorePath) -> bool {
        prefix.components.len() <= self.components.len()
            && prefix.components == self.components[..prefix.components.len()]
    }

    /// Strip a prefix from this path.
    ///
    /// Returns `None` if the prefix doesn't match.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &StorePath) -> Option<StorePath> {
        if self.has_prefix(prefix) {
            Some(StorePath {
                components: self.components[prefix.components.len()..].to_vec(),
            })
        } else {
            None
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for StorePath {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}
