//! Tool registry.
//!
//! Tools are registered once at startup through [`ToolRegistryBuilder`] and
//! the resulting [`ToolRegistry`] is shared read-only by every session.
//! Listing order is registration order.
//!
//! Whatever a tool does, its faults stop here: errors, timeouts and panics
//! are logged in full and surfaced to the dispatcher only as a [`ToolError`].

pub mod format;
pub mod token;
pub mod whoop;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata describing a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A named unit of computation callable through `tools/call`.
///
/// Implementations may await I/O freely; a slow tool only holds up its own
/// session.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static metadata. Called once, at registration.
    fn descriptor(&self) -> ToolDescriptor;

    /// Runs the tool.
    ///
    /// # Errors
    ///
    /// Any error. It is logged, never shown to the remote caller.
    async fn call(&self, arguments: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Failure to invoke a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with that name is registered.
    #[error("tool not found: {name}")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// The tool returned an error.
    #[error("tool {name} failed")]
    Failed {
        /// Tool name.
        name: String,
        /// Underlying cause, for server-side logs only.
        #[source]
        cause: anyhow::Error,
    },

    /// The tool did not finish within the configured limit.
    #[error("tool {name} timed out after {after:?}")]
    TimedOut {
        /// Tool name.
        name: String,
        /// The limit that was exceeded.
        after: Duration,
    },

    /// The tool panicked.
    #[error("tool {name} panicked")]
    Panicked {
        /// Tool name.
        name: String,
    },
}

/// Error raised while building the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two tools share a name.
    #[error("duplicate tool name: {0}")]
    Duplicate(String),
}

struct Entry {
    descriptor: ToolDescriptor,
    tool: Arc<dyn Tool>,
}

/// Collects tools before the registry is frozen.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: IndexMap<String, Entry>,
    timeout: Option<Duration>,
}

impl ToolRegistryBuilder {
    /// Sets the per-invocation time limit. `None` means unbounded.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if a tool with the same name is already registered.
    pub fn register<T>(&mut self, tool: T) -> Result<&mut Self, RegistryError>
    where
        T: Tool + 'static,
    {
        let descriptor = tool.descriptor();
        if self.entries.contains_key(&descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        self.entries.insert(
            descriptor.name.clone(),
            Entry {
                descriptor,
                tool: Arc::new(tool),
            },
        );
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            entries: self.entries,
            timeout: self.timeout,
        }
    }
}

/// Immutable name → tool table.
pub struct ToolRegistry {
    entries: IndexMap<String, Entry>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.entries.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Tool descriptors in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.entries.values().map(|e| e.descriptor.clone()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invokes a tool by exact name.
    ///
    /// # Errors
    ///
    /// [`ToolError::NotFound`] for unknown names; any other variant means the
    /// tool itself faulted and the cause has already been logged.
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let entry = self.entries.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let call = AssertUnwindSafe(entry.tool.call(arguments)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => {
                if let Ok(outcome) = tokio::time::timeout(limit, call).await {
                    outcome
                } else {
                    tracing::error!(tool = name, timeout = ?limit, "Tool execution timed out");
                    return Err(ToolError::TimedOut {
                        name: name.to_string(),
                        after: limit,
                    });
                }
            }
            None => call.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => {
                tracing::error!(tool = name, error = ?cause, "Tool execution failed");
                Err(ToolError::Failed {
                    name: name.to_string(),
                    cause,
                })
            }
            Err(_) => {
                tracing::error!(tool = name, "Tool panicked");
                Err(ToolError::Panicked {
                    name: name.to_string(),
                })
            }
        }
    }
}
