//! Backend descriptor — the payload of the mobile-code protocol.
//!
//! Only the serialized text form crosses the boundary; descriptor identity
//! is irrelevant and the receiving side reconstructs a fresh object graph
//! from the text every session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One named entry on the backend's surface: either a plain serializable
/// value attached verbatim, or a reference into the receiving side's
/// handler catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum SurfaceEntry {
    /// Catalog reference.
    Handler(String),
    /// Plain value; must round-trip structurally through serialization.
    Value(Value),
}

/// A structured description of a backend: what to expose, what it needs,
/// and how to bring it up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Named surface entries (values and sibling functions).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub surface: BTreeMap<String, SurfaceEntry>,

    /// Remotely-callable functions: name → catalog reference. Registered
    /// into the session's service registry on activation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rpc: BTreeMap<String, String>,

    /// External dependency identifiers, resolved in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    /// Optional initializer, invoked exactly once after dependency
    /// resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
}

impl BackendDescriptor {
    /// Start an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a plain value to the surface.
    pub fn surface_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.surface.insert(name.into(), SurfaceEntry::Value(value));
        self
    }

    /// Attach a catalog-referenced function to the surface.
    pub fn surface_handler(mut self, name: impl Into<String>, handler: impl Into<String>) -> Self {
        self.surface
            .insert(name.into(), SurfaceEntry::Handler(handler.into()));
        self
    }

    /// Expose a catalog-referenced function as remotely callable.
    pub fn rpc(mut self, name: impl Into<String>, handler: impl Into<String>) -> Self {
        self.rpc.insert(name.into(), handler.into());
        self
    }

    /// Declare an external dependency.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }

    /// Declare the initializer.
    pub fn init(mut self, handler: impl Into<String>) -> Self {
        self.init = Some(handler.into());
        self
    }

    /// Render the self-contained text form served to the receiving side.
    pub fn to_install_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reconstruct a descriptor from its text form. Empty text is the empty
    /// descriptor — a session with no registered backend still activates
    /// (trivially) and reaches readiness.
    pub fn from_install_text(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_roundtrip() {
        let descriptor = BackendDescriptor::new()
            .surface_value("version", json!(3))
            .surface_value("labels", json!({"a": [1, 2], "b": "text"}))
            .surface_handler("someFunction", "some_function_impl")
            .rpc("serverCall", "server_call_impl")
            .require("dep")
            .init("init_impl");

        let text = descriptor.to_install_text().unwrap();
        let reconstructed = BackendDescriptor::from_install_text(&text).unwrap();
        assert_eq!(reconstructed, descriptor);
    }

    #[test]
    fn test_empty_text_is_empty_descriptor() {
        let descriptor = BackendDescriptor::from_install_text("").unwrap();
        assert_eq!(descriptor, BackendDescriptor::default());
        let descriptor = BackendDescriptor::from_install_text("  \n").unwrap();
        assert!(descriptor.rpc.is_empty() && descriptor.init.is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let descriptor =
            BackendDescriptor::from_install_text(r#"{"rpc":{"f":"f_impl"}}"#).unwrap();
        assert!(descriptor.surface.is_empty());
        assert!(descriptor.requires.is_empty());
        assert!(descriptor.init.is_none());
        assert_eq!(descriptor.rpc["f"], "f_impl");
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        assert!(BackendDescriptor::from_install_text("return {}").is_err());
        assert!(BackendDescriptor::from_install_text(r#"{"requires": 3}"#).is_err());
    }

    #[test]
    fn test_requires_order_is_preserved() {
        let descriptor = BackendDescriptor::new()
            .require("second-level")
            .require("first-level")
            .require("alpha");
        let text = descriptor.to_install_text().unwrap();
        let reconstructed = BackendDescriptor::from_install_text(&text).unwrap();
        assert_eq!(
            reconstructed.requires,
            vec!["second-level", "first-level", "alpha"]
        );
    }

    #[test]
    fn test_surface_entry_tagging() {
        let descriptor = BackendDescriptor::new()
            .surface_value("plain", json!("data"))
            .surface_handler("func", "func_impl");
        let text = descriptor.to_install_text().unwrap();
        assert!(text.contains(r#""kind":"value""#));
        assert!(text.contains(r#""kind":"handler""#));
    }
}
