use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declares one native module the runtime should see.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModuleDescriptor {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    implementation: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    config: Value,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: None,
            config: Value::Null,
        }
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = Some(implementation.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Name exposed to the runtime.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key used to find the module's constructor; defaults to the name.
    pub fn implementation(&self) -> &str {
        self.implementation.as_deref().unwrap_or(&self.name)
    }

    pub fn config(&self) -> &Value {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleDescriptor;
    use serde_json::json;

    #[test]
    fn implementation_defaults_to_name() {
        let descriptor = ModuleDescriptor::new("Clipboard");
        assert_eq!(descriptor.implementation(), "Clipboard");
        let descriptor = descriptor.with_implementation("clipboard_v2");
        assert_eq!(descriptor.implementation(), "clipboard_v2");
        assert_eq!(descriptor.name(), "Clipboard");
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let descriptor: ModuleDescriptor =
            serde_json::from_value(json!({ "name": "Linking" })).expect("descriptor");
        assert_eq!(descriptor, ModuleDescriptor::new("Linking"));
    }
}
