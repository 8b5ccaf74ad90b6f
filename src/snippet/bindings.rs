//! The names a snippet finds pre-bound in its namespace.

use serde::Serialize;

/// One pre-bound name: `name` refers to the imported `module`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub name: String,
    pub module: String,
}

/// Ordered allow-list of module bindings handed to every snippet.
///
/// Besides these, every snippet sees `WORKSPACE`, the workspace root as a
/// `pathlib.Path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRegistry {
    bindings: Vec<Binding>,
}

impl BindingRegistry {
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Bind `name` to `module`, replacing an earlier binding of the same name.
    pub fn with(mut self, name: impl Into<String>, module: impl Into<String>) -> Self {
        let binding = Binding {
            name: name.into(),
            module: module.into(),
        };
        match self.bindings.iter_mut().find(|b| b.name == binding.name) {
            Some(existing) => *existing = binding,
            None => self.bindings.push(binding),
        }
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.bindings.retain(|b| b.name != name);
        self
    }

    pub fn as_slice(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for BindingRegistry {
    /// Numeric arrays, tabular data, math, JSON, regular expressions,
    /// date/time, collections, iteration and function-composition helpers.
    fn default() -> Self {
        Self::empty()
            .with("np", "numpy")
            .with("numpy", "numpy")
            .with("pd", "pandas")
            .with("pandas", "pandas")
            .with("math", "math")
            .with("json", "json")
            .with("re", "re")
            .with("datetime", "datetime")
            .with("collections", "collections")
            .with("itertools", "itertools")
            .with("functools", "functools")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_of<'a>(registry: &'a BindingRegistry, name: &str) -> Option<&'a str> {
        registry
            .as_slice()
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.module.as_str())
    }

    #[test]
    fn default_registry_covers_the_curated_set() {
        let registry = BindingRegistry::default();
        let names: Vec<&str> = registry.as_slice().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "np",
                "numpy",
                "pd",
                "pandas",
                "math",
                "json",
                "re",
                "datetime",
                "collections",
                "itertools",
                "functools"
            ]
        );
        assert_eq!(module_of(&registry, "np"), Some("numpy"));
    }

    #[test]
    fn rebinding_a_name_keeps_its_position() {
        let registry = BindingRegistry::empty()
            .with("a", "math")
            .with("b", "json")
            .with("a", "cmath");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.as_slice()[0].module, "cmath");
    }

    #[test]
    fn without_removes_a_binding() {
        let registry = BindingRegistry::default().without("pd").without("pandas");
        assert_eq!(module_of(&registry, "pd"), None);
        assert_eq!(module_of(&registry, "np"), Some("numpy"));
        assert!(BindingRegistry::empty().is_empty());
    }
}
