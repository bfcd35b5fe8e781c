//! Reusable SQL fragments referenced by `Include` nodes

use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::template::TemplateNode;
use crate::token::replace_tokens;

/// Fragment bodies keyed by fully qualified id (`namespace.id`)
#[derive(Debug, Clone, Default)]
pub struct FragmentRegistry {
    fragments: HashMap<String, Vec<TemplateNode>>,
}

impl FragmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment under `id` qualified by `namespace`; returns the
    /// body it replaced, if any
    pub fn register(
        &mut self,
        namespace: Option<&str>,
        id: &str,
        body: Vec<TemplateNode>,
    ) -> Option<Vec<TemplateNode>> {
        let id = qualify(id, namespace);
        debug!(fragment = %id, "registering SQL fragment");
        self.fragments.insert(id, body)
    }

    pub fn get(&self, qualified_id: &str) -> Option<&[TemplateNode]> {
        self.fragments.get(qualified_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Qualify a reference with the current namespace unless it already is
pub fn qualify(refid: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !refid.contains('.') => format!("{}.{}", ns, refid),
        _ => refid.to_string(),
    }
}

/// Substitute `${name}` placeholders from include properties; unknown names
/// are left untouched so they can still be evaluated at render time
pub fn substitute_properties(text: &str, properties: &HashMap<String, String>) -> Result<String> {
    if properties.is_empty() {
        return Ok(text.to_string());
    }
    replace_tokens(text, "${", "}", |name| {
        Ok(match properties.get(name.trim()) {
            Some(value) => value.clone(),
            None => format!("${{{}}}", name),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("cols", Some("user")), "user.cols");
        assert_eq!(qualify("other.cols", Some("user")), "other.cols");
        assert_eq!(qualify("cols", None), "cols");
    }

    #[test]
    fn test_registry_lookup_is_qualified() {
        let mut reg = FragmentRegistry::new();
        reg.register(Some("user"), "cols", vec![TemplateNode::text("id, name")]);
        assert!(reg.get("user.cols").is_some());
        assert!(reg.get("cols").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_substitute_properties() {
        let props = HashMap::from([("alias".to_string(), "u".to_string())]);
        assert_eq!(
            substitute_properties("${alias}.id, ${other}", &props).unwrap(),
            "u.id, ${other}"
        );
        assert_eq!(
            substitute_properties("${alias}", &HashMap::new()).unwrap(),
            "${alias}"
        );
    }
}
