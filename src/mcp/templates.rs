//! Primitive shape templates.
//!
//! A small closed set of named shapes maps to the underlying feature type,
//! base profile, and required parameter names. The table is static: adding a
//! shape means adding a row here, not registering a plugin.

use serde_json::{Map, Value};

/// One named shape and the feature call that builds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveTemplate {
    /// Shape name callers use (e.g. `"cylinder"`).
    pub name: &'static str,
    /// Feature type the shape lowers to (e.g. `"extrude"`).
    pub operation: &'static str,
    /// Base sketch profile (e.g. `"circle"`).
    pub base_feature: &'static str,
    /// Parameter names the caller must supply, all of them.
    pub parameters: &'static [&'static str],
}

/// The complete template table.
pub const PRIMITIVE_TEMPLATES: &[PrimitiveTemplate] = &[
    PrimitiveTemplate {
        name: "cylinder",
        operation: "extrude",
        base_feature: "circle",
        parameters: &["radius", "height"],
    },
    PrimitiveTemplate {
        name: "box",
        operation: "extrude",
        base_feature: "rectangle",
        parameters: &["length", "width", "height"],
    },
    PrimitiveTemplate {
        name: "sphere",
        operation: "revolve",
        base_feature: "semicircle",
        parameters: &["radius"],
    },
    PrimitiveTemplate {
        name: "cone",
        operation: "extrude",
        base_feature: "circle",
        parameters: &["base_radius", "top_radius", "height"],
    },
];

/// Looks up a template by shape name.
#[must_use]
pub fn template(name: &str) -> Option<&'static PrimitiveTemplate> {
    PRIMITIVE_TEMPLATES.iter().find(|t| t.name == name)
}

/// Names of all known shapes, for error messages.
#[must_use]
pub fn known_shapes() -> Vec<&'static str> {
    PRIMITIVE_TEMPLATES.iter().map(|t| t.name).collect()
}

impl PrimitiveTemplate {
    /// Returns every declared parameter the provided mapping does not cover.
    #[must_use]
    pub fn missing_parameters(&self, provided: &Map<String, Value>) -> Vec<&'static str> {
        self.parameters
            .iter()
            .filter(|name| !provided.contains_key(**name))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cylinder_lowers_to_circle_extrude() {
        let t = template("cylinder").unwrap();
        assert_eq!(t.operation, "extrude");
        assert_eq!(t.base_feature, "circle");
        assert_eq!(t.parameters, &["radius", "height"]);
    }

    #[test]
    fn sphere_lowers_to_revolve() {
        let t = template("sphere").unwrap();
        assert_eq!(t.operation, "revolve");
        assert_eq!(t.base_feature, "semicircle");
    }

    #[test]
    fn unknown_shape_is_none() {
        assert!(template("torus").is_none());
    }

    #[test]
    fn missing_parameters_are_named() {
        let t = template("cone").unwrap();
        let mut provided = Map::new();
        provided.insert("base_radius".to_string(), json!(10.0));
        let missing = t.missing_parameters(&provided);
        assert_eq!(missing, vec!["top_radius", "height"]);
    }

    #[test]
    fn complete_parameters_have_no_missing() {
        let t = template("cylinder").unwrap();
        let mut provided = Map::new();
        provided.insert("radius".to_string(), json!(25.0));
        provided.insert("height".to_string(), json!(50.0));
        assert!(t.missing_parameters(&provided).is_empty());
    }
}
