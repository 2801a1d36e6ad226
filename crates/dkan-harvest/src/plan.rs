//! Harvest plan documents
//!
//! A plan is plain JSON:
//!
//! ```json
//! {
//!   "identifier": "city",
//!   "extract": {"type": "data_json", "uri": "https://data.example.gov/data.json"},
//!   "transforms": [{"type": "remove_fields", "fields": ["spatial"]}],
//!   "load": {"type": "dataset"}
//! }
//! ```
//!
//! Any key besides `type` and `uri` on a stage is kept as a stage option.

use dkan_common::{DkanError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One stage of a plan: its registered type plus free-form options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StageSpec {
    pub fn new(stage_type: impl Into<String>) -> Self {
        Self {
            stage_type: stage_type.into(),
            uri: None,
            options: Map::new(),
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// The spec as compact JSON, for error messages
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"type\":\"{}\"}}", self.stage_type))
    }
}

/// A validated harvest plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestPlan {
    pub identifier: String,
    pub extract: StageSpec,
    #[serde(default)]
    pub transforms: Vec<StageSpec>,
    pub load: StageSpec,
}

impl HarvestPlan {
    /// Parse and structurally validate a plan
    ///
    /// Errors name the stage that is missing or malformed along with its JSON.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(ref obj) = value else {
            return Err(DkanError::invalid_plan(format!(
                "plan must be a JSON object, got {value}"
            )));
        };

        match obj.get("identifier").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => {}
            _ => {
                return Err(DkanError::invalid_plan(
                    "plan is missing a non-empty string 'identifier'",
                ))
            }
        }

        check_stage("extract", obj.get("extract"))?;
        check_stage("load", obj.get("load"))?;

        match obj.get("transforms") {
            None | Some(Value::Null) => {}
            Some(Value::Array(transforms)) => {
                for (i, transform) in transforms.iter().enumerate() {
                    check_stage(&format!("transforms[{i}]"), Some(transform))?;
                }
            }
            Some(other) => {
                return Err(DkanError::invalid_plan(format!(
                    "'transforms' must be an array, got {other}"
                )))
            }
        }

        let mut plan: HarvestPlan = serde_json::from_value(value)
            .map_err(|e| DkanError::invalid_plan(e.to_string()))?;
        plan.identifier = plan.identifier.trim().to_string();
        Ok(plan)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DkanError::invalid_plan(format!("plan is not valid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn check_stage(stage: &str, spec: Option<&Value>) -> Result<()> {
    let Some(spec) = spec else {
        return Err(DkanError::invalid_plan(format!("missing '{stage}' stage")));
    };
    let has_type = spec
        .as_object()
        .and_then(|o| o.get("type"))
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_type {
        return Err(DkanError::invalid_plan(format!(
            "'{stage}' stage must be an object with a string 'type': {spec}"
        )));
    }
    if let Some(uri) = spec.get("uri") {
        if !uri.is_string() {
            return Err(DkanError::invalid_plan(format!(
                "'{stage}' stage has a non-string 'uri': {spec}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan_json() -> Value {
        json!({
            "identifier": "city",
            "extract": {"type": "data_json", "uri": "file:///tmp/data.json", "collection": "dataset"},
            "transforms": [{"type": "remove_fields", "fields": ["spatial"]}],
            "load": {"type": "dataset"}
        })
    }

    #[test]
    fn test_parse_plan_keeps_options() {
        let plan = HarvestPlan::from_value(plan_json()).unwrap();
        assert_eq!(plan.identifier, "city");
        assert_eq!(plan.extract.stage_type, "data_json");
        assert_eq!(plan.extract.uri.as_deref(), Some("file:///tmp/data.json"));
        assert_eq!(plan.extract.option_str("collection"), Some("dataset"));
        assert_eq!(plan.transforms[0].option("fields"), Some(&json!(["spatial"])));
    }

    #[test]
    fn test_plan_round_trips_to_same_json() {
        let plan = HarvestPlan::from_value(plan_json()).unwrap();
        assert_eq!(plan.to_value().unwrap(), plan_json());
    }

    #[test]
    fn test_transforms_optional() {
        let plan = HarvestPlan::from_value(json!({
            "identifier": "x",
            "extract": {"type": "data_json", "uri": "a"},
            "load": {"type": "dataset"}
        }))
        .unwrap();
        assert!(plan.transforms.is_empty());
    }

    #[test]
    fn test_rejects_non_object() {
        let err = HarvestPlan::from_value(json!("plan")).unwrap_err();
        assert!(matches!(err, DkanError::InvalidPlan(_)));
        assert!(err.to_string().contains("\"plan\""));
    }

    #[test]
    fn test_rejects_missing_load_type() {
        let mut plan = plan_json();
        plan["load"] = json!({"kind": "dataset"});
        let err = HarvestPlan::from_value(plan).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'load'"), "{msg}");
        assert!(msg.contains("{\"kind\":\"dataset\"}"), "{msg}");
    }

    #[test]
    fn test_rejects_malformed_transform() {
        let mut plan = plan_json();
        plan["transforms"] = json!([{"type": "override"}, "prefix"]);
        let msg = HarvestPlan::from_value(plan).unwrap_err().to_string();
        assert!(msg.contains("transforms[1]"), "{msg}");
    }

    #[test]
    fn test_rejects_blank_identifier() {
        let mut plan = plan_json();
        plan["identifier"] = json!("  ");
        assert!(HarvestPlan::from_value(plan).is_err());
    }

    #[test]
    fn test_from_json_reports_syntax_errors() {
        let err = HarvestPlan::from_json("{not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}
