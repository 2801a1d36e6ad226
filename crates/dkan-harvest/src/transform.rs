//! Transform stage
//!
//! Transforms run left to right over each extracted item. The first failure
//! aborts the chain for that item; the error carries the transform's name.

use crate::plan::{HarvestPlan, StageSpec};
use dkan_common::{DkanError, Result};
use serde_json::{Map, Value};

/// A single item rewrite
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, item: Value) -> Result<Value>;
}

/// Apply `transforms` in order, naming the transform that failed
pub fn apply_chain(transforms: &[Box<dyn Transform>], item: Value) -> Result<Value> {
    transforms.iter().try_fold(item, |item, transform| {
        transform.run(item).map_err(|e| {
            let msg = match e {
                DkanError::Transform(msg) => msg,
                other => other.to_string(),
            };
            DkanError::transform(format!("{}: {}", transform.name(), msg))
        })
    })
}

fn as_object(item: Value) -> Result<Map<String, Value>> {
    match item {
        Value::Object(map) => Ok(map),
        other => Err(DkanError::transform(format!("item is not an object: {other}"))),
    }
}

/// Sets top-level properties from the `values` option
#[derive(Debug, Clone)]
pub struct OverrideTransform {
    values: Map<String, Value>,
}

impl OverrideTransform {
    pub fn from_spec(spec: &StageSpec, _plan: &HarvestPlan) -> Result<Self> {
        match spec.option("values") {
            Some(Value::Object(values)) => Ok(Self {
                values: values.clone(),
            }),
            _ => Err(DkanError::invalid_plan(format!(
                "override transform requires an object 'values': {}",
                spec.to_json()
            ))),
        }
    }
}

impl Transform for OverrideTransform {
    fn name(&self) -> &str {
        "override"
    }

    fn run(&self, item: Value) -> Result<Value> {
        let mut map = as_object(item)?;
        for (key, value) in &self.values {
            map.insert(key.clone(), value.clone());
        }
        Ok(Value::Object(map))
    }
}

/// Drops the top-level properties listed in `fields`
#[derive(Debug, Clone)]
pub struct RemoveFieldsTransform {
    fields: Vec<String>,
}

impl RemoveFieldsTransform {
    pub fn from_spec(spec: &StageSpec, _plan: &HarvestPlan) -> Result<Self> {
        let fields = spec
            .option("fields")
            .and_then(Value::as_array)
            .and_then(|fields| {
                fields
                    .iter()
                    .map(|f| f.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                DkanError::invalid_plan(format!(
                    "remove_fields transform requires a string array 'fields': {}",
                    spec.to_json()
                ))
            })?;
        Ok(Self { fields })
    }
}

impl Transform for RemoveFieldsTransform {
    fn name(&self) -> &str {
        "remove_fields"
    }

    fn run(&self, item: Value) -> Result<Value> {
        let mut map = as_object(item)?;
        for field in &self.fields {
            map.remove(field);
        }
        Ok(Value::Object(map))
    }
}

/// Prefixes the item `identifier`
///
/// Without a `prefix` option the plan identifier followed by `-` is used.
#[derive(Debug, Clone)]
pub struct PrefixIdentifierTransform {
    prefix: String,
}

impl PrefixIdentifierTransform {
    pub fn from_spec(spec: &StageSpec, plan: &HarvestPlan) -> Result<Self> {
        let prefix = spec
            .option_str("prefix")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-", plan.identifier));
        Ok(Self { prefix })
    }
}

impl Transform for PrefixIdentifierTransform {
    fn name(&self) -> &str {
        "prefix_identifier"
    }

    fn run(&self, item: Value) -> Result<Value> {
        let mut map = as_object(item)?;
        let id = match map.get("identifier") {
            Some(Value::String(id)) => id.clone(),
            _ => return Err(DkanError::transform("item has no string 'identifier'")),
        };
        if !id.starts_with(&self.prefix) {
            map.insert("identifier".into(), Value::String(format!("{}{}", self.prefix, id)));
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan() -> HarvestPlan {
        HarvestPlan::from_value(json!({
            "identifier": "city",
            "extract": {"type": "data_json", "uri": "x"},
            "load": {"type": "dataset"}
        }))
        .unwrap()
    }

    fn spec(value: Value) -> StageSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_override_sets_values() {
        let t = OverrideTransform::from_spec(
            &spec(json!({"type": "override", "values": {"publisher": "City"}})),
            &plan(),
        )
        .unwrap();
        let out = t.run(json!({"identifier": "1", "publisher": "Old"})).unwrap();
        assert_eq!(out["publisher"], "City");
    }

    #[test]
    fn test_override_requires_values() {
        let err = OverrideTransform::from_spec(&spec(json!({"type": "override"})), &plan())
            .unwrap_err();
        assert!(matches!(err, DkanError::InvalidPlan(_)));
    }

    #[test]
    fn test_remove_fields() {
        let t = RemoveFieldsTransform::from_spec(
            &spec(json!({"type": "remove_fields", "fields": ["spatial", "temporal"]})),
            &plan(),
        )
        .unwrap();
        let out = t
            .run(json!({"identifier": "1", "spatial": "x", "temporal": "y", "title": "t"}))
            .unwrap();
        assert_eq!(out, json!({"identifier": "1", "title": "t"}));
    }

    #[test]
    fn test_prefix_defaults_to_plan_identifier() {
        let t = PrefixIdentifierTransform::from_spec(&spec(json!({"type": "prefix_identifier"})), &plan())
            .unwrap();
        let out = t.run(json!({"identifier": "42"})).unwrap();
        assert_eq!(out["identifier"], "city-42");
        // Already prefixed items are left alone
        assert_eq!(t.run(out.clone()).unwrap(), out);
    }

    #[test]
    fn test_chain_is_ordered_and_names_failure() {
        let p = plan();
        let chain: Vec<Box<dyn Transform>> = vec![
            Box::new(
                OverrideTransform::from_spec(
                    &spec(json!({"type": "override", "values": {"identifier": 7}})),
                    &p,
                )
                .unwrap(),
            ),
            Box::new(PrefixIdentifierTransform::from_spec(&spec(json!({"type": "prefix_identifier"})), &p).unwrap()),
        ];

        let err = apply_chain(&chain, json!({"identifier": "1"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transform error: prefix_identifier: item has no string 'identifier'"
        );
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let item = json!({"identifier": "1"});
        assert_eq!(apply_chain(&[], item.clone()).unwrap(), item);
    }
}
