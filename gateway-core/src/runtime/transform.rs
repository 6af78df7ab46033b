// gateway-core/src/runtime/transform.rs
// ============================================================================
// Module: Gateway Transform Engine
// Description: C6 — PASSTHROUGH/SIMPLE declarative mapping and lookup resolution.
// Purpose: Apply ordered mappings, static fields, and post-transform lookups to a payload.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! `SCRIPT` mode is not implemented here; it runs through [`crate::interfaces::Sandbox`]
//! directly in the delivery pipeline. This module implements `PASSTHROUGH` and
//! `SIMPLE`: an ordered list of [`crate::core::Mapping`] plus
//! [`crate::core::StaticField`]s, followed by the post-transform lookup pass.
//!
//! Path language: dotted identifiers, `[n]` indices, and a trailing `[]`
//! meaning "apply to each element of the array".

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::LookupTable;
use crate::core::Mapping;
use crate::core::StaticField;
use crate::core::Transform;
use crate::core::lookup;

// ============================================================================
// SECTION: Path Language
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
    EachElement,
}

fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    for raw in path.split('.') {
        let mut rest = raw;
        while let Some(open) = rest.find('[') {
            let key = &rest[..open];
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_string()));
            }
            let close = rest[open..].find(']').map_or(rest.len(), |i| open + i);
            let inside = &rest[open + 1..close];
            if inside.is_empty() {
                segments.push(PathSegment::EachElement);
            } else if let Ok(index) = inside.parse::<usize>() {
                segments.push(PathSegment::Index(index));
            }
            rest = &rest[(close + 1).min(rest.len())..];
        }
        if !rest.is_empty() {
            segments.push(PathSegment::Key(rest.to_string()));
        }
    }
    segments
}

/// Reads `path` from `root`. Returns `None` for any missing segment, matching
/// the spec's "missing source fields become undefined" rule. `[]` ("each
/// element") paths read only the first matching element's continuation here;
/// full fan-out is handled by [`read_path_each`].
#[must_use]
pub fn read_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    let segments = parse_path(path);
    let mut current = root;
    for segment in &segments {
        current = match segment {
            PathSegment::Key(key) => current.get(key)?,
            PathSegment::Index(index) => current.get(*index)?,
            PathSegment::EachElement => return None,
        };
    }
    Some(current)
}

/// Returns the set of values read by a path containing a trailing `[]`
/// segment, applied to every element of the array at that point. Returns
/// `None` when the path contains no `EachElement` segment (use [`read_path`]
/// instead) or when the array-valued prefix is missing.
fn read_path_each<'v>(root: &'v Value, path: &str) -> Option<Vec<&'v Value>> {
    let segments = parse_path(path);
    let each_index = segments.iter().position(|s| *s == PathSegment::EachElement)?;
    let mut current = root;
    for segment in &segments[..each_index] {
        current = match segment {
            PathSegment::Key(key) => current.get(key)?,
            PathSegment::Index(index) => current.get(*index)?,
            PathSegment::EachElement => unreachable!("each_index is the first EachElement"),
        };
    }
    let array = current.as_array()?;
    let tail = &segments[each_index + 1..];
    Some(
        array
            .iter()
            .filter_map(|element| {
                let mut el = element;
                for segment in tail {
                    el = match segment {
                        PathSegment::Key(key) => el.get(key)?,
                        PathSegment::Index(index) => el.get(*index)?,
                        PathSegment::EachElement => return None,
                    };
                }
                Some(el)
            })
            .collect(),
    )
}

/// Writes `value` at `path` within `root`, creating intermediate objects/arrays as needed.
pub fn write_path(root: &mut Value, path: &str, value: Value) {
    let segments = parse_path(path);
    write_segments(root, &segments, value);
}

fn write_segments(current: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *current = value;
        return;
    };
    match head {
        PathSegment::Key(key) => {
            if !current.is_object() {
                *current = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(map) = current {
                let entry = map.entry(key.clone()).or_insert(Value::Null);
                write_segments(entry, rest, value);
            }
        }
        PathSegment::Index(index) => {
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            if let Value::Array(array) = current {
                while array.len() <= *index {
                    array.push(Value::Null);
                }
                write_segments(&mut array[*index], rest, value);
            }
        }
        PathSegment::EachElement => {
            // No defined target: write paths never address an each-element segment.
        }
    }
}

// ============================================================================
// SECTION: Transform Engine
// ============================================================================

/// Errors raised applying a declarative transform.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    /// A `LOOKUP` transform or post-transform lookup pass failed with `unmappedBehavior=FAIL`.
    #[error("lookup failed for path {0:?}: {1}")]
    LookupFailed(String, String),
    /// A referenced lookup table was not found.
    #[error("lookup table not found for type {0:?}")]
    MissingLookupTable(String),
}

/// Applies `PASSTHROUGH`/`SIMPLE` transforms to an input payload.
#[derive(Debug, Default)]
pub struct TransformEngine;

impl TransformEngine {
    /// Returns `input` unchanged.
    #[must_use]
    pub fn passthrough(input: &Value) -> Value {
        input.clone()
    }

    /// Applies an ordered list of mappings and static fields to `input`,
    /// producing a new output document. Lookup resolution for `Transform::Lookup`
    /// values requires a table resolver closure; callers without any
    /// `LOOKUP` transforms in their mapping list may pass a resolver that
    /// always errors.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] when a `LOOKUP` transform cannot resolve
    /// and the table's `unmappedBehavior = FAIL`, or when the referenced
    /// table is missing.
    pub fn apply_simple(
        input: &Value,
        mappings: &[Mapping],
        static_fields: &[StaticField],
        resolve_lookup: &dyn Fn(&str) -> Option<Vec<LookupTable>>,
    ) -> Result<Value, TransformError> {
        let mut output = Value::Object(serde_json::Map::new());

        for mapping in mappings {
            let source_path = &mapping.source_path;
            if source_path.contains("[]") {
                if let Some(values) = read_path_each(input, source_path) {
                    let transformed: Result<Vec<Value>, TransformError> = values
                        .into_iter()
                        .map(|v| Self::apply_transform(v.clone(), &mapping.transform, resolve_lookup))
                        .collect();
                    write_path(&mut output, &mapping.target_path, Value::Array(transformed?));
                    continue;
                }
            }
            let source_value = read_path(input, source_path).cloned();
            let transformed = Self::apply_transform(
                source_value.unwrap_or(Value::Null),
                &mapping.transform,
                resolve_lookup,
            )?;
            write_path(&mut output, &mapping.target_path, transformed);
        }

        for field in static_fields {
            write_path(&mut output, &field.key, field.value.clone());
        }

        Ok(output)
    }

    fn apply_transform(
        value: Value,
        transform: &Transform,
        resolve_lookup: &dyn Fn(&str) -> Option<Vec<LookupTable>>,
    ) -> Result<Value, TransformError> {
        let is_empty = matches!(&value, Value::Null) || matches!(&value, Value::String(s) if s.is_empty());
        match transform {
            Transform::None => Ok(value),
            Transform::Trim => Ok(match value {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => other,
            }),
            Transform::Upper => Ok(match value {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            }),
            Transform::Lower => Ok(match value {
                Value::String(s) => Value::String(s.to_lowercase()),
                other => other,
            }),
            Transform::DateIso => Ok(value),
            Transform::Default { value: default_value } => {
                if is_empty {
                    Ok(default_value.clone())
                } else {
                    Ok(value)
                }
            }
            Transform::Lookup { lookup_type } => {
                let Value::String(code) = &value else {
                    return Ok(value);
                };
                let chain = resolve_lookup(lookup_type)
                    .ok_or_else(|| TransformError::MissingLookupTable(lookup_type.clone()))?;
                let refs: Vec<&LookupTable> = chain.iter().collect();
                lookup::resolve_hierarchical(&refs, code)
                    .map_err(|err| TransformError::LookupFailed(lookup_type.clone(), err.to_string()))
            }
        }
    }

    /// Applies the post-transform lookup pass (for `SIMPLE` mode):
    /// for each [`crate::core::LookupSpec`], reads `sourceField` from
    /// `output`, resolves it, and writes the result to `targetField`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] on an unresolvable `FAIL`-policy lookup or
    /// missing table.
    pub fn apply_lookup_pass(
        output: &mut Value,
        lookups: &[crate::core::LookupSpec],
        resolve_lookup: &dyn Fn(&str) -> Option<Vec<LookupTable>>,
    ) -> Result<(), TransformError> {
        for spec in lookups {
            let Some(Value::String(code)) = read_path(output, &spec.source_field).cloned() else {
                continue;
            };
            let chain = resolve_lookup(&spec.lookup_type)
                .ok_or_else(|| TransformError::MissingLookupTable(spec.lookup_type.clone()))?;
            let refs: Vec<&LookupTable> = chain.iter().collect();
            let resolved = lookup::resolve_hierarchical(&refs, &code)
                .map_err(|err| TransformError::LookupFailed(spec.lookup_type.clone(), err.to_string()))?;
            write_path(output, &spec.target_field, resolved);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TenantId;

    fn no_lookups(_: &str) -> Option<Vec<LookupTable>> {
        None
    }

    #[test]
    fn passthrough_is_identity() {
        let input = serde_json::json!({"visitId": "V1"});
        assert_eq!(TransformEngine::passthrough(&input), input);
    }

    #[test]
    fn simple_projects_mapped_keys_with_identity_mappings() {
        let input = serde_json::json!({"visitId": "V1", "ignored": "x"});
        let mappings = vec![Mapping {
            target_path: "visit_id".to_string(),
            source_path: "visitId".to_string(),
            transform: Transform::None,
        }];
        let output = TransformEngine::apply_simple(&input, &mappings, &[], &no_lookups).unwrap();
        assert_eq!(output, serde_json::json!({"visit_id": "V1"}));
    }

    #[test]
    fn default_transform_substitutes_on_empty_source() {
        let input = serde_json::json!({});
        let mappings = vec![Mapping {
            target_path: "status".to_string(),
            source_path: "status".to_string(),
            transform: Transform::Default {
                value: serde_json::json!("UNKNOWN"),
            },
        }];
        let output = TransformEngine::apply_simple(&input, &mappings, &[], &no_lookups).unwrap();
        assert_eq!(output["status"], serde_json::json!("UNKNOWN"));
    }

    #[test]
    fn each_element_path_maps_array() {
        let input = serde_json::json!({"items": [{"code": "a"}, {"code": "b"}]});
        let mappings = vec![Mapping {
            target_path: "codes".to_string(),
            source_path: "items[].code".to_string(),
            transform: Transform::Upper,
        }];
        let output = TransformEngine::apply_simple(&input, &mappings, &[], &no_lookups).unwrap();
        assert_eq!(output["codes"], serde_json::json!(["A", "B"]));
    }

    #[test]
    fn lookup_transform_resolves_hierarchically() {
        let input = serde_json::json!({"deptCode": "X"});
        let mappings = vec![Mapping {
            target_path: "department".to_string(),
            source_path: "deptCode".to_string(),
            transform: Transform::Lookup {
                lookup_type: "department_code".to_string(),
            },
        }];
        let parent = LookupTable {
            tenant_id: TenantId::new("parent"),
            lookup_type: "department_code".to_string(),
            entries: [("X".to_string(), serde_json::json!("Cardiology"))].into(),
            unmapped_behavior: crate::core::UnmappedBehavior::Passthrough,
        };
        let resolver = |lookup_type: &str| -> Option<Vec<LookupTable>> {
            if lookup_type == "department_code" {
                Some(vec![parent.clone()])
            } else {
                None
            }
        };
        let output = TransformEngine::apply_simple(&input, &mappings, &[], &resolver).unwrap();
        assert_eq!(output["department"], serde_json::json!("Cardiology"));
    }
}
