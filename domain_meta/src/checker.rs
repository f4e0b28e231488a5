//! Shape rules for JSON extra columns
//!
//! A rule constrains one key of an extra document. Scalars must agree with
//! the rule kind, arrays are checked element-wise against positional
//! sub-rules and objects are checked key-wise against named sub-rules.
//! Keys without a rule are ignored.

use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use type_mapping::DataKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraRule {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: DataKind,
    /// Member rules when `kind` is an object
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub object: HashMap<String, ExtraRule>,
    /// Positional element rules when `kind` is an array
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array: Vec<ExtraRule>,
}

impl ExtraRule {
    pub fn new(key: impl Into<String>, kind: DataKind) -> Self {
        Self {
            key: key.into(),
            kind,
            object: HashMap::new(),
            array: Vec::new(),
        }
    }

    pub fn with_member(mut self, rule: ExtraRule) -> Self {
        self.object.insert(rule.key.clone(), rule);
        self
    }

    pub fn with_element(mut self, rule: ExtraRule) -> Self {
        self.array.push(rule);
        self
    }

    fn mismatch(&self, value_type: &str, value: impl std::fmt::Display) -> String {
        format!(
            "rule(key={},type={}) dismatch value(type={},value={})",
            self.key, self.kind, value_type, value
        )
    }
}

/// Check an extra column's text against its top-level rules
pub fn check_extra(rules: &HashMap<String, ExtraRule>, extra: &str) -> Result<(), DomainError> {
    let data: serde_json::Map<String, Json> =
        serde_json::from_str(extra).map_err(|e| DomainError::Json(e.to_string()))?;
    for (key, value) in &data {
        let Some(rule) = rules.get(key) else {
            continue;
        };
        check_value(rule, value).map_err(DomainError::ExtraMismatch)?;
    }
    Ok(())
}

/// Check one JSON value against a rule, returning the diagnostic on mismatch
pub fn check_value(rule: &ExtraRule, value: &Json) -> Result<(), String> {
    match value {
        Json::Null => {
            if rule.kind != DataKind::Array && rule.kind != DataKind::Object {
                return Err(format!(
                    "rule(key={},type={}) dismatch value(type=nil)",
                    rule.key, rule.kind
                ));
            }
        }
        Json::Object(members) => {
            for (key, member) in members {
                let Some(sub) = rule.object.get(key) else {
                    continue;
                };
                check_value(sub, member).map_err(|e| {
                    format!(
                        "rule(key={},type={}), value(type=map[{}],suberror={})",
                        rule.key, rule.kind, key, e
                    )
                })?;
            }
        }
        Json::Array(items) => {
            if rule.kind != DataKind::Array {
                return Err(rule.mismatch("array", value));
            }
            for (i, item) in items.iter().enumerate() {
                let Some(sub) = rule.array.get(i) else {
                    continue;
                };
                check_value(sub, item).map_err(|e| {
                    format!(
                        "rule(key={},type={}), value(type=array,[{}] element suberror={})",
                        rule.key, rule.kind, i, e
                    )
                })?;
            }
        }
        Json::String(s) => {
            if rule.kind != DataKind::String {
                return Err(rule.mismatch("string", format!("{s:?}")));
            }
        }
        Json::Number(n) => {
            if !rule.kind.is_numeric() || rule.kind == DataKind::Bit {
                return Err(rule.mismatch("float/int", n));
            }
            let whole = n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0);
            if rule.kind.is_integer() && !whole {
                return Err(rule.mismatch("float", n));
            }
        }
        Json::Bool(b) => {
            if rule.kind != DataKind::Bool {
                return Err(rule.mismatch("bool", b));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn profile_rules() -> HashMap<String, ExtraRule> {
        let mut rules = HashMap::new();
        rules.insert("gender".into(), ExtraRule::new("gender", DataKind::String));
        rules.insert("career".into(), ExtraRule::new("career", DataKind::String));
        rules.insert("level".into(), ExtraRule::new("level", DataKind::Int));
        rules.insert(
            "tags".into(),
            ExtraRule::new("tags", DataKind::Array)
                .with_element(ExtraRule::new("0", DataKind::String))
                .with_element(ExtraRule::new("1", DataKind::Int)),
        );
        rules.insert(
            "address".into(),
            ExtraRule::new("address", DataKind::Object)
                .with_member(ExtraRule::new("city", DataKind::String))
                .with_member(ExtraRule::new("zip", DataKind::Int)),
        );
        rules
    }

    #[test]
    fn accepts_matching_document() {
        let extra = r#"{"gender":"F","career":"singer","level":3,"tags":["a",2,true],
                        "address":{"city":"x","zip":100,"street":"ignored"},"unknown":[1]}"#;
        assert!(check_extra(&profile_rules(), extra).is_ok());
    }

    #[test]
    fn rejects_number_for_string_rule() {
        let err = check_extra(&profile_rules(), r#"{"gender":"F","career":42}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "rule(key=career,type=FieldString) dismatch value(type=float/int,value=42)"
        );
    }

    #[test]
    fn integer_rules_need_whole_numbers() {
        assert!(check_extra(&profile_rules(), r#"{"level":3.0}"#).is_ok());
        let err = check_extra(&profile_rules(), r#"{"level":3.5}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "rule(key=level,type=FieldInt) dismatch value(type=float,value=3.5)"
        );
    }

    #[test]
    fn nested_errors_name_the_path() {
        let err = check_extra(&profile_rules(), r#"{"address":{"zip":"100"}}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "rule(key=address,type=FieldObject), value(type=map[zip],suberror=rule(key=zip,type=FieldInt) dismatch value(type=string,value=\"100\"))"
        );

        let err = check_extra(&profile_rules(), r#"{"tags":["a","b"]}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "rule(key=tags,type=FieldArray), value(type=array,[1] element suberror=rule(key=1,type=FieldInt) dismatch value(type=string,value=\"b\"))"
        );
    }

    #[test]
    fn null_only_fits_containers() {
        let rules = profile_rules();
        assert!(check_value(&rules["tags"], &Json::Null).is_ok());
        assert!(check_value(&rules["address"], &Json::Null).is_ok());
        assert_eq!(
            check_value(&rules["gender"], &Json::Null).unwrap_err(),
            "rule(key=gender,type=FieldString) dismatch value(type=nil)"
        );
    }

    #[test]
    fn array_value_needs_array_rule() {
        let rules = profile_rules();
        let err = check_value(&rules["gender"], &json!(["F"])).unwrap_err();
        assert_eq!(
            err,
            "rule(key=gender,type=FieldString) dismatch value(type=array,value=[\"F\"])"
        );
        assert!(check_value(&rules["level"], &json!(true)).is_err());
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert!(matches!(
            check_extra(&profile_rules(), "[1,2]"),
            Err(DomainError::Json(_))
        ));
    }

    #[test]
    fn rules_deserialize_from_json() {
        let rule: ExtraRule = serde_json::from_value(json!({
            "key": "address",
            "type": "object",
            "object": {"city": {"key": "city", "type": "FieldString"}}
        }))
        .unwrap();
        assert_eq!(rule.kind, DataKind::Object);
        assert_eq!(rule.object["city"].kind, DataKind::String);
    }
}
