//! Projection of NETCONF requests onto gNMI requests.
//!
//! Covers capability-namespace parsing, XPath to gNMI path conversion and
//! the attribute-stripping XML to JSON transform used for `<edit-config>`
//! payloads.

use std::collections::HashMap;
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;
use tonic::Code;

use netconf_bridge_proto::gnmi::{
    typed_value, GetRequest, GetResponse, ModelData, Path, PathElem, SetRequest, TypedValue,
    Update,
};

use crate::message::{EditConfigRequest, GetConfigRequest, ParseError};

/// Errors produced while translating a NETCONF request into a gNMI request
/// or projecting the response back. Every variant is expressible as an
/// `<rpc-error>`.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("get-config filter must be xpath")]
    FilterUnsupported,

    #[error("namespace tail does not contain proper format target:name:version: {0}")]
    NamespaceFormat(String),

    #[error("namespace of config not in capabilities")]
    NamespaceNotInCapabilities,

    #[error("unexpected gNMI response shape: {0}")]
    UnexpectedCardinality(String),

    #[error("unknown message type received")]
    UnknownMessage,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranslateError {
    /// gRPC status code used as the `<error-type>` of the resulting
    /// `<rpc-error>`.
    pub fn code(&self) -> Code {
        match self {
            TranslateError::FilterUnsupported
            | TranslateError::NamespaceFormat(_)
            | TranslateError::NamespaceNotInCapabilities
            | TranslateError::Parse(_) => Code::InvalidArgument,
            TranslateError::UnexpectedCardinality(_) | TranslateError::Json(_) => Code::Internal,
            TranslateError::UnknownMessage => Code::Unimplemented,
        }
    }
}

/// A `target:name:version` model identity parsed from a capability URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub target: String,
    pub name: String,
    pub version: String,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.target, self.name, self.version)
    }
}

/// Parse the trailing slash segment of a capability URI as
/// `target:name:version`. The tail must carry at least three colon-separated
/// fields; the last three are used.
pub fn parse_namespace(ns: &str) -> Result<Namespace, TranslateError> {
    let tail = ns.rsplit('/').next().unwrap_or(ns);
    let fields: Vec<&str> = tail.split(':').collect();
    if fields.len() < 3 {
        return Err(TranslateError::NamespaceFormat(ns.to_string()));
    }

    Ok(Namespace {
        target: fields[fields.len() - 3].to_string(),
        name: fields[fields.len() - 2].to_string(),
        version: fields[fields.len() - 1].to_string(),
    })
}

/// Convert an XPath string into a gNMI path with the given target.
///
/// Slash-separated elements become `PathElem`s; bracketed predicates such as
/// `interface[name=eth0]` become path-element keys.
pub fn xpath_to_path(xpath: &str, target: &str) -> Path {
    let mut elems = Vec::new();

    for segment in xpath.split('/').filter(|s| !s.is_empty()) {
        let (name, key) = parse_path_segment(segment);
        elems.push(PathElem { name, key });
    }

    Path {
        elem: elems,
        target: target.to_string(),
        ..Default::default()
    }
}

fn parse_path_segment(segment: &str) -> (String, HashMap<String, String>) {
    // Parse "interface[name=eth0]" into ("interface", {"name": "eth0"})
    if let Some(bracket_pos) = segment.find('[') {
        let name = segment[..bracket_pos].to_string();
        let keys_str = segment[bracket_pos + 1..]
            .strip_suffix(']')
            .unwrap_or(&segment[bracket_pos + 1..]);
        let mut keys = HashMap::new();

        for key_val in keys_str.split(',') {
            if let Some((k, v)) = key_val.split_once('=') {
                keys.insert(k.trim().to_string(), v.trim().to_string());
            }
        }

        (name, keys)
    } else {
        (segment.to_string(), HashMap::new())
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// The `xmlns` of the first element under `<config>`, if present.
pub fn config_namespace(config_xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(config_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) | Event::Empty(e) => {
                return e
                    .try_get_attribute("xmlns")
                    .ok()
                    .flatten()
                    .and_then(|a| a.unescape_value().ok())
                    .map(|v| v.into_owned());
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Transform a config XML fragment into its canonical JSON form.
///
/// Attributes (including namespace declarations) are stripped; elements
/// become objects keyed by local name, repeated siblings become arrays, and
/// leaf text becomes a string.
pub fn config_to_json(config_xml: &str) -> Result<Value, ParseError> {
    let mut reader = Reader::from_str(config_xml);
    reader.config_mut().trim_text(true);

    let mut root = Map::new();
    loop {
        match reader
            .read_event()
            .map_err(|e| ParseError::Xml(e.to_string()))?
        {
            Event::Start(e) => {
                let name = local_name(&e);
                let value = element_to_json(&mut reader)?;
                insert_child(&mut root, name, value);
            }
            Event::Empty(e) => {
                insert_child(&mut root, local_name(&e), Value::String(String::new()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Value::Object(root))
}

fn element_to_json(reader: &mut Reader<&[u8]>) -> Result<Value, ParseError> {
    let mut children = Map::new();
    let mut text = String::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| ParseError::Xml(e.to_string()))?
        {
            Event::Start(e) => {
                let name = local_name(&e);
                let value = element_to_json(reader)?;
                insert_child(&mut children, name, value);
            }
            Event::Empty(e) => {
                insert_child(&mut children, local_name(&e), Value::String(String::new()));
            }
            Event::Text(t) => {
                text.push_str(&t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?);
            }
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::Xml("unexpected end of document".to_string())),
            _ => {}
        }
    }

    if children.is_empty() {
        Ok(Value::String(text))
    } else {
        Ok(Value::Object(children))
    }
}

fn insert_child(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        None => {
            map.insert(name, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Project a parsed `<get-config>` onto a gNMI `GetRequest`.
pub fn build_get_request(
    request: &GetConfigRequest,
) -> Result<(GetRequest, Namespace), TranslateError> {
    if request.filter.filter_type != "xpath" {
        return Err(TranslateError::FilterUnsupported);
    }

    let namespace = parse_namespace(&request.filter.xmlns)?;
    let path = xpath_to_path(&request.filter.select, &namespace.target);

    let get = GetRequest {
        prefix: Some(Path {
            target: namespace.target.clone(),
            ..Default::default()
        }),
        path: vec![path],
        use_models: vec![ModelData {
            name: namespace.name.clone(),
            version: namespace.version.clone(),
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok((get, namespace))
}

/// Project a parsed `<edit-config>` onto a gNMI `SetRequest`.
///
/// The payload namespace is the `xmlns` of the first element under
/// `<config>`; it must be one of the advertised capability URIs.
pub fn build_set_request(
    request: &EditConfigRequest,
    capabilities: &[String],
) -> Result<(SetRequest, Namespace), TranslateError> {
    let xmlns =
        config_namespace(&request.config).ok_or(TranslateError::NamespaceNotInCapabilities)?;
    if !capabilities.iter().any(|c| c == &xmlns) {
        return Err(TranslateError::NamespaceNotInCapabilities);
    }

    let namespace = parse_namespace(&xmlns)?;
    let json = config_to_json(&request.config)?;
    let json_bytes = serde_json::to_vec(&json)?;

    let set = SetRequest {
        prefix: Some(Path {
            target: namespace.target.clone(),
            ..Default::default()
        }),
        update: vec![Update {
            path: Some(Path::default()),
            val: Some(TypedValue {
                value: Some(typed_value::Value::JsonVal(json_bytes)),
            }),
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok((set, namespace))
}

/// Extract the JSON payload of a `GetResponse` holding exactly one
/// notification with exactly one JSON-typed update.
pub fn single_json_update(response: &GetResponse) -> Result<String, TranslateError> {
    if response.notification.len() != 1 {
        return Err(TranslateError::UnexpectedCardinality(format!(
            "{} notifications",
            response.notification.len()
        )));
    }
    let notification = &response.notification[0];
    if notification.update.len() != 1 {
        return Err(TranslateError::UnexpectedCardinality(format!(
            "{} updates",
            notification.update.len()
        )));
    }

    let value = notification.update[0]
        .val
        .as_ref()
        .and_then(|v| v.value.as_ref())
        .ok_or_else(|| TranslateError::UnexpectedCardinality("update without value".to_string()))?;

    match value {
        typed_value::Value::JsonVal(bytes) | typed_value::Value::JsonIetfVal(bytes) => {
            String::from_utf8(bytes.clone()).map_err(|_| {
                TranslateError::UnexpectedCardinality("JSON value is not UTF-8".to_string())
            })
        }
        other => Err(TranslateError::UnexpectedCardinality(format!(
            "non-JSON value {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Filter;
    use netconf_bridge_proto::gnmi::Notification;

    #[test]
    fn test_parse_namespace() {
        let ns = parse_namespace("http://opennetworking.org/kpimon:ric:1.0.0").unwrap();
        assert_eq!(ns.target, "kpimon");
        assert_eq!(ns.name, "ric");
        assert_eq!(ns.version, "1.0.0");
        assert_eq!(ns.to_string(), "kpimon:ric:1.0.0");
    }

    #[test]
    fn test_parse_namespace_bare_triple() {
        let ns = parse_namespace("kpimon:ric:1.0.0").unwrap();
        assert_eq!(ns.target, "kpimon");
    }

    #[test]
    fn test_parse_namespace_too_few_fields() {
        assert!(matches!(
            parse_namespace("http://opennetworking.org/kpimon:ric"),
            Err(TranslateError::NamespaceFormat(_))
        ));
        assert!(matches!(
            parse_namespace("http://opennetworking.org/"),
            Err(TranslateError::NamespaceFormat(_))
        ));
    }

    #[test]
    fn test_xpath_to_path_simple() {
        let path = xpath_to_path("/interfaces/interface/state", "kpimon");
        assert_eq!(path.elem.len(), 3);
        assert_eq!(path.elem[0].name, "interfaces");
        assert_eq!(path.elem[2].name, "state");
        assert_eq!(path.target, "kpimon");
    }

    #[test]
    fn test_xpath_to_path_root() {
        let path = xpath_to_path("/", "kpimon");
        assert!(path.elem.is_empty());
        assert_eq!(path.target, "kpimon");
    }

    #[test]
    fn test_xpath_to_path_with_keys() {
        let path = xpath_to_path("/interfaces/interface[name=eth0]/state", "t");
        assert_eq!(path.elem[1].name, "interface");
        assert_eq!(path.elem[1].key.get("name"), Some(&"eth0".to_string()));
    }

    #[test]
    fn test_config_namespace() {
        let xml = r#"<report_period xmlns="http://opennetworking.org/kpimon:ric:1.0.0"><interval>5000</interval></report_period>"#;
        assert_eq!(
            config_namespace(xml).as_deref(),
            Some("http://opennetworking.org/kpimon:ric:1.0.0")
        );
        assert_eq!(config_namespace("<report_period/>"), None);
    }

    #[test]
    fn test_config_to_json_strips_attributes() {
        let xml = r#"<report_period xmlns="http://opennetworking.org/kpimon:ric:1.0.0"><interval>5000</interval></report_period>"#;
        let json = config_to_json(xml).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"report_period": {"interval": "5000"}})
        );
    }

    #[test]
    fn test_config_to_json_repeated_elements_become_array() {
        let xml = "<cells><cell>1</cell><cell>2</cell><cell>3</cell></cells>";
        let json = config_to_json(xml).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"cells": {"cell": ["1", "2", "3"]}})
        );
    }

    #[test]
    fn test_config_to_json_empty_element() {
        let json = config_to_json("<running/>").unwrap();
        assert_eq!(json, serde_json::json!({"running": ""}));
    }

    #[test]
    fn test_build_get_request() {
        let request = GetConfigRequest {
            message_id: "1".to_string(),
            filter: Filter {
                filter_type: "xpath".to_string(),
                xmlns: "http://opennetworking.org/kpimon:ric:1.0.0".to_string(),
                select: "/".to_string(),
            },
        };

        let (get, ns) = build_get_request(&request).unwrap();
        assert_eq!(ns.to_string(), "kpimon:ric:1.0.0");
        assert_eq!(get.prefix.as_ref().unwrap().target, "kpimon");
        assert_eq!(get.path.len(), 1);
        assert_eq!(get.path[0].target, "kpimon");
        assert_eq!(get.use_models.len(), 1);
        assert_eq!(get.use_models[0].name, "ric");
        assert_eq!(get.use_models[0].version, "1.0.0");
    }

    #[test]
    fn test_build_get_request_rejects_subtree_filter() {
        let request = GetConfigRequest {
            message_id: "1".to_string(),
            filter: Filter {
                filter_type: "subtree".to_string(),
                ..Default::default()
            },
        };
        assert!(matches!(
            build_get_request(&request),
            Err(TranslateError::FilterUnsupported)
        ));
    }

    fn edit_request(config: &str) -> EditConfigRequest {
        EditConfigRequest {
            message_id: "2".to_string(),
            default_operation: Some("merge".to_string()),
            config: config.to_string(),
        }
    }

    #[test]
    fn test_build_set_request() {
        let capabilities = vec!["http://opennetworking.org/kpimon:ric:1.0.0".to_string()];
        let config = r#"<report_period xmlns="http://opennetworking.org/kpimon:ric:1.0.0"><interval>5000</interval></report_period>"#;

        let (set, ns) = build_set_request(&edit_request(config), &capabilities).unwrap();
        assert_eq!(ns.target, "kpimon");
        assert_eq!(set.prefix.as_ref().unwrap().target, "kpimon");
        assert_eq!(set.update.len(), 1);
        assert!(set.delete.is_empty());

        let val = set.update[0].val.as_ref().unwrap().value.as_ref().unwrap();
        match val {
            typed_value::Value::JsonVal(bytes) => {
                let decoded: serde_json::Value = serde_json::from_slice(bytes).unwrap();
                assert_eq!(
                    decoded,
                    serde_json::json!({"report_period": {"interval": "5000"}})
                );
            }
            other => panic!("expected JsonVal, got {:?}", other),
        }
    }

    #[test]
    fn test_build_set_request_namespace_not_in_capabilities() {
        let capabilities = vec!["http://opennetworking.org/other:model:2.0.0".to_string()];
        let config = r#"<report_period xmlns="http://opennetworking.org/kpimon:ric:1.0.0"><interval>5000</interval></report_period>"#;

        assert!(matches!(
            build_set_request(&edit_request(config), &capabilities),
            Err(TranslateError::NamespaceNotInCapabilities)
        ));
    }

    #[test]
    fn test_single_json_update() {
        let response = GetResponse {
            notification: vec![Notification {
                update: vec![Update {
                    val: Some(TypedValue {
                        value: Some(typed_value::Value::JsonVal(b"{\"x\":1}".to_vec())),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        assert_eq!(single_json_update(&response).unwrap(), "{\"x\":1}");
    }

    #[test]
    fn test_single_json_update_wrong_cardinality() {
        let empty = GetResponse {
            notification: vec![],
        };
        assert!(matches!(
            single_json_update(&empty),
            Err(TranslateError::UnexpectedCardinality(_))
        ));

        let two_updates = GetResponse {
            notification: vec![Notification {
                update: vec![Update::default(), Update::default()],
                ..Default::default()
            }],
        };
        assert!(matches!(
            single_json_update(&two_updates),
            Err(TranslateError::UnexpectedCardinality(_))
        ));
    }

    #[test]
    fn test_single_json_update_non_json_value() {
        let response = GetResponse {
            notification: vec![Notification {
                update: vec![Update {
                    val: Some(TypedValue {
                        value: Some(typed_value::Value::StringVal("x".to_string())),
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        assert!(matches!(
            single_json_update(&response),
            Err(TranslateError::UnexpectedCardinality(_))
        ));
    }
}
