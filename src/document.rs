//! DID document patches: shape validation at parse time, application at
//! replay time, and the external view returned by resolution.
//!
//! The internal document is a JSON object; the built-in actions manage its
//! `public_keys` and `service_endpoints` arrays, `ietf-json-patch` edits any
//! path. Application is all-or-nothing per delta.

use serde_json::{json, Map, Value};

use crate::error::{ErrorCode, Result, SidetreeError};
use crate::models::DidState;
use crate::util::encoder;

const MAX_ID_LENGTH: usize = 50;
const PUBLIC_KEYS: &str = "public_keys";
const SERVICE_ENDPOINTS: &str = "service_endpoints";

pub fn empty_document() -> Value {
    Value::Object(Map::new())
}

/// Validates one patch object; `Err` names the first violated constraint.
pub fn validate_patch(patch: &Value) -> Result<()> {
    let obj = patch
        .as_object()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchMissingOrUnknownAction, "patch is not an object"))?;
    let action = obj
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchMissingOrUnknownAction, "patch has no action"))?;

    match action {
        "replace" => {
            allow_only(obj, &["action", "document"])?;
            let document = required(obj, "document")?;
            validate_document(document)
        }
        "add-public-keys" => {
            allow_only(obj, &["action", PUBLIC_KEYS])?;
            for key in required_array(obj, PUBLIC_KEYS)? {
                validate_public_key(key)?;
            }
            Ok(())
        }
        "remove-public-keys" => {
            allow_only(obj, &["action", PUBLIC_KEYS])?;
            for id in required_array(obj, PUBLIC_KEYS)? {
                validate_id(id)?;
            }
            Ok(())
        }
        "add-service-endpoints" => {
            allow_only(obj, &["action", SERVICE_ENDPOINTS])?;
            for service in required_array(obj, SERVICE_ENDPOINTS)? {
                validate_service_endpoint(service)?;
            }
            Ok(())
        }
        "remove-service-endpoints" => {
            allow_only(obj, &["action", "ids"])?;
            for id in required_array(obj, "ids")? {
                validate_id(id)?;
            }
            Ok(())
        }
        "ietf-json-patch" => {
            allow_only(obj, &["action", "patches"])?;
            for op in required_array(obj, "patches")? {
                validate_json_patch_op(op)?;
            }
            Ok(())
        }
        other => Err(SidetreeError::new(
            ErrorCode::PatchMissingOrUnknownAction,
            format!("unknown patch action '{}'", other),
        )),
    }
}

/// Applies patches to a copy of `document`. On error the input is untouched.
pub fn apply_patches(document: &Value, patches: &[Value]) -> Result<Value> {
    let mut doc = document.clone();
    if !doc.is_object() {
        doc = empty_document();
    }
    for patch in patches {
        apply_patch(&mut doc, patch)?;
    }
    Ok(doc)
}

fn apply_patch(doc: &mut Value, patch: &Value) -> Result<()> {
    validate_patch(patch)?;
    let action = patch["action"].as_str().unwrap_or_default();
    match action {
        "replace" => {
            *doc = patch["document"].clone();
        }
        "add-public-keys" => upsert_by_id(doc, PUBLIC_KEYS, &patch[PUBLIC_KEYS])?,
        "remove-public-keys" => remove_by_id(doc, PUBLIC_KEYS, &patch[PUBLIC_KEYS])?,
        "add-service-endpoints" => upsert_by_id(doc, SERVICE_ENDPOINTS, &patch[SERVICE_ENDPOINTS])?,
        "remove-service-endpoints" => remove_by_id(doc, SERVICE_ENDPOINTS, &patch["ids"])?,
        "ietf-json-patch" => {
            if let Some(ops) = patch["patches"].as_array() {
                for op in ops {
                    apply_json_patch_op(doc, op)?;
                }
            }
        }
        other => {
            return Err(SidetreeError::new(
                ErrorCode::PatchMissingOrUnknownAction,
                format!("unknown patch action '{}'", other),
            ))
        }
    }
    Ok(())
}

fn section_mut<'a>(doc: &'a mut Value, section: &str) -> Result<&'a mut Vec<Value>> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchApplicationFailed, "document is not an object"))?;
    let entry = obj.entry(section.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    entry
        .as_array_mut()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchApplicationFailed, format!("'{}' is not an array", section)))
}

fn upsert_by_id(doc: &mut Value, section: &str, entries: &Value) -> Result<()> {
    let items = section_mut(doc, section)?;
    for entry in entries.as_array().into_iter().flatten() {
        let id = &entry["id"];
        items.retain(|existing| &existing["id"] != id);
        items.push(entry.clone());
    }
    Ok(())
}

fn remove_by_id(doc: &mut Value, section: &str, ids: &Value) -> Result<()> {
    let items = section_mut(doc, section)?;
    for id in ids.as_array().into_iter().flatten() {
        items.retain(|existing| &existing["id"] != id);
    }
    Ok(())
}

/// One RFC 6902 operation. Paths are RFC 6901 pointers.
fn apply_json_patch_op(doc: &mut Value, op: &Value) -> Result<()> {
    let kind = op["op"].as_str().unwrap_or_default();
    let path = op["path"].as_str().unwrap_or_default();
    let from = op["from"].as_str().unwrap_or_default();
    match kind {
        "add" => add_at(doc, path, op["value"].clone()),
        "remove" => remove_at(doc, path).map(drop),
        "replace" if path.is_empty() => {
            *doc = op["value"].clone();
            Ok(())
        }
        "replace" => {
            remove_at(doc, path)?;
            add_at(doc, path, op["value"].clone())
        }
        "move" if from == path => Ok(()),
        "move" if path.starts_with(&format!("{}/", from)) => {
            Err(patch_failure(format!("cannot move '{}' into its own child '{}'", from, path)))
        }
        "move" => {
            let value = remove_at(doc, from)?;
            add_at(doc, path, value)
        }
        "copy" => {
            let value = doc.pointer(from).cloned().ok_or_else(|| patch_failure(format!("'{}' does not exist", from)))?;
            add_at(doc, path, value)
        }
        "test" => match doc.pointer(path) {
            Some(found) if *found == op["value"] => Ok(()),
            _ => Err(patch_failure(format!("test failed at '{}'", path))),
        },
        other => Err(patch_failure(format!("unsupported op '{}'", other))),
    }
}

fn patch_failure(message: String) -> SidetreeError {
    SidetreeError::new(ErrorCode::PatchApplicationFailed, message)
}

/// Splits a non-root pointer into its parent pointer and unescaped last token.
fn split_pointer(path: &str) -> Result<Option<(&str, String)>> {
    if path.is_empty() {
        return Ok(None);
    }
    let (parent, last) = path
        .rsplit_once('/')
        .filter(|_| path.starts_with('/'))
        .ok_or_else(|| patch_failure(format!("'{}' is not a JSON pointer", path)))?;
    Ok(Some((parent, last.replace("~1", "/").replace("~0", "~"))))
}

fn add_at(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let Some((parent, last)) = split_pointer(path)? else {
        *doc = value;
        return Ok(());
    };
    match doc.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(last, value);
        }
        Some(Value::Array(items)) if last == "-" => items.push(value),
        Some(Value::Array(items)) => {
            let index = array_index(&last, items.len() + 1)
                .ok_or_else(|| patch_failure(format!("bad index in '{}'", path)))?;
            items.insert(index, value);
        }
        _ => return Err(patch_failure(format!("parent of '{}' does not exist", path))),
    }
    Ok(())
}

fn remove_at(doc: &mut Value, path: &str) -> Result<Value> {
    let (parent, last) =
        split_pointer(path)?.ok_or_else(|| patch_failure("cannot remove the document root".to_string()))?;
    match doc.pointer_mut(parent) {
        Some(Value::Object(map)) => map.remove(&last),
        Some(Value::Array(items)) => array_index(&last, items.len()).map(|index| items.remove(index)),
        _ => None,
    }
    .ok_or_else(|| patch_failure(format!("'{}' does not exist", path)))
}

fn array_index(token: &str, bound: usize) -> Option<usize> {
    if token.len() > 1 && token.starts_with('0') {
        return None;
    }
    let index: usize = token.parse().ok()?;
    (index < bound).then_some(index)
}

fn is_pointer(path: &str) -> bool {
    path.is_empty() || path.starts_with('/')
}

fn validate_json_patch_op(op: &Value) -> Result<()> {
    let obj = op
        .as_object()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, "json patch op is not an object"))?;
    let kind = obj.get("op").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "add" | "replace" | "test" => {
            allow_only(obj, &["op", "path", "value"])?;
            required(obj, "value")?;
        }
        "remove" => allow_only(obj, &["op", "path"])?,
        "move" | "copy" => {
            allow_only(obj, &["op", "path", "from"])?;
            let from = obj.get("from").and_then(Value::as_str).unwrap_or("!");
            if !is_pointer(from) {
                return Err(SidetreeError::new(
                    ErrorCode::PatchPropertyInvalid,
                    format!("'{}' is not a JSON pointer", from),
                ));
            }
        }
        other => {
            return Err(SidetreeError::new(
                ErrorCode::PatchPropertyInvalid,
                format!("json patch op '{}' is not supported", other),
            ))
        }
    }
    let path = obj.get("path").and_then(Value::as_str).unwrap_or("!");
    if !is_pointer(path) {
        return Err(SidetreeError::new(ErrorCode::PatchPropertyInvalid, format!("'{}' is not a JSON pointer", path)));
    }
    Ok(())
}

fn validate_document(document: &Value) -> Result<()> {
    let obj = document
        .as_object()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, "document is not an object"))?;
    allow_only(obj, &[PUBLIC_KEYS, SERVICE_ENDPOINTS])?;
    if let Some(keys) = obj.get(PUBLIC_KEYS) {
        for key in keys
            .as_array()
            .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, "public_keys is not an array"))?
        {
            validate_public_key(key)?;
        }
    }
    if let Some(services) = obj.get(SERVICE_ENDPOINTS) {
        for service in services
            .as_array()
            .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, "service_endpoints is not an array"))?
        {
            validate_service_endpoint(service)?;
        }
    }
    Ok(())
}

fn validate_public_key(key: &Value) -> Result<()> {
    let obj = key
        .as_object()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, "public key is not an object"))?;
    allow_only(obj, &["id", "type", "jwk", "purpose"])?;
    validate_id(required(obj, "id")?)?;
    if !required(obj, "type")?.is_string() {
        return Err(SidetreeError::new(ErrorCode::PatchPropertyInvalid, "public key type is not a string"));
    }
    if !required(obj, "jwk")?.is_object() {
        return Err(SidetreeError::new(ErrorCode::PatchPropertyInvalid, "public key jwk is not an object"));
    }
    if let Some(purpose) = obj.get("purpose") {
        let valid = purpose.as_array().map(|p| p.iter().all(Value::is_string)).unwrap_or(false);
        if !valid {
            return Err(SidetreeError::new(ErrorCode::PatchPropertyInvalid, "purpose is not an array of strings"));
        }
    }
    Ok(())
}

fn validate_service_endpoint(service: &Value) -> Result<()> {
    let obj = service
        .as_object()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, "service endpoint is not an object"))?;
    allow_only(obj, &["id", "type", "endpoint"])?;
    validate_id(required(obj, "id")?)?;
    for field in ["type", "endpoint"] {
        if !required(obj, field)?.is_string() {
            return Err(SidetreeError::new(
                ErrorCode::PatchPropertyInvalid,
                format!("service endpoint {} is not a string", field),
            ));
        }
    }
    Ok(())
}

fn validate_id(id: &Value) -> Result<()> {
    match id.as_str() {
        Some(s) if !s.is_empty() && s.len() <= MAX_ID_LENGTH && encoder::is_base64url(s) => Ok(()),
        _ => Err(SidetreeError::new(ErrorCode::PatchIdInvalid, format!("id {} is invalid", id))),
    }
}

fn allow_only(obj: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
    match obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unexpected) => Err(SidetreeError::new(
            ErrorCode::PatchUnexpectedProperty,
            format!("unexpected property '{}'", unexpected),
        )),
        None => Ok(()),
    }
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    obj.get(field)
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, format!("missing '{}'", field)))
}

fn required_array<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Vec<Value>> {
    required(obj, field)?
        .as_array()
        .ok_or_else(|| SidetreeError::new(ErrorCode::PatchPropertyInvalid, format!("'{}' is not an array", field)))
}

/// Resolution output for `did` in the given state.
pub fn to_external(did: &str, state: &DidState) -> Value {
    if state.is_deactivated() {
        return json!({
            "@context": "https://w3id.org/did-resolution/v1",
            "didDocument": { "id": did },
            "methodMetadata": { "deactivated": true },
        });
    }

    let mut document = Map::new();
    document.insert("@context".to_string(), json!("https://www.w3.org/ns/did/v1"));
    document.insert("id".to_string(), json!(did));
    if let Some(internal) = state.document.as_object() {
        for (key, value) in internal {
            match key.as_str() {
                PUBLIC_KEYS => {
                    let keys: Vec<Value> = value
                        .as_array()
                        .into_iter()
                        .flatten()
                        .map(|k| {
                            let mut entry = json!({
                                "id": format!("#{}", k["id"].as_str().unwrap_or_default()),
                                "controller": did,
                                "type": k["type"],
                                "publicKeyJwk": k["jwk"],
                            });
                            if let Some(purpose) = k.get("purpose") {
                                entry["purpose"] = purpose.clone();
                            }
                            entry
                        })
                        .collect();
                    document.insert("publicKey".to_string(), Value::Array(keys));
                }
                SERVICE_ENDPOINTS => {
                    let services: Vec<Value> = value
                        .as_array()
                        .into_iter()
                        .flatten()
                        .map(|s| {
                            json!({
                                "id": format!("#{}", s["id"].as_str().unwrap_or_default()),
                                "type": s["type"],
                                "serviceEndpoint": s["endpoint"],
                            })
                        })
                        .collect();
                    document.insert("service".to_string(), Value::Array(services));
                }
                "id" | "@context" => {}
                _ => {
                    document.insert(key.clone(), value.clone());
                }
            }
        }
    }

    json!({
        "@context": "https://w3id.org/did-resolution/v1",
        "didDocument": Value::Object(document),
        "methodMetadata": {
            "updateCommitment": state.next_update_commitment,
            "recoveryCommitment": state.next_recovery_commitment,
        },
    })
}
