//! Expressions understood by the orchestrator's YAML runtime
//!
//! Values are plain JSON. Interpolations (`${name.path}`) are strings, and
//! built-in functions are single-key objects such as `{"fn::secret": ...}`.

use serde_json::{Map, Value, json};

pub const FN_SECRET: &str = "fn::secret";
pub const FN_TO_JSON: &str = "fn::toJSON";
pub const FN_INVOKE: &str = "fn::invoke";

/// Names that are always in scope.
pub const BUILTIN_ROOTS: [&str; 1] = ["pulumi"];

/// `${name}` or `${name.path}`
pub fn reference(name: &str, path: &str) -> String {
    if path.is_empty() {
        format!("${{{}}}", name)
    } else if path.starts_with('[') {
        format!("${{{}{}}}", name, path)
    } else {
        format!("${{{}.{}}}", name, path)
    }
}

/// Reference to a declared configuration key.
pub fn config(key: &str) -> String {
    reference(key, "")
}

pub fn secret(value: impl Into<Value>) -> Value {
    json!({ FN_SECRET: value.into() })
}

pub fn to_json(value: impl Into<Value>) -> Value {
    json!({ FN_TO_JSON: value.into() })
}

/// Call a provider function. `ret` selects a single field of the result.
pub fn invoke(function: &str, arguments: Value, ret: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("function".to_string(), Value::String(function.to_string()));
    body.insert("arguments".to_string(), arguments);
    if let Some(ret) = ret {
        body.insert("return".to_string(), Value::String(ret.to_string()));
    }
    json!({ FN_INVOKE: Value::Object(body) })
}

/// An interpolation found inside a string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    /// Declared name the expression starts from
    pub root: String,
    /// First property accessed on the root, if any
    pub property: Option<String>,
}

/// Every interpolation in `text`. `$${` is an escaped literal.
pub fn interpolations(text: &str) -> Vec<Interpolation> {
    let mut found = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while let Some(offset) = text[i..].find("${") {
        let start = i + offset;
        let escaped = start > 0 && bytes[start - 1] == b'$';
        let Some(len) = text[start + 2..].find('}') else {
            break;
        };
        let inner = &text[start + 2..start + 2 + len];
        i = start + 2 + len + 1;
        if escaped || inner.is_empty() {
            continue;
        }
        found.push(split_access(inner));
    }
    found
}

fn split_access(inner: &str) -> Interpolation {
    let root_end = inner.find(['.', '[']).unwrap_or(inner.len());
    let root = inner[..root_end].to_string();
    let rest = &inner[root_end..];
    let property = rest.strip_prefix('.').and_then(|p| {
        let end = p.find(['.', '[']).unwrap_or(p.len());
        (end > 0).then(|| p[..end].to_string())
    });
    Interpolation { root, property }
}

/// Walk a value and collect every interpolation in its strings.
pub fn collect_interpolations(value: &Value, out: &mut Vec<Interpolation>) {
    match value {
        Value::String(s) => out.extend(interpolations(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_interpolations(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_interpolations(v, out)),
        _ => {}
    }
}

/// The field an `fn::invoke` selects with `return`, if `value` is such a call.
pub fn invoke_return(value: &Value) -> Option<&str> {
    value
        .get(FN_INVOKE)
        .and_then(|body| body.get("return"))
        .and_then(Value::as_str)
}

/// Whether `value` is wrapped in `fn::secret`.
pub fn is_secret(value: &Value) -> bool {
    value.as_object().is_some_and(|m| m.len() == 1 && m.contains_key(FN_SECRET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference() {
        assert_eq!(reference("vm", ""), "${vm}");
        assert_eq!(reference("vm", "vmId"), "${vm.vmId}");
        assert_eq!(reference("vm", "ipv4Addresses[1][0]"), "${vm.ipv4Addresses[1][0]}");
        assert_eq!(reference("urls", "[0]"), "${urls[0]}");
    }

    #[test]
    fn test_interpolations() {
        let found = interpolations("https://${vm.ipv4Addresses[1][0]}:6443 ${token} $${literal}");
        assert_eq!(
            found,
            vec![
                Interpolation {
                    root: "vm".to_string(),
                    property: Some("ipv4Addresses".to_string()),
                },
                Interpolation {
                    root: "token".to_string(),
                    property: None,
                },
            ]
        );
    }

    #[test]
    fn test_unterminated_interpolation_is_ignored() {
        assert!(interpolations("${broken").is_empty());
    }

    #[test]
    fn test_collect_nested() {
        let value = json!({
            "a": ["${one.x}", {"b": "${two}"}],
            "c": 3,
        });
        let mut out = Vec::new();
        collect_interpolations(&value, &mut out);
        let roots: Vec<_> = out.iter().map(|i| i.root.as_str()).collect();
        assert_eq!(roots, vec!["one", "two"]);
    }

    #[test]
    fn test_invoke() {
        let call = invoke("talos:cluster/getKubeconfig:getKubeconfig", json!({"node": "10.0.0.1"}), Some("kubeconfigRaw"));
        assert_eq!(invoke_return(&call), Some("kubeconfigRaw"));
        assert!(!is_secret(&call));
        assert!(is_secret(&secret(call)));
    }
}
