//! Layer merging
//!
//! Later layers win. Tables merge key by key, arrays and scalars are
//! replaced wholesale.

use serde_json::Value;

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Merge two values, returning the result.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

/// Merge layers in order (first is base, last has highest precedence).
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"target": "a-eng"}), json!({"target": "b-user"}));
        assert_eq!(result["target"], "b-user");
    }

    #[test]
    fn test_tables_merge_by_key() {
        let base = json!({"paths": {"sdk": "sdk", "aidl": "aidl"}});
        let overlay = json!({"paths": {"sdk": "../agent-sdk"}});

        let result = deep_merge(base, overlay);

        assert_eq!(result["paths"]["sdk"], "../agent-sdk");
        assert_eq!(result["paths"]["aidl"], "aidl");
    }

    #[test]
    fn test_arrays_replace() {
        let base = json!({"extra": ["a", "b", "c"]});
        let overlay = json!({"extra": ["x"]});

        let result = deep_merge(base, overlay);

        assert_eq!(result["extra"], json!(["x"]));
    }

    #[test]
    fn test_table_replaces_scalar() {
        let result = deep_merge(json!({"transport": "ssh"}), json!({"transport": {"kind": "local"}}));
        assert_eq!(result["transport"]["kind"], "local");
    }

    #[test]
    fn test_four_layers() {
        let builtin = json!({"target": "agi_os_x86_64-eng", "transport": {"kind": "ssh", "port": 22}});
        let host = json!({"transport": {"host": "builder.internal"}});
        let project = json!({"transport": {"port": 2222}});
        let cli = json!({"target": "agi_os_arm64-userdebug"});

        let result = merge_layers(vec![builtin, host, project, cli]);

        assert_eq!(result["target"], "agi_os_arm64-userdebug");
        assert_eq!(result["transport"]["kind"], "ssh");
        assert_eq!(result["transport"]["host"], "builder.internal");
        assert_eq!(result["transport"]["port"], 2222);
    }
}
