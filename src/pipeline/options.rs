//! Options merge lattice: caller-supplied options win over the API key's
//! defaults, which win over the tenant's defaults, which win over the
//! system defaults — then the job's profile (if any) is overlaid on top,
//! replacing whatever the lattice produced for the keys it names, per
//! `profiles.py::apply_profile_to_options`.

use serde_json::{Map, Value};

use super::profiles::apply_profile_to_options;

pub fn merge_options(
    system_default: &Value,
    tenant_default: &Value,
    key_default: &Value,
    caller: &Value,
    profile: Option<&str>,
) -> Value {
    let mut merged = Map::new();
    for layer in [system_default, tenant_default, key_default, caller] {
        if let Value::Object(map) = layer {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    let merged = Value::Object(merged);
    match profile {
        Some(name) => apply_profile_to_options(name, &merged),
        None => merged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_layers_win() {
        let merged = merge_options(
            &json!({ "do_ocr": false, "max_pages": 10 }),
            &json!({}),
            &json!({}),
            &json!({ "do_ocr": true }),
            None,
        );
        assert_eq!(merged["do_ocr"], json!(true));
        assert_eq!(merged["max_pages"], json!(10));
    }

    #[test]
    fn profile_overrides_caller_supplied_keys() {
        let merged = merge_options(
            &json!({}),
            &json!({}),
            &json!({}),
            &json!({ "do_ocr": true }),
            Some("fast_text"),
        );
        assert_eq!(merged["do_ocr"], json!(false));
    }
}
