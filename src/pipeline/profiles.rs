//! Fixed profile table, grounded on
//! `documents/profiles.py::PROFILE_DEFINITIONS`: each profile carries
//! engine-opaque pipeline options plus an export list that *replaces*
//! whatever the caller asked for, per `apply_profile_to_options`.

use crate::domain::ArtifactKind;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: &'static str,
    pub pipeline_options: Value,
    pub exports: Vec<ArtifactKind>,
}

pub fn get_profile_definition(name: &str) -> Option<Profile> {
    profiles().into_iter().find(|p| p.name == name)
}

pub fn apply_profile_to_options(profile_name: &str, caller_options: &Value) -> Value {
    let Some(profile) = get_profile_definition(profile_name) else {
        return caller_options.clone();
    };
    let mut merged = caller_options.clone();
    if let Value::Object(map) = &mut merged {
        if let Value::Object(profile_opts) = &profile.pipeline_options {
            for (k, v) in profile_opts {
                map.insert(k.clone(), v.clone());
            }
        }
    }
    merged
}

fn profiles() -> Vec<Profile> {
    vec![
        Profile {
            name: "fast_text",
            pipeline_options: json!({ "do_ocr": false, "do_table_structure": false }),
            exports: vec![ArtifactKind::Text, ArtifactKind::DoclingJson],
        },
        Profile {
            name: "ocr_only",
            pipeline_options: json!({ "do_ocr": true, "do_table_structure": false }),
            exports: vec![ArtifactKind::Text, ArtifactKind::DoclingJson],
        },
        Profile {
            name: "structured",
            pipeline_options: json!({ "do_ocr": true, "do_table_structure": true }),
            exports: vec![
                ArtifactKind::Markdown,
                ArtifactKind::Doctags,
                ArtifactKind::ChunksJson,
                ArtifactKind::DoclingJson,
            ],
        },
        Profile {
            name: "full_vlm",
            pipeline_options: json!({ "do_ocr": true, "do_table_structure": true, "do_picture_description": true }),
            exports: vec![
                ArtifactKind::Markdown,
                ArtifactKind::Doctags,
                ArtifactKind::ChunksJson,
                ArtifactKind::FiguresZip,
                ArtifactKind::DoclingJson,
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_profile_replaces_exports() {
        let profile = get_profile_definition("structured").unwrap();
        assert!(profile.exports.contains(&ArtifactKind::ChunksJson));
    }

    #[test]
    fn unknown_profile_leaves_options_untouched() {
        let caller = json!({ "custom": true });
        let merged = apply_profile_to_options("nonexistent", &caller);
        assert_eq!(merged, caller);
    }

    #[test]
    fn profile_options_override_caller_options() {
        let caller = json!({ "do_ocr": true });
        let merged = apply_profile_to_options("fast_text", &caller);
        assert_eq!(merged["do_ocr"], json!(false));
    }
}
