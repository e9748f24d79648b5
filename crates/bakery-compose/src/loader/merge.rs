//! Shape normalization and merging of Compose documents.
//!
//! Later documents override earlier ones: mappings merge key by key,
//! sequences gain the entries they did not already hold, and any other
//! value is replaced.

use serde_yaml::{Mapping, Value};

/// Service fields accepting either `KEY=VALUE` lists or mappings.
const SERVICE_LIST_OR_MAP: &[(&str, Bare)] = &[
    ("environment", Bare::Null),
    ("labels", Bare::Empty),
    ("depends_on", Bare::Null),
];

/// Build fields accepting either `KEY=VALUE` lists or mappings.
const BUILD_LIST_OR_MAP: &[(&str, Bare)] = &[
    ("args", Bare::Null),
    ("labels", Bare::Empty),
    ("additional_contexts", Bare::Empty),
];

/// Value given to a list entry written without `=`.
#[derive(Debug, Clone, Copy)]
enum Bare {
    Null,
    Empty,
}

impl Bare {
    fn value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Empty => Value::String(String::new()),
        }
    }
}

/// Rewrites every list-or-map field and short `build` form into its mapping form
/// so that documents merge key by key.
pub fn normalize_shapes(doc: &mut Value) {
    let Some(services) = doc.get_mut("services").and_then(Value::as_mapping_mut) else {
        return;
    };
    for (_, service) in services.iter_mut() {
        let Some(service) = service.as_mapping_mut() else {
            continue;
        };
        for (field, bare) in SERVICE_LIST_OR_MAP {
            if let Some(value) = service.get_mut(*field) {
                list_to_mapping(value, *bare);
            }
        }

        let Some(build) = service.get_mut("build") else {
            continue;
        };
        if let Value::String(context) = build {
            let mut long = Mapping::new();
            let _ = long.insert("context".into(), Value::String(std::mem::take(context)));
            *build = Value::Mapping(long);
        }
        if let Some(build) = build.as_mapping_mut() {
            for (field, bare) in BUILD_LIST_OR_MAP {
                if let Some(value) = build.get_mut(*field) {
                    list_to_mapping(value, *bare);
                }
            }
        }
    }
}

fn list_to_mapping(value: &mut Value, bare: Bare) {
    let Value::Sequence(items) = value else {
        return;
    };
    let mut map = Mapping::new();
    for item in items.iter() {
        let Some(entry) = item.as_str() else {
            // Left for the typed decode to reject.
            return;
        };
        let (key, val) = match entry.split_once('=') {
            Some((k, v)) => (k, Value::String(v.to_owned())),
            None => (entry, bare.value()),
        };
        let _ = map.insert(key.into(), val);
    }
    *value = Value::Mapping(map);
}

/// Merges `overlay` into `base`.
pub fn merge_documents(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_documents(existing, value),
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (Value::Sequence(base), Value::Sequence(overlay)) => {
            for value in overlay {
                if !base.contains(&value) {
                    base.push(value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Names of the services declared by a document.
pub fn service_names(doc: &Value) -> Vec<String> {
    doc.get("services")
        .and_then(Value::as_mapping)
        .map(|services| {
            services
                .keys()
                .filter_map(|k| k.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}
