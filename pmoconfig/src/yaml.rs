//! Manipulation de l'arbre YAML : fusion, normalisation des clés et accès
//! par chemin.

use anyhow::{anyhow, Result};
use serde_yaml::{Mapping, Value};

/// Fusionne `external` dans `default`.
///
/// Les mappings sont fusionnés clé par clé, les scalaires et les séquences
/// de `external` remplacent ceux de `default`.
pub(crate) fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        // Un fichier vide se lit comme Null : on garde les valeurs par défaut
        (_, Value::Null) => {}
        (d, e) => *d = e.clone(),
    }
}

/// Passe toutes les clés de type chaîne en minuscules, récursivement.
pub(crate) fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, lower_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

pub(crate) fn get_path<'a>(data: &'a Value, path: &[&str]) -> Result<&'a Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        let Value::Mapping(map) = current else {
            return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
        };
        current = map
            .get(Value::String(key.to_lowercase()))
            .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join(".")))?;
    }
    Ok(current)
}

pub(crate) fn set_path(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };
    if data.is_null() {
        *data = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Cannot set {}: parent is not a mapping", path.join(".")));
    };
    let key = Value::String(first.to_lowercase());
    if rest.is_empty() {
        map.insert(key, value);
        Ok(())
    } else {
        let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
        set_path(entry, rest, value)
    }
}

/// Interprète la valeur d'une variable d'environnement comme du YAML,
/// une chaîne brute sinon.
pub(crate) fn parse_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}
