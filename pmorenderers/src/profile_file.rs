//! Lecture des fichiers `.conf` de profils.
//!
//! Format :
//! - une entrée `Cle = valeur` (ou `Cle: valeur`) par ligne
//! - `#` ou `!` en début de ligne : commentaire
//! - `\` en fin de ligne : la valeur continue sur la ligne suivante
//! - une clé répétée accumule ses valeurs (toutes les lignes `Supported`)
//!
//! Les clés sont insensibles à la casse.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::errors::ProfileError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFile {
    /// Clés dans l'ordre de première apparition, casse d'origine.
    order: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

/// A line ends with a continuation marker when it ends with an odd number
/// of backslashes.
fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let at = line.find(['=', ':'])?;
    let key = line[..at].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[at + 1..].trim()))
}

impl ProfileFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let mut file = ProfileFile::new();
        let mut pending = String::new();

        for raw in text.lines() {
            let line = raw.trim();
            if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }
            if continues(line) {
                pending.push_str(&line[..line.len() - 1]);
                continue;
            }
            pending.push_str(line);
            let logical = std::mem::take(&mut pending);
            if let Some((key, value)) = split_entry(&logical) {
                file.add(key, value);
            }
        }
        if let Some((key, value)) = split_entry(&pending) {
            file.add(key, value);
        }
        file
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path).map_err(|e| ProfileError::Io(path.to_path_buf(), e))?;
        Ok(Self::parse(&text))
    }

    /// Ajoute une valeur à la clé, sans effacer les précédentes.
    pub fn add(&mut self, key: &str, value: &str) {
        let lower = key.to_ascii_lowercase();
        if !self.values.contains_key(&lower) {
            self.order.push(key.to_string());
        }
        self.values.entry(lower).or_default().push(value.to_string());
    }

    /// Remplace toutes les valeurs de la clé.
    pub fn set(&mut self, key: &str, value: &str) {
        let lower = key.to_ascii_lowercase();
        if !self.values.contains_key(&lower) {
            self.order.push(key.to_string());
        }
        self.values.insert(lower, vec![value.to_string()]);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_lowercase())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Toutes les valeurs d'une clé, dans l'ordre du fichier.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Dernière valeur non vide de la clé.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key)
            .iter()
            .rev()
            .map(|v| v.as_str())
            .find(|v| !v.is_empty())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    /// Valeur entière de la clé, `Ok(None)` si elle est absente.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, String> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.parse::<i64>().map(Some).map_err(|_| v.to_string()),
        }
    }

    /// Valeurs de la clé découpées sur l'un des séparateurs.
    pub fn get_list(&self, key: &str, separators: &[char]) -> Vec<String> {
        self.get_all(key)
            .iter()
            .flat_map(|v| v.split(separators))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Applique une couche de surcharge : chaque clé présente dans
    /// `overrides` remplace entièrement celle de `self`.
    pub fn overlay(&self, overrides: &ProfileFile) -> ProfileFile {
        let mut merged = self.clone();
        for key in overrides.keys() {
            let lower = key.to_ascii_lowercase();
            if !merged.values.contains_key(&lower) {
                merged.order.push(key.to_string());
            }
            merged.values.insert(lower, overrides.get_all(key).to_vec());
        }
        merged
    }
}
