//! Génération de fichiers de profil.
//!
//! Pour un appareil non reconnu, on produit un profil pré-rempli avec ce
//! qu'il a envoyé (en-têtes, détails UPnP) suivi du corps d'un profil de
//! référence. Pour un appareil reconnu, on produit un fichier `Device` qui
//! ne contient que son identifiant et reçoit ses réglages propres.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::RendererError;
use crate::loader::PROFILE_EXTENSION;
use crate::profile::{
    CapabilityProfile, KEY_DEVICE_ID, KEY_RENDERER_ICON, KEY_RENDERER_NAME, KEY_UPNP_DETAILS, KEY_USER_AGENT,
    KEY_USER_AGENT_ADDITIONAL_HEADER, KEY_USER_AGENT_ADDITIONAL_SEARCH,
};
use crate::upnp::UpnpDetails;

const RULER: &str = "#----------------------------------------------------------------------------";

/// Keys describing how a profile is recognized, never copied from the
/// reference profile.
const IDENTIFIER_KEYS: [&str; 6] = [
    KEY_RENDERER_ICON,
    KEY_RENDERER_NAME,
    KEY_UPNP_DETAILS,
    KEY_USER_AGENT,
    KEY_USER_AGENT_ADDITIONAL_HEADER,
    KEY_USER_AGENT_ADDITIONAL_SEARCH,
];

fn line_key(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with('#') || line.starts_with('!') {
        return None;
    }
    line.find(['=', ':']).map(|at| line[..at].trim())
}

/// Body of a reference profile: the leading comment block is dropped, and
/// so are the identifier keys.
fn reference_body(text: &str) -> Vec<String> {
    let mut body: Vec<String> = Vec::new();
    let mut in_header = true;
    for line in text.lines() {
        let trimmed = line.trim();
        if in_header && (trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!')) {
            continue;
        }
        in_header = false;
        if line_key(line).is_some_and(|key| IDENTIFIER_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))) {
            continue;
        }
        body.push(line.trim_end().to_string());
    }
    body
}

/// Text of a renderer profile for a device that was not recognized.
///
/// `identifiers` are the `Name: value` headers the device sent, the
/// User-Agent first. `reference` is the profile whose settings are copied,
/// with its file content.
pub fn renderer_profile_lines(
    name: &str,
    identifiers: &[String],
    details: Option<&UpnpDetails>,
    reference: Option<(&CapabilityProfile, &str)>,
) -> Vec<String> {
    let mut lines = vec![RULER.to_string(), format!("# Renderer profile for {name}.")];
    if let Some((profile, _)) = reference {
        let based_on = profile
            .file()
            .and_then(Path::file_name)
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| profile.name().to_string());
        lines.push(format!("# Generated from {based_on}."));
    }
    lines.push(RULER.to_string());
    lines.push(String::new());
    lines.push(format!("{KEY_RENDERER_NAME} = {name}"));
    lines.push(String::new());

    let details = details.map(UpnpDetails::entries).unwrap_or_default();
    if !identifiers.is_empty() || !details.is_empty() {
        lines.push("# This renderer has sent the following string/s:".to_string());
        lines.push("#".to_string());
        lines.extend(identifiers.iter().map(|h| format!("# {h}")));
        if !identifiers.is_empty() && !details.is_empty() {
            lines.push("#".to_string());
        }
        lines.extend(details.iter().map(|(k, v)| format!("# {k}: {}", v.replace('\n', " "))));
        lines.push(RULER.to_string());
        lines.push(String::new());
    }

    lines.push(format!("{KEY_USER_AGENT} = "));
    if identifiers.len() > 1 {
        lines.push(format!("{KEY_USER_AGENT_ADDITIONAL_HEADER} = "));
        lines.push(format!("{KEY_USER_AGENT_ADDITIONAL_SEARCH} = "));
    }
    let upnp_search = details
        .iter()
        .filter(|(k, _)| *k == "manufacturer" || *k == "modelName")
        .map(|(_, v)| v.as_str())
        .collect::<Vec<_>>()
        .join(" , ");
    lines.push(format!("{KEY_UPNP_DETAILS} = {upnp_search}").trim_end().to_string());

    if let Some((_, text)) = reference {
        let body = reference_body(text);
        if !body.is_empty() {
            lines.push(String::new());
            lines.extend(body);
        }
    }
    lines
}

/// Text of a device file binding settings to one device id.
pub fn device_profile_lines(display_name: &str, device_id: &str, profile: &CapabilityProfile) -> Vec<String> {
    vec![
        RULER.to_string(),
        format!("# Device file for {display_name}."),
        format!("# Settings here override the {} profile for this device only.", profile.name()),
        RULER.to_string(),
        String::new(),
        format!("{KEY_DEVICE_ID} = {device_id}"),
    ]
}

/// File name for a profile name: letters, digits, `-` and `_` kept, the
/// rest replaced by `_`.
pub fn profile_file_name(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if stem.is_empty() { "renderer".to_string() } else { stem };
    format!("{stem}.{PROFILE_EXTENSION}")
}

/// Writes `lines` to `dir/file_name`; never overwrites an existing file.
pub fn write_profile(dir: &Path, file_name: &str, lines: &[String]) -> Result<PathBuf, RendererError> {
    let path = dir.join(file_name);
    if path.exists() {
        return Err(RendererError::ProfileExists(path));
    }
    fs::create_dir_all(dir).map_err(|e| RendererError::Write(dir.to_path_buf(), e))?;
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&path, text).map_err(|e| RendererError::Write(path.clone(), e))?;
    info!(file = %path.display(), "Profile file written");
    Ok(path)
}
