use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Section that receives keys appearing before the first `[header]`.
pub const NO_SECTION: &str = "NO_SECTION";

/// Prefix of the synthetic keys holding `;` comment lines. A parsed key can
/// never start with `;`, so these never collide with real keys.
pub const COMMENT_KEY_PREFIX: &str = ";Comment";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("configuration file {} could not be read", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration file {} is malformed", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One `[Section]` of a configuration file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
    comments: usize,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_key_with_prefix(&self, prefix: &str) -> bool {
        self.entries.iter().any(|(k, _)| {
            k.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }

    fn insert(&mut self, key: String, value: String) {
        let existing = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&key));
        match existing {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    fn push_comment(&mut self, text: String) {
        self.comments += 1;
        let key = format!("{COMMENT_KEY_PREFIX}{}", self.comments);
        self.entries.push((key, text));
    }
}

/// Section name -> key -> value, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    sections: Vec<Section>,
}

impl ConfigMap {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?.get(key)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    fn section_entry(&mut self, name: &str) -> &mut Section {
        let existing = self
            .sections
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name));
        let index = match existing {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }
}

pub fn load(path: &Path) -> Result<ConfigMap, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let contents = decode_text(&bytes);

    let map = match path.extension().and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case("toml") => {
            parse_toml(&contents).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?
        }
        _ => parse_ini(&contents),
    };
    log::debug!(
        "loaded {} from {}",
        map.sections()
            .map(|s| format!("[{}] ({} keys)", s.name(), s.entries().count()))
            .collect::<Vec<_>>()
            .join(", "),
        path.display()
    );
    Ok(map)
}

/// Line-oriented INI parsing. Lines that are neither headers, comments nor
/// `key=value` pairs are dropped.
pub fn parse_ini(text: &str) -> ConfigMap {
    let mut map = ConfigMap::default();
    let mut current = NO_SECTION.to_string();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            map.section_entry(&current);
            continue;
        }
        if let Some(comment) = line.strip_prefix(';') {
            map.section_entry(&current)
                .push_comment(comment.trim().to_string());
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                map.section_entry(&current)
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => log::debug!("skipping malformed line {}: {line:?}", index + 1),
        }
    }
    map
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TomlScalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl TomlScalar {
    fn into_value(self) -> String {
        match self {
            TomlScalar::Text(s) => s,
            TomlScalar::Integer(i) => i.to_string(),
            TomlScalar::Float(f) => f.to_string(),
            TomlScalar::Flag(true) => "1".to_string(),
            TomlScalar::Flag(false) => "0".to_string(),
        }
    }
}

type TomlDocument = BTreeMap<String, BTreeMap<String, TomlScalar>>;

/// Every top-level table becomes a section.
pub fn parse_toml(text: &str) -> Result<ConfigMap, toml::de::Error> {
    let doc: TomlDocument = toml::from_str(text)?;
    let mut map = ConfigMap::default();
    for (name, table) in doc {
        let section = map.section_entry(&name);
        for (key, value) in table {
            section.insert(key, value.into_value());
        }
    }
    Ok(map)
}

// Notepad saves "Unicode" as UTF-16LE with a BOM.
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
