//! Typed per-core options.
//!
//! Each [`CoreOption`] variant carries its own default and bounds, so a value
//! can be checked against its descriptor before it is stored.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::OptionError;

pub const GENERAL_GROUP: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDisplay {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OptionDisplay {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumChoice {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiChoice {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoreOption {
    Bool {
        key: String,
        display: OptionDisplay,
        default: bool,
    },
    #[serde(rename = "string")]
    Text {
        key: String,
        display: OptionDisplay,
        default: String,
    },
    Range {
        key: String,
        display: OptionDisplay,
        min: i64,
        max: i64,
        default: i64,
    },
    RangeF {
        key: String,
        display: OptionDisplay,
        min: f64,
        max: f64,
        default: f64,
    },
    Enumeration {
        key: String,
        display: OptionDisplay,
        values: Vec<EnumChoice>,
        default: i64,
    },
    /// Pick one of several titled choices; defaults to the first.
    Multi {
        key: String,
        display: OptionDisplay,
        values: Vec<MultiChoice>,
    },
    Group {
        display: OptionDisplay,
        options: Vec<CoreOption>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl CoreOption {
    /// `None` for groups.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Bool { key, .. }
            | Self::Text { key, .. }
            | Self::Range { key, .. }
            | Self::RangeF { key, .. }
            | Self::Enumeration { key, .. }
            | Self::Multi { key, .. } => Some(key),
            Self::Group { .. } => None,
        }
    }

    pub fn display(&self) -> &OptionDisplay {
        match self {
            Self::Bool { display, .. }
            | Self::Text { display, .. }
            | Self::Range { display, .. }
            | Self::RangeF { display, .. }
            | Self::Enumeration { display, .. }
            | Self::Multi { display, .. }
            | Self::Group { display, .. } => display,
        }
    }

    pub fn default_value(&self) -> Option<OptionValue> {
        match self {
            Self::Bool { default, .. } => Some(OptionValue::Bool(*default)),
            Self::Text { default, .. } => Some(OptionValue::Text(default.clone())),
            Self::Range { default, .. } => Some(OptionValue::Int(*default)),
            Self::RangeF { default, .. } => Some(OptionValue::Float(*default)),
            Self::Enumeration { default, .. } => Some(OptionValue::Int(*default)),
            Self::Multi { values, .. } => values.first().map(|c| OptionValue::Text(c.title.clone())),
            Self::Group { .. } => None,
        }
    }

    /// Checks `value` against this descriptor and returns it normalized
    /// (integers given to a float range become floats).
    pub fn validate(&self, value: OptionValue) -> Result<OptionValue, OptionError> {
        let key = self.key().unwrap_or_default().to_string();

        match (self, value) {
            (Self::Group { display, .. }, _) => Err(OptionError::NotAValue {
                key: display.title.clone(),
            }),
            (Self::Bool { .. }, v @ OptionValue::Bool(_)) => Ok(v),
            (Self::Bool { .. }, v) => Err(type_mismatch(key, "bool", &v)),
            (Self::Text { .. }, v @ OptionValue::Text(_)) => Ok(v),
            (Self::Text { .. }, v) => Err(type_mismatch(key, "string", &v)),
            (Self::Range { min, max, .. }, OptionValue::Int(n)) => {
                if (*min..=*max).contains(&n) {
                    Ok(OptionValue::Int(n))
                } else {
                    Err(OptionError::OutOfRange {
                        key,
                        value: n.to_string(),
                        min: min.to_string(),
                        max: max.to_string(),
                    })
                }
            }
            (Self::Range { .. }, v) => Err(type_mismatch(key, "integer", &v)),
            (Self::RangeF { min, max, .. }, OptionValue::Int(n)) => {
                check_float(key, n as f64, *min, *max)
            }
            (Self::RangeF { min, max, .. }, OptionValue::Float(x)) => check_float(key, x, *min, *max),
            (Self::RangeF { .. }, v) => Err(type_mismatch(key, "float", &v)),
            (Self::Enumeration { values, .. }, OptionValue::Int(n)) => {
                if values.iter().any(|c| c.value == n) {
                    Ok(OptionValue::Int(n))
                } else {
                    Err(OptionError::NotAChoice {
                        key,
                        value: n.to_string(),
                    })
                }
            }
            (Self::Enumeration { .. }, v) => Err(type_mismatch(key, "integer", &v)),
            (Self::Multi { values, .. }, OptionValue::Text(title)) => {
                if values.iter().any(|c| c.title == title) {
                    Ok(OptionValue::Text(title))
                } else {
                    Err(OptionError::NotAChoice { key, value: title })
                }
            }
            (Self::Multi { .. }, v) => Err(type_mismatch(key, "string", &v)),
        }
    }

    /// Parses user text into a value of this option's type, then validates it.
    ///
    /// Enumerations accept either the numeric value or a choice title.
    pub fn parse_value(&self, raw: &str) -> Result<OptionValue, OptionError> {
        let raw = raw.trim();
        let value = match self {
            Self::Bool { .. } => match raw.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => OptionValue::Bool(true),
                "false" | "off" | "no" | "0" => OptionValue::Bool(false),
                _ => OptionValue::Text(raw.to_string()),
            },
            Self::Range { .. } => raw
                .parse()
                .map(OptionValue::Int)
                .unwrap_or_else(|_| OptionValue::Text(raw.to_string())),
            Self::RangeF { .. } => raw
                .parse()
                .map(OptionValue::Float)
                .unwrap_or_else(|_| OptionValue::Text(raw.to_string())),
            Self::Enumeration { values, .. } => match raw.parse() {
                Ok(n) => OptionValue::Int(n),
                Err(_) => match values.iter().find(|c| c.title.eq_ignore_ascii_case(raw)) {
                    Some(choice) => OptionValue::Int(choice.value),
                    None => {
                        return Err(OptionError::NotAChoice {
                            key: self.key().unwrap_or_default().to_string(),
                            value: raw.to_string(),
                        });
                    }
                },
            },
            Self::Text { .. } | Self::Multi { .. } | Self::Group { .. } => {
                OptionValue::Text(raw.to_string())
            }
        };
        self.validate(value)
    }

    /// Checks that the descriptor is usable: bounds are ordered, there is at
    /// least one choice, and the default passes [`CoreOption::validate`].
    /// Groups are checked through [`check_definitions`].
    pub fn check(&self) -> Result<(), OptionError> {
        let key = self.key().unwrap_or_default();
        let invalid = |reason: String| OptionError::InvalidDefinition {
            key: key.to_string(),
            reason,
        };

        match self {
            Self::Group { .. } => return Ok(()),
            Self::Range { min, max, .. } if min > max => {
                return Err(invalid(format!("min {min} is above max {max}")));
            }
            Self::RangeF { min, max, .. }
                if !matches!(min.partial_cmp(max), Some(Ordering::Less | Ordering::Equal)) =>
            {
                return Err(invalid(format!("min {min} and max {max} are not ordered")));
            }
            Self::Enumeration { values, .. } if values.is_empty() => {
                return Err(invalid("no choices".to_string()));
            }
            Self::Multi { values, .. } if values.is_empty() => {
                return Err(invalid("no choices".to_string()));
            }
            _ => {}
        }

        if let Some(default) = self.default_value() {
            self.validate(default)
                .map_err(|e| invalid(format!("default rejected ({e})")))?;
        }
        Ok(())
    }
}

/// Checks every descriptor, descending into groups. Keys must be unique
/// across the whole tree.
pub fn check_definitions(options: &[CoreOption]) -> Result<(), OptionError> {
    let mut seen = HashSet::new();
    check_tree(options, &mut seen)
}

fn check_tree<'a>(
    options: &'a [CoreOption],
    seen: &mut HashSet<&'a str>,
) -> Result<(), OptionError> {
    for opt in options {
        if let CoreOption::Group { options, .. } = opt {
            check_tree(options, seen)?;
            continue;
        }
        opt.check()?;
        let key = opt.key().unwrap_or_default();
        if !seen.insert(key) {
            return Err(OptionError::InvalidDefinition {
                key: key.to_string(),
                reason: "declared more than once".to_string(),
            });
        }
    }
    Ok(())
}

fn type_mismatch(key: String, expected: &'static str, got: &OptionValue) -> OptionError {
    OptionError::TypeMismatch {
        key,
        expected,
        got: got.type_name(),
    }
}

fn check_float(key: String, x: f64, min: f64, max: f64) -> Result<OptionValue, OptionError> {
    if x >= min && x <= max {
        return Ok(OptionValue::Float(x));
    }
    Err(OptionError::OutOfRange {
        key,
        value: x.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    })
}

/// Finds an option by key, descending into groups.
pub fn find_option<'a>(options: &'a [CoreOption], key: &str) -> Option<&'a CoreOption> {
    options.iter().find_map(|opt| match opt {
        CoreOption::Group { options, .. } => find_option(options, key),
        other if other.key() == Some(key) => Some(other),
        _ => None,
    })
}

/// Parses a JSON array of option descriptors and checks each one.
pub fn parse_definitions(bytes: &[u8]) -> Result<Vec<CoreOption>, OptionError> {
    let options: Vec<CoreOption> = serde_json::from_slice(bytes)?;
    check_definitions(&options)?;
    Ok(options)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionGroup<'a> {
    pub title: String,
    pub options: Vec<&'a CoreOption>,
}

/// Sections for display: ungrouped options first under "General", then each
/// group in declaration order.
pub fn group_options(options: &[CoreOption]) -> Vec<OptionGroup<'_>> {
    let mut root = Vec::new();
    let mut groups = Vec::new();

    for opt in options {
        match opt {
            CoreOption::Group { display, options } => groups.push(OptionGroup {
                title: display.title.clone(),
                options: options.iter().collect(),
            }),
            other => root.push(other),
        }
    }

    if !root.is_empty() {
        groups.insert(
            0,
            OptionGroup {
                title: GENERAL_GROUP.to_string(),
                options: root,
            },
        );
    }
    groups
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct OptionFile {
    values: BTreeMap<String, OptionValue>,
}

/// Stored values for one core's options, backed by a TOML file.
#[derive(Debug)]
pub struct CoreOptionStore {
    core_id: String,
    options: Vec<CoreOption>,
    values: BTreeMap<String, OptionValue>,
    path: PathBuf,
}

impl CoreOptionStore {
    pub fn path_for(dir: &Path, core_id: &str) -> PathBuf {
        dir.join(format!("{core_id}.toml"))
    }

    /// Loads stored values. Values that no longer fit their descriptor, or
    /// whose option is gone, are dropped with a warning. Descriptors that
    /// fail [`check_definitions`] are rejected.
    pub fn open(
        core_id: impl Into<String>,
        options: Vec<CoreOption>,
        path: PathBuf,
    ) -> Result<Self, OptionError> {
        let core_id = core_id.into();
        check_definitions(&options)?;
        let mut values = BTreeMap::new();

        match read_option_file(&path) {
            Ok(file) => {
                for (key, value) in file.values {
                    let Some(opt) = find_option(&options, &key) else {
                        warn!("{core_id}: dropping stored value for unknown option '{key}'");
                        continue;
                    };
                    match opt.validate(value) {
                        Ok(v) => {
                            values.insert(key, v);
                        }
                        Err(e) => warn!("{core_id}: dropping stored value: {e}"),
                    }
                }
            }
            Err(e) => warn!("{core_id}: {e}; using defaults"),
        }

        debug!("{core_id}: {} stored option value(s)", values.len());
        Ok(Self {
            core_id,
            options,
            values,
            path,
        })
    }

    pub fn options(&self) -> &[CoreOption] {
        &self.options
    }

    pub fn is_stored(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Stored value, else the option's default.
    pub fn value(&self, key: &str) -> Result<OptionValue, OptionError> {
        let opt = self.option(key)?;
        if let Some(stored) = self.values.get(key) {
            return Ok(stored.clone());
        }
        opt.default_value().ok_or_else(|| OptionError::NotAValue {
            key: key.to_string(),
        })
    }

    pub fn set_value(&mut self, key: &str, value: OptionValue) -> Result<(), OptionError> {
        let value = self.option(key)?.validate(value)?;
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        self.commit(next)
    }

    pub fn set_from_str(&mut self, key: &str, raw: &str) -> Result<(), OptionError> {
        let value = self.option(key)?.parse_value(raw)?;
        self.set_value(key, value)
    }

    /// Drops the stored value so the default applies again.
    pub fn reset(&mut self, key: &str) -> Result<(), OptionError> {
        self.option(key)?;
        if !self.values.contains_key(key) {
            return Ok(());
        }
        let mut next = self.values.clone();
        next.remove(key);
        self.commit(next)
    }

    fn option(&self, key: &str) -> Result<&CoreOption, OptionError> {
        find_option(&self.options, key).ok_or_else(|| OptionError::UnknownKey(key.to_string()))
    }

    fn commit(&mut self, next: BTreeMap<String, OptionValue>) -> Result<(), OptionError> {
        let io_err = |source| OptionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(&OptionFile {
            values: next.clone(),
        })?;
        std::fs::write(&self.path, text).map_err(io_err)?;
        debug!(
            "{}: saved {} option value(s) to {}",
            self.core_id,
            next.len(),
            self.path.display()
        );
        self.values = next;
        Ok(())
    }
}

fn read_option_file(path: &Path) -> Result<OptionFile, OptionError> {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(OptionFile::default()),
        Err(source) => {
            return Err(OptionError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&text).map_err(|source| OptionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
