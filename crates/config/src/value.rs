use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Self-describing type tag stored alongside every config value, so a
/// type mismatch between what is stored and what a caller asks for can be
/// detected (`ErrConfigType`) instead of silently coercing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    String,
    Int,
    Bool,
    Float,
    Duration,
    Object,
}

impl ConfigType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigType::String => "string",
            ConfigType::Int => "int",
            ConfigType::Bool => "bool",
            ConfigType::Float => "float",
            ConfigType::Duration => "duration",
            ConfigType::Object => "object",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ConfigType::String),
            "int" => Some(ConfigType::Int),
            "bool" => Some(ConfigType::Bool),
            "float" => Some(ConfigType::Float),
            "duration" => Some(ConfigType::Duration),
            "object" => Some(ConfigType::Object),
            _ => None,
        }
    }
}

/// A typed config value. `Duration` is stored as an integer count of
/// seconds, per spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    Duration(u64),
    Object(serde_json::Value),
}

impl ConfigValue {
    pub fn config_type(&self) -> ConfigType {
        match self {
            ConfigValue::String(_) => ConfigType::String,
            ConfigValue::Int(_) => ConfigType::Int,
            ConfigValue::Bool(_) => ConfigType::Bool,
            ConfigValue::Float(_) => ConfigType::Float,
            ConfigValue::Duration(_) => ConfigType::Duration,
            ConfigValue::Object(_) => ConfigType::Object,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ConfigValue::Duration(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&serde_json::Value> {
        match self {
            ConfigValue::Object(v) => Some(v),
            _ => None,
        }
    }
}
