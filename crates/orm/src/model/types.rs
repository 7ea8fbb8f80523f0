//! Attribute types - conversion between stored and in-memory values
//!
//! Every type passes `null` through untouched. In-memory values stay
//! `serde_json::Value`s; the type only normalizes their shape.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

/// Conversion contract for attribute types.
///
/// Errors are plain messages; the attribute definition attaches its name.
pub trait TypeCoercion: Send + Sync + Debug {
    /// Type name used in error messages
    fn name(&self) -> &str;

    /// Convert a stored (or user supplied) value into its in-memory form
    fn from_store(&self, value: Value) -> Result<Value, String>;

    /// Convert an in-memory value into its stored form
    fn to_store(&self, value: Value) -> Result<Value, String> {
        Ok(value)
    }
}

/// Declared type of an attribute
#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp, normalized to UTC
    Time,
    /// Any JSON value, stored as is
    Json,
    Custom(Arc<dyn TypeCoercion>),
}

impl AttributeType {
    pub fn custom<T: TypeCoercion + 'static>(coercion: T) -> Self {
        AttributeType::Custom(Arc::new(coercion))
    }

    pub fn name(&self) -> &str {
        match self {
            AttributeType::String => "String",
            AttributeType::Integer => "Integer",
            AttributeType::Float => "Float",
            AttributeType::Boolean => "Boolean",
            AttributeType::Time => "Time",
            AttributeType::Json => "Json",
            AttributeType::Custom(coercion) => coercion.name(),
        }
    }

    pub fn from_store(&self, value: Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            AttributeType::String => coerce_string(value),
            AttributeType::Integer => coerce_integer(value),
            AttributeType::Float => coerce_float(value),
            AttributeType::Boolean => coerce_boolean(value),
            AttributeType::Time => coerce_time(value),
            AttributeType::Json => Ok(value),
            AttributeType::Custom(coercion) => coercion.from_store(value),
        }
    }

    pub fn to_store(&self, value: Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            AttributeType::Time => coerce_time(value),
            AttributeType::Custom(coercion) => coercion.to_store(value),
            _ => Ok(value),
        }
    }
}

fn coerce_string(value: Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(format!("expected a string, got {}", other)),
    }
}

fn coerce_integer(value: Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| format!("{} is not an integer", n)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(Value::Null);
            }
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::from(i));
            }
            s.parse::<f64>()
                .map(|f| Value::from(f.trunc() as i64))
                .map_err(|_| format!("'{}' is not an integer", s))
        }
        other => Err(format!("expected an integer, got {}", other)),
    }
}

fn coerce_float(value: Value) -> Result<Value, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("{} is not a float", n)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(Value::Null);
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a float", s))
        }
        other => Err(format!("expected a float, got {}", other)),
    }
}

fn coerce_boolean(value: Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(Value::Bool(true)),
            Some(0) => Ok(Value::Bool(false)),
            _ => Err(format!("{} is not a boolean", n)),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "0" => Ok(Value::Bool(false)),
            "" => Ok(Value::Null),
            other => Err(format!("'{}' is not a boolean", other)),
        },
        other => Err(format!("expected a boolean, got {}", other)),
    }
}

fn coerce_time(value: Value) -> Result<Value, String> {
    let time: DateTime<Utc> = match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("'{}' is not an RFC 3339 time: {}", s, e))?,
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| format!("{} is not a unix timestamp", n))?,
        other => return Err(format!("expected a time, got {}", other)),
    };
    Ok(Value::String(
        time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ))
}
