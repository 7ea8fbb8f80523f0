//! Primary Key System - key generation and store key addressing
//!
//! Every model carries a string `id`. Fresh instances without one get a key
//! from their class's [`KeyGenerator`]; persisted instances live in the
//! store under `"<namespace>:<id>"`, where the namespace defaults to the
//! pluralized, snake-cased class name.

use uuid::Uuid;

use crate::model::record::Record;

/// Name of the distinguished key attribute present on every model class
pub const KEY_ATTRIBUTE: &str = "id";

/// Produces keys for fresh instances that were constructed without one
pub trait KeyGenerator: Send + Sync {
    fn next_key(&self, record: &Record) -> String;
}

impl<F> KeyGenerator for F
where
    F: Fn(&Record) -> String + Send + Sync,
{
    fn next_key(&self, record: &Record) -> String {
        self(record)
    }
}

/// Random (v4) UUID keys
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn next_key(&self, _record: &Record) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Check if this is a usable (non-blank) key
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store namespace for a model name: `"SkillSet"` becomes `"skill_sets"`
pub fn model_namespace(model_name: &str) -> String {
    pluralize(&underscore(model_name))
}

fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' || c == ':' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{}es", word);
    }
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", word)
}
