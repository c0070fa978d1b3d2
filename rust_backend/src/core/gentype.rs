//! Generator-type identifiers.
//!
//! SNANA tags every simulated transient with an integer GENTYPE. Upstream
//! files write it either as a bare integer or as a string key, so all
//! coercion happens here, at the (de)serialization edge; everything else in
//! the crate works with [`GenType`].

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical name reserved for type Ia supernovae.
pub const IA_NAME: &str = "Ia";

/// Integer generator-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GenType(pub i64);

impl GenType {
    /// SNANA's code for type Ia.
    pub const SNIA: GenType = GenType(10);

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for GenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenType {
    type Err = String;

    /// Accepts "10", " 10 " and integral floats such as "10.0".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_matches('"');
        if let Ok(v) = s.parse::<i64>() {
            return Ok(GenType(v));
        }
        match s.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(GenType(v as i64)),
            _ => Err(format!("invalid GENTYPE '{}'", s)),
        }
    }
}

impl<'de> Deserialize<'de> for GenType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GenTypeVisitor;

        impl<'de> Visitor<'de> for GenTypeVisitor {
            type Value = GenType;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer generator type, possibly as a string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<GenType, E> {
                Ok(GenType(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<GenType, E> {
                i64::try_from(v)
                    .map(GenType)
                    .map_err(|_| E::custom(format!("GENTYPE {} out of range", v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<GenType, E> {
                if v.fract() == 0.0 && v.is_finite() {
                    Ok(GenType(v as i64))
                } else {
                    Err(E::custom(format!("non-integral GENTYPE {}", v)))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<GenType, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(GenTypeVisitor)
    }
}

/// Reduce a README type description ("Ia SALT3", "NONIa IIP", ...) to its
/// canonical name.
///
/// Descriptions starting with "Ia" collapse to exactly "Ia"; otherwise the
/// second word is the name (the first is the model family).
pub fn canonical_name(description: &str) -> String {
    let description = description.trim();
    if description.starts_with(IA_NAME) {
        return IA_NAME.to_string();
    }
    let mut words = description.split_whitespace();
    let first = words.next().unwrap_or_default();
    words.next().unwrap_or(first).to_string()
}

/// Association between generator-type codes and canonical names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenTypeMap(BTreeMap<GenType, String>);

impl GenTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a code with its raw README description; the name is canonicalized.
    pub fn insert_description(&mut self, code: GenType, description: &str) {
        self.0.insert(code, canonical_name(description));
    }

    pub fn insert(&mut self, code: GenType, name: impl Into<String>) {
        self.0.insert(code, name.into());
    }

    pub fn name(&self, code: GenType) -> Option<&str> {
        self.0.get(&code).map(String::as_str)
    }

    /// Reverse lookup; the lowest code wins if a name is shared.
    pub fn code_for(&self, name: &str) -> Option<GenType> {
        self.0
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(code, _)| *code)
    }

    pub fn codes(&self) -> impl Iterator<Item = GenType> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GenType, &str)> + '_ {
        self.0.iter().map(|(code, name)| (*code, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(GenType, String)> for GenTypeMap {
    fn from_iter<I: IntoIterator<Item = (GenType, String)>>(iter: I) -> Self {
        GenTypeMap(iter.into_iter().collect())
    }
}
