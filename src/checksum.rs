//! Canonical serialisation and the deterministic checksum mixer (C1).
//!
//! `spec.md §4.1`: "Any change to canonicalisation must be treated as a wire
//! break." The encoding here is deliberately hand-rolled rather than reused
//! from `serde_json`'s `Value` — the wire format is a tiny fixed grammar
//! (quoted strings, bare numbers/bools, a `null` sentinel, bracketed arrays,
//! lexicographically-key-sorted objects) and must stay byte-identical across
//! `serde_json` upgrades.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A canonicalisable value. Callers build one of these from their domain
/// struct's fields (excluding the field being computed, e.g. `checksum`
/// itself) and pass it to [`checksum_of`].
#[derive(Debug, Clone, PartialEq)]
pub enum Canon {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Canon>),
    Object(BTreeMap<String, Canon>),
}

impl Canon {
    pub fn object(pairs: impl IntoIterator<Item = (&'static str, Canon)>) -> Canon {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v);
        }
        Canon::Object(map)
    }

    pub fn array(items: impl IntoIterator<Item = Canon>) -> Canon {
        Canon::Array(items.into_iter().collect())
    }

    pub fn opt_str(value: &Option<impl AsRef<str>>) -> Canon {
        match value {
            Some(v) => Canon::Str(v.as_ref().to_string()),
            None => Canon::Null,
        }
    }

    pub fn opt_int(value: Option<i64>) -> Canon {
        match value {
            Some(v) => Canon::Int(v),
            None => Canon::Null,
        }
    }

    /// Serialise to the canonical byte form: quoted strings with `"`/`\`
    /// escaped, numbers via `to_string`, `true`/`false` lowercase, `null`
    /// for the absent sentinel, `[a,b,c]` for arrays, and
    /// `{"k":v,...}` with keys in lexicographic order for objects.
    pub fn encode(&self, out: &mut String) {
        match self {
            Canon::Null => out.push_str("null"),
            Canon::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Canon::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Canon::Str(s) => {
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
            }
            Canon::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.encode(out);
                }
                out.push(']');
            }
            Canon::Object(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    Canon::Str(k.clone()).encode(out);
                    out.push(':');
                    v.encode(out);
                }
                out.push('}');
            }
        }
    }

    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        self.encode(&mut out);
        out
    }
}

/// The non-cryptographic integer mixer from `spec.md §9`:
/// `((h << 5) - h) + char`, folded over the canonical byte sequence and kept
/// in a 32-bit accumulator so the rendered hex stays fixed-width.
fn mix(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in bytes {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(b as u32);
    }
    h
}

/// Compute a `"<prefix>_<8-hex-lowercase>"` checksum over a canonical value,
/// per `spec.md §6`.
pub fn checksum_of(prefix: &str, value: &Canon) -> String {
    let canonical = value.to_canonical_string();
    let digest = mix(canonical.as_bytes());
    format!("{}_{}", prefix, hex::encode(digest.to_be_bytes()))
}
