//! Deterministic query fingerprints keying the plan cache.
#![expect(clippy::cast_possible_truncation)]

use crate::{
    db::query::{
        Query,
        predicate::{Operand, Predicate},
    },
    value::Value,
};
use sha2::{Digest, Sha256};
use std::fmt;

///
/// QueryFingerprint
///
/// SHA-256 over a tagged encoding of the normalized query.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryFingerprint([u8; 32]);

impl QueryFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

/// Fingerprint of `query` with its predicate already normalized.
pub(crate) fn fingerprint(query: &Query, normalized: &Predicate) -> QueryFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"queryfp:v1");

    write_tag(&mut hasher, 0x01);
    write_str(&mut hasher, &query.class().to_ascii_lowercase());

    write_tag(&mut hasher, 0x02);
    hash_predicate(&mut hasher, normalized);

    write_tag(&mut hasher, 0x03);
    match query.row_limit() {
        Some(limit) => {
            write_tag(&mut hasher, 0x01);
            hasher.update((limit as u64).to_be_bytes());
        }
        None => write_tag(&mut hasher, 0x00),
    }

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);

    QueryFingerprint(out)
}

fn hash_predicate(hasher: &mut Sha256, predicate: &Predicate) {
    match predicate {
        Predicate::True => write_tag(hasher, 0x20),
        Predicate::False => write_tag(hasher, 0x21),
        Predicate::And(children) | Predicate::Or(children) => {
            let tag = if matches!(predicate, Predicate::And(_)) { 0x22 } else { 0x23 };
            write_tag(hasher, tag);
            write_u32(hasher, children.len() as u32);
            for child in children {
                hash_predicate(hasher, child);
            }
        }
        Predicate::Not(inner) => {
            write_tag(hasher, 0x24);
            hash_predicate(hasher, inner);
        }
        Predicate::Compare(cmp) => {
            write_tag(hasher, 0x25);
            write_str(hasher, &cmp.field.to_string().to_ascii_lowercase());
            write_str(hasher, cmp.op.as_str());
            match &cmp.operand {
                Operand::Value(v) => {
                    write_tag(hasher, 0x01);
                    write_value(hasher, v);
                }
                Operand::Field(p) => {
                    write_tag(hasher, 0x02);
                    write_str(hasher, &p.to_string().to_ascii_lowercase());
                }
            }
        }
        Predicate::Between(b) => {
            write_tag(hasher, 0x26);
            write_str(hasher, &b.field.to_string().to_ascii_lowercase());
            write_value(hasher, &b.lower);
            write_tag(hasher, u8::from(b.lower_inclusive));
            write_value(hasher, &b.upper);
            write_tag(hasher, u8::from(b.upper_inclusive));
        }
        Predicate::IsNull(field) => {
            write_tag(hasher, 0x27);
            write_str(hasher, &field.to_string().to_ascii_lowercase());
        }
        Predicate::IsNotNull(field) => {
            write_tag(hasher, 0x28);
            write_str(hasher, &field.to_string().to_ascii_lowercase());
        }
    }
}

// Type name plus rendering keeps `1` and `1.0` apart.
fn write_value(hasher: &mut Sha256, value: &Value) {
    write_str(hasher, &value.value_type().to_string());
    write_str(hasher, &value.to_string());
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}
