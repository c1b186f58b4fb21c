use std::{cmp::Ordering, convert::TryFrom};

use crate::bson::{Bson, Document};

/// Coerce numeric types into an `i64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Coerce numeric types into an `u64` if it would be lossless to do so. If this Bson is not numeric
/// or the conversion would be lossy (e.g. 1.5 -> 1), this returns `None`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn get_u64(val: &Bson) -> Option<u64> {
    match *val {
        Bson::Int32(i) => u64::try_from(i).ok(),
        Bson::Int64(i) => u64::try_from(i).ok(),
        Bson::Double(f) if (f - (f as u64 as f64)).abs() <= f64::EPSILON => Some(f as u64),
        _ => None,
    }
}

/// Reads any BSON number as an `f64`.
pub(crate) fn get_f64(val: &Bson) -> Option<f64> {
    match *val {
        Bson::Int32(i) => Some(f64::from(i)),
        Bson::Int64(i) => Some(i as f64),
        Bson::Double(f) => Some(f),
        Bson::Decimal128(d) => Some(decimal128_to_f64(d.bytes())),
        _ => None,
    }
}

/// Approximates an IEEE 754-2008 BID-encoded decimal as an `f64`.
fn decimal128_to_f64(bytes: [u8; 16]) -> f64 {
    const EXPONENT_BIAS: i32 = 6176;

    let bits = u128::from_le_bytes(bytes);
    let magnitude = match (bits >> 122) & 0x1f {
        0x1f => return f64::NAN,
        0x1e => f64::INFINITY,
        // Coefficients in the large form exceed the maximum of 10^34 - 1 and read as zero.
        _ if (bits >> 125) & 0b11 == 0b11 => 0.0,
        _ => {
            let exponent = ((bits >> 113) & 0x3fff) as i32 - EXPONENT_BIAS;
            let coefficient = (bits & ((1u128 << 113) - 1)) as f64;
            if coefficient == 0.0 {
                0.0
            } else if exponent < 0 {
                coefficient / 10f64.powi(-exponent)
            } else {
                coefficient * 10f64.powi(exponent)
            }
        }
    };
    if bits >> 127 == 1 {
        -magnitude
    } else {
        magnitude
    }
}

/// Whether a command reply reports success.
pub(crate) fn is_ok(reply: &Document) -> bool {
    reply.get("ok").and_then(get_f64) == Some(1.0)
}

pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

/// The name of a value's BSON type, as reported in type errors.
pub(crate) fn type_name(val: &Bson) -> &'static str {
    match val {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}

/// Looks up a dotted path such as `"a.b.c"` inside a document.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get(part)?,
            Bson::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Position of a BSON type in the server's cross-type sort order.
fn canonical_rank(val: &Bson) -> u8 {
    match val {
        Bson::MinKey => 0,
        Bson::Undefined | Bson::Null => 1,
        Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 14,
    }
}

/// Compares two BSON values the way the server orders them. Numbers compare across their
/// representations; values of different types compare by type rank.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Ordering {
    let (rank_a, rank_b) = (canonical_rank(a), canonical_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    if rank_a == 2 {
        return compare_numbers(a, b);
    }

    match (a, b) {
        (Bson::String(x) | Bson::Symbol(x), Bson::String(y) | Bson::Symbol(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::Document(x), Bson::Document(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                let ordering = kx.cmp(ky).then_with(|| compare(vx, vy));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Array(x), Bson::Array(y)) => {
            for (vx, vy) in x.iter().zip(y.iter()) {
                let ordering = compare(vx, vy);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            (&x.pattern, &x.options).cmp(&(&y.pattern, &y.options))
        }
        (Bson::JavaScriptCode(x), Bson::JavaScriptCode(y)) => x.cmp(y),
        (Bson::JavaScriptCodeWithScope(x), Bson::JavaScriptCodeWithScope(y)) => {
            x.code.cmp(&y.code)
        }
        (Bson::JavaScriptCode(_), Bson::JavaScriptCodeWithScope(_)) => Ordering::Less,
        (Bson::JavaScriptCodeWithScope(_), Bson::JavaScriptCode(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Orders numbers by value regardless of representation. NaN sorts below every other number.
fn compare_numbers(a: &Bson, b: &Bson) -> Ordering {
    match (a, b) {
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            return get_int(a).cmp(&get_int(b));
        }
        _ => {}
    }

    let (x, y) = (get_f64(a).unwrap_or(f64::NAN), get_f64(b).unwrap_or(f64::NAN));
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // Zeroes of either sign are equal.
        (false, false) if x == y => Ordering::Equal,
        (false, false) => x.total_cmp(&y),
    }
}

/// Whether range operators such as `$gt` may compare `a` with `b`. The server only compares
/// values within the same type bracket.
pub(crate) fn same_type_bracket(a: &Bson, b: &Bson) -> bool {
    canonical_rank(a) == canonical_rank(b)
}

/// Equality under the server's comparison rules, so `1`, `1i64` and `1.0` are equal.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Document(_), Bson::Document(_)) | (Bson::Array(_), Bson::Array(_)) => {
            compare(a, b) == Ordering::Equal
        }
        _ if canonical_rank(a) == 2 && canonical_rank(b) == 2 => {
            compare(a, b) == Ordering::Equal
        }
        _ => a == b,
    }
}
