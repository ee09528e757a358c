//! Scalar values and rows.
//!
//! Rows are positional `Vec<Scalar>`; the meaning of each position comes from
//! the output elements of whichever node produced the row.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::Hash256;
use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
}

/// A single tuple.
pub type Row = Vec<Scalar>;

impl Scalar {
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Null,
            Scalar::Bool(_) => DataType::Boolean,
            Scalar::I32(_) => DataType::Integer,
            Scalar::I64(_) => DataType::Long,
            Scalar::F32(_) => DataType::Float,
            Scalar::F64(_) => DataType::Double,
            Scalar::Str(_) => DataType::String,
            Scalar::Bin(_) => DataType::Varbinary,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::I32(v) => Some(*v as f64),
            Scalar::I64(v) => Some(*v as f64),
            Scalar::F32(v) => Some(*v as f64),
            Scalar::F64(v) => Some(*v),
            Scalar::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::I32(v) => Some(*v as i64),
            Scalar::I64(v) => Some(*v),
            Scalar::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// SQL comparison. `None` when either side is null or the values are not
    /// comparable; callers treat that as UNKNOWN.
    pub fn sql_cmp(&self, other: &Scalar) -> Option<Ordering> {
        use Scalar::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(x), Bool(y)) => Some(x.cmp(y)),
            (Str(x), Str(y)) => Some(x.cmp(y)),
            (Bin(x), Bin(y)) => Some(x.cmp(y)),
            (I32(_) | I64(_), I32(_) | I64(_)) => {
                Some(self.as_i64()?.cmp(&other.as_i64()?))
            }
            _ => {
                let x = self.as_f64()?;
                let y = other.as_f64()?;
                x.partial_cmp(&y)
            }
        }
    }

    /// Convert a value to the given runtime type where a lossless or
    /// conventional conversion exists.
    pub fn coerce_to(&self, target: DataType) -> Option<Scalar> {
        use Scalar::*;
        if self.is_null() {
            return Some(Null);
        }
        let out = match target {
            DataType::Integer | DataType::Short | DataType::Byte => {
                I32(i32::try_from(self.as_i64()?).ok()?)
            }
            DataType::Long | DataType::BigInteger => I64(self.as_i64()?),
            DataType::Float => F32(self.as_f64()? as f32),
            DataType::Double | DataType::BigDecimal => F64(self.as_f64()?),
            DataType::Boolean => match self {
                Bool(b) => Bool(*b),
                Str(s) if s.eq_ignore_ascii_case("true") => Bool(true),
                Str(s) if s.eq_ignore_ascii_case("false") => Bool(false),
                _ => return None,
            },
            DataType::String | DataType::Char | DataType::Clob | DataType::Xml => {
                Str(self.to_string())
            }
            _ => self.clone(),
        };
        Some(out)
    }

    /// Rough in-memory size, used for buffer budget accounting.
    pub fn estimated_size(&self) -> usize {
        match self {
            Scalar::Null | Scalar::Bool(_) => 1,
            Scalar::I32(_) | Scalar::F32(_) => 4,
            Scalar::I64(_) | Scalar::F64(_) => 8,
            Scalar::Str(s) => 24 + s.len(),
            Scalar::Bin(b) => 24 + b.len(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::I32(v) => write!(f, "{}", v),
            Scalar::I64(v) => write!(f, "{}", v),
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Bin(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Total order used for sorting and de-duplication.
///
/// Nulls are sorted first, then values are compared by type.
pub fn scalar_cmp(a: &Scalar, b: &Scalar) -> Ordering {
    use Scalar::*;

    match (a, b) {
        (Null, Null) => Ordering::Equal,
        (Null, _) => Ordering::Less,
        (_, Null) => Ordering::Greater,
        (F32(x), F32(y)) => float_cmp(*x as f64, *y as f64),
        (F64(x), F64(y)) => float_cmp(*x, *y),
        _ => match a.sql_cmp(b) {
            Some(ord) => ord,
            None => scalar_type_order(a).cmp(&scalar_type_order(b)),
        },
    }
}

fn float_cmp(x: f64, y: f64) -> Ordering {
    if x.is_nan() && y.is_nan() {
        Ordering::Equal
    } else if x.is_nan() {
        Ordering::Greater
    } else if y.is_nan() {
        Ordering::Less
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

/// Assign a numeric order to scalar types for mixed-type comparisons.
fn scalar_type_order(s: &Scalar) -> u8 {
    use Scalar::*;
    match s {
        Null => 0,
        Bool(_) => 1,
        I32(_) => 2,
        I64(_) => 3,
        F32(_) => 4,
        F64(_) => 5,
        Str(_) => 6,
        Bin(_) => 7,
    }
}

/// Hash a scalar value into a hasher.
pub fn hash_scalar(scalar: &Scalar, hasher: &mut blake3::Hasher) {
    use Scalar::*;

    hasher.update(&[scalar_type_order(scalar)]);

    match scalar {
        Null => {}
        Bool(b) => {
            hasher.update(&[*b as u8]);
        }
        I32(i) => {
            hasher.update(&i.to_le_bytes());
        }
        I64(i) => {
            hasher.update(&i.to_le_bytes());
        }
        F32(f) => {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        F64(f) => {
            hasher.update(&f.to_bits().to_le_bytes());
        }
        Str(s) => {
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Bin(b) => {
            hasher.update(&(b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}

/// Stable digest of a whole row (duplicate removal keys on this).
pub fn row_digest(row: &[Scalar]) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    for value in row {
        hash_scalar(value, &mut hasher);
    }
    Hash256(hasher.finalize().into())
}

pub fn row_size(row: &[Scalar]) -> usize {
    row.iter().map(Scalar::estimated_size).sum::<usize>().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_cmp_treats_null_as_unknown() {
        assert_eq!(Scalar::Null.sql_cmp(&Scalar::I32(1)), None);
        assert_eq!(Scalar::I32(1).sql_cmp(&Scalar::Null), None);
    }

    #[test]
    fn sql_cmp_coerces_numerics() {
        assert_eq!(Scalar::I32(3).sql_cmp(&Scalar::I64(3)), Some(Ordering::Equal));
        assert_eq!(Scalar::I64(2).sql_cmp(&Scalar::F64(2.5)), Some(Ordering::Less));
        assert_eq!(
            Scalar::Str("10".into()).sql_cmp(&Scalar::I32(9)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn row_digest_distinguishes_string_boundaries() {
        let a = row_digest(&[Scalar::Str("ab".into()), Scalar::Str("c".into())]);
        let b = row_digest(&[Scalar::Str("a".into()), Scalar::Str("bc".into())]);
        assert_ne!(a, b);
        let c = row_digest(&[Scalar::Str("ab".into()), Scalar::Str("c".into())]);
        assert_eq!(a, c);
    }

    #[test]
    fn total_order_puts_nulls_first() {
        assert_eq!(scalar_cmp(&Scalar::Null, &Scalar::I32(0)), Ordering::Less);
        assert_eq!(scalar_cmp(&Scalar::F64(f64::NAN), &Scalar::F64(1.0)), Ordering::Greater);
    }

    #[test]
    fn coerce_string_literal_to_integer() {
        assert_eq!(
            Scalar::Str("42".into()).coerce_to(DataType::Integer),
            Some(Scalar::I32(42))
        );
        assert_eq!(Scalar::Str("x".into()).coerce_to(DataType::Integer), None);
    }
}
