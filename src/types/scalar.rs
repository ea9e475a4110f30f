//! `Scalar`: the tagged union of values a row column, WAL payload, or SQL
//! expression can hold: int, float, text, bool, vector, null. Equality,
//! ordering, and hashing are defined per-tag with int/float
//! cross-promotion, matching SQL numeric comparison semantics.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Vector(Vec<f32>),
    Null,
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Text(_) => "text",
            Scalar::Bool(_) => "bool",
            Scalar::Vector(_) => "vector",
            Scalar::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Scalar::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Total order used by ORDER BY and by the B-tree secondary index:
    /// null sorts below every non-null value; otherwise per-tag comparison
    /// with int/float cross-promotion. Values that are neither numerically
    /// comparable nor of the same tag are ordered by type name, which keeps
    /// the order total (required for `BTreeMap<Scalar, _>` keys) without
    /// claiming any semantic meaning across incompatible tags.
    pub fn cmp_total(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Null, _) => Ordering::Less,
            (_, Scalar::Null) => Ordering::Greater,
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Scalar::Int(a), Scalar::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Scalar::Float(a), Scalar::Int(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Vector(a), Scalar::Vector(b)) => {
                a.len().cmp(&b.len()).then_with(|| {
                    for (x, y) in a.iter().zip(b.iter()) {
                        match x.partial_cmp(y) {
                            Some(Ordering::Equal) | None => continue,
                            Some(ord) => return ord,
                        }
                    }
                    Ordering::Equal
                })
            }
            _ => self.type_name().cmp(other.type_name()),
        }
    }
}

impl PartialEq for Scalar {
    /// Cross-tag comparison follows SQL numeric promotion for int/float;
    /// any other tag mismatch is unequal. Null is never equal to null.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, _) | (_, Scalar::Null) => false,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::Int(a), Scalar::Float(b)) => (*a as f64) == *b,
            (Scalar::Float(a), Scalar::Int(b)) => *a == (*b as f64),
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Vector(a), Scalar::Vector(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_total(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_total(other)
    }
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Int(i) => i.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::Text(s) => s.hash(state),
            Scalar::Bool(b) => b.hash(state),
            Scalar::Vector(v) => {
                for x in v {
                    x.to_bits().hash(state);
                }
            }
            Scalar::Null => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_not_equal_to_null() {
        assert_ne!(Scalar::Null, Scalar::Null);
    }

    #[test]
    fn null_sorts_below_everything() {
        assert_eq!(Scalar::Null.cmp_total(&Scalar::Int(i64::MIN)), Ordering::Less);
        assert_eq!(Scalar::Int(1).cmp_total(&Scalar::Null), Ordering::Greater);
    }

    #[test]
    fn int_float_cross_promotion() {
        assert_eq!(Scalar::Int(2), Scalar::Float(2.0));
        assert_eq!(Scalar::Int(2).cmp_total(&Scalar::Float(2.0)), Ordering::Equal);
        assert_eq!(Scalar::Int(2).cmp_total(&Scalar::Float(2.5)), Ordering::Less);
    }

    #[test]
    fn cross_tag_inequality() {
        assert_ne!(Scalar::Int(1), Scalar::Text("1".into()));
        assert_ne!(Scalar::Bool(true), Scalar::Int(1));
    }

    #[test]
    fn hash_matches_eq_for_numeric_tags() {
        use std::collections::hash_map::DefaultHasher;
        let mut h1 = DefaultHasher::new();
        let mut h2 = DefaultHasher::new();
        Scalar::Int(5).hash(&mut h1);
        Scalar::Int(5).hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    proptest::proptest! {
        /// `cmp_total` must be a consistent total order regardless of which
        /// side is int and which is float: swapping the operands always
        /// reverses the ordering, across every int/float pairing.
        #[test]
        fn cmp_total_is_antisymmetric_across_numeric_tags(a in -1_000_000i64..1_000_000, b in -1_000_000.0f64..1_000_000.0) {
            let int_scalar = Scalar::Int(a);
            let float_scalar = Scalar::Float(b);
            proptest::prop_assert_eq!(
                int_scalar.cmp_total(&float_scalar),
                float_scalar.cmp_total(&int_scalar).reverse()
            );
        }

        /// An int and the float holding its exact value must compare equal
        /// and order identically to comparing the int against itself.
        #[test]
        fn int_and_its_exact_float_equivalent_are_interchangeable(a in -1_000_000i64..1_000_000, other in -1_000_000i64..1_000_000) {
            let as_float = Scalar::Float(a as f64);
            proptest::prop_assert_eq!(Scalar::Int(a), as_float.clone());
            proptest::prop_assert_eq!(
                Scalar::Int(a).cmp_total(&Scalar::Int(other)),
                as_float.cmp_total(&Scalar::Int(other))
            );
        }
    }
}
