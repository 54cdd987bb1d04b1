//! # Data Types for Columnar Chunks
//!
//! This module provides the canonical `DataType` enum for chunkstore, used by
//! field descriptors, batch sources, and the chunk builder dispatch.
//!
//! ## Type Categories
//!
//! | Category | Types | Chunk Layout |
//! |----------|-------|--------------|
//! | **Fixed scalar** | Bool, Int8, Int16, Int32, Int64, Float, Double | Fixed-width |
//! | **Text** | String, Json | Variable-length (offsets + blob) |
//! | **Nested** | Array | Variable-length, rows decode as element arrays |
//! | **Vector** | FloatVector, SparseFloatVector | Fixed-width / packed pairs |
//!
//! ## Discriminant Values
//!
//! Discriminants are grouped by category so related types compare adjacently:
//! - 0-6: fixed-width scalars
//! - 20-21: text-like variable-length
//! - 30: nested arrays
//! - 40-41: vector types
//!
//! The `#[repr(u8)]` ensures the discriminant fits in a single byte for the
//! serialized stream header and the element-array header.

use std::fmt;
use std::str::FromStr;

/// Canonical data type enum for all chunkstore operations.
///
/// Uses `#[repr(u8)]` for efficient single-byte storage encoding.
/// Type metadata (vector dimension, metric) is stored in `FieldDef`, not here.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Float = 5,
    Double = 6,

    String = 20,
    Json = 21,

    Array = 30,

    FloatVector = 40,
    SparseFloatVector = 41,
}

impl DataType {
    /// Returns the fixed byte size of one value of this type, or None for
    /// variable-length types. Dense vectors are fixed-width per row but need
    /// the dimension to size an element; see `FieldDef::element_size`.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Bool => Some(1),
            DataType::Int8 => Some(1),
            DataType::Int16 => Some(2),
            DataType::Int32 => Some(4),
            DataType::Int64 => Some(8),
            DataType::Float => Some(4),
            DataType::Double => Some(8),
            DataType::String
            | DataType::Json
            | DataType::Array
            | DataType::FloatVector
            | DataType::SparseFloatVector => None,
        }
    }

    /// Returns true if this type requires variable-length encoding per row.
    pub fn is_variable(&self) -> bool {
        matches!(
            self,
            DataType::String | DataType::Json | DataType::Array | DataType::SparseFloatVector
        )
    }

    /// Returns true for vector types (dense or sparse).
    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::FloatVector | DataType::SparseFloatVector)
    }

    /// Returns true for plain scalar types (the fixed-width family).
    pub fn is_scalar(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Returns true if values of this type may be stored as array elements.
    pub fn is_array_element(&self) -> bool {
        self.is_scalar() || matches!(self, DataType::String)
    }
}

impl TryFrom<u8> for DataType {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DataType::Bool),
            1 => Ok(DataType::Int8),
            2 => Ok(DataType::Int16),
            3 => Ok(DataType::Int32),
            4 => Ok(DataType::Int64),
            5 => Ok(DataType::Float),
            6 => Ok(DataType::Double),
            20 => Ok(DataType::String),
            21 => Ok(DataType::Json),
            30 => Ok(DataType::Array),
            40 => Ok(DataType::FloatVector),
            41 => Ok(DataType::SparseFloatVector),
            _ => eyre::bail!("invalid DataType discriminant: {}", value),
        }
    }
}

/// Distance metric attached to vector fields.
///
/// Metadata only: the chunk engine stores and reports it but never evaluates
/// distances itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    L2,
    Ip,
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::L2 => "L2",
            Metric::Ip => "IP",
            Metric::Cosine => "COSINE",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(Metric::L2),
            "IP" => Ok(Metric::Ip),
            "COSINE" => Ok(Metric::Cosine),
            _ => eyre::bail!("unknown metric '{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sizes() {
        assert_eq!(DataType::Bool.fixed_size(), Some(1));
        assert_eq!(DataType::Int8.fixed_size(), Some(1));
        assert_eq!(DataType::Int16.fixed_size(), Some(2));
        assert_eq!(DataType::Int32.fixed_size(), Some(4));
        assert_eq!(DataType::Int64.fixed_size(), Some(8));
        assert_eq!(DataType::Float.fixed_size(), Some(4));
        assert_eq!(DataType::Double.fixed_size(), Some(8));
        assert_eq!(DataType::String.fixed_size(), None);
        assert_eq!(DataType::SparseFloatVector.fixed_size(), None);
    }

    #[test]
    fn discriminant_round_trip() {
        for dt in [
            DataType::Bool,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
            DataType::Float,
            DataType::Double,
            DataType::String,
            DataType::Json,
            DataType::Array,
            DataType::FloatVector,
            DataType::SparseFloatVector,
        ] {
            assert_eq!(DataType::try_from(dt as u8).unwrap(), dt);
        }
    }

    #[test]
    fn invalid_discriminant_rejected() {
        let result = DataType::try_from(99);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("invalid DataType discriminant"));
    }

    #[test]
    fn metric_parse() {
        assert_eq!("ip".parse::<Metric>().unwrap(), Metric::Ip);
        assert_eq!("L2".parse::<Metric>().unwrap(), Metric::L2);
        assert!("hamming".parse::<Metric>().is_err());
    }
}
