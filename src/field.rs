//! # Field Descriptors
//!
//! A `FieldDef` describes one column: its type, nullability, and, for
//! container types, the element type or vector dimension and metric. It is
//! pure metadata: created once by the caller and consulted by the chunk
//! builder for dispatch and validation.
//!
//! ## Container Invariant
//!
//! Element type is present iff the field is an Array; dimension and metric
//! are present iff the field is a vector type. The constructors enforce this,
//! so a `FieldDef` in hand is always well-formed.

use eyre::{ensure, Result};

use crate::types::{DataType, Metric};

/// Immutable descriptor for a single column.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    id: i64,
    data_type: DataType,
    element_type: Option<DataType>,
    nullable: bool,
    dim: Option<u32>,
    metric: Option<Metric>,
}

impl FieldDef {
    /// Creates a descriptor for a scalar, string, or JSON field.
    pub fn new(name: impl Into<String>, id: i64, data_type: DataType, nullable: bool) -> Result<Self> {
        let name = name.into();
        ensure!(
            !matches!(data_type, DataType::Array) && !data_type.is_vector(),
            "field '{}': {:?} requires a container-aware constructor",
            name,
            data_type
        );
        Ok(Self {
            name,
            id,
            data_type,
            element_type: None,
            nullable,
            dim: None,
            metric: None,
        })
    }

    /// Creates a descriptor for a nested-array field with the given element type.
    pub fn new_array(
        name: impl Into<String>,
        id: i64,
        element_type: DataType,
        nullable: bool,
    ) -> Result<Self> {
        let name = name.into();
        ensure!(
            element_type.is_array_element(),
            "field '{}': {:?} is not a valid array element type",
            name,
            element_type
        );
        Ok(Self {
            name,
            id,
            data_type: DataType::Array,
            element_type: Some(element_type),
            nullable,
            dim: None,
            metric: None,
        })
    }

    /// Creates a descriptor for a dense float-vector field.
    pub fn new_float_vector(
        name: impl Into<String>,
        id: i64,
        dim: u32,
        metric: Metric,
        nullable: bool,
    ) -> Result<Self> {
        let name = name.into();
        ensure!(dim > 0, "field '{}': vector dimension must be positive", name);
        Ok(Self {
            name,
            id,
            data_type: DataType::FloatVector,
            element_type: None,
            nullable,
            dim: Some(dim),
            metric: Some(metric),
        })
    }

    /// Creates a descriptor for a sparse float-vector field. The dimension is
    /// an upper bound used by callers for index validation, not a row length.
    pub fn new_sparse_float_vector(
        name: impl Into<String>,
        id: i64,
        dim: u32,
        metric: Metric,
        nullable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            data_type: DataType::SparseFloatVector,
            element_type: None,
            nullable,
            dim: Some(dim),
            metric: Some(metric),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn element_type(&self) -> Option<DataType> {
        self.element_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn dim(&self) -> Option<u32> {
        self.dim
    }

    pub fn metric(&self) -> Option<Metric> {
        self.metric
    }

    /// Byte width of one row in a fixed-width chunk built for this field.
    /// `dim` is the builder's target dimension (relevant for dense vectors).
    pub fn element_size(&self, dim: u32) -> Result<usize> {
        match self.data_type {
            DataType::FloatVector => {
                ensure!(
                    dim > 0,
                    "field '{}': dense vector needs a positive dimension",
                    self.name
                );
                Ok(dim as usize * 4)
            }
            other => other.fixed_size().ok_or_else(|| {
                eyre::eyre!(
                    "field '{}': {:?} has no fixed element size",
                    self.name,
                    other
                )
            }),
        }
    }
}
