// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime values that flow across connections.
//!
//! Every value carries a [`PortType`] tag, but several concrete forms can
//! share one tag (dense and sparse matrices are both `Matrix`, lattice and
//! surface fields are both `Field`). Port declarations are checked against
//! the tag at wiring time; the concrete form is re-checked at transfer time
//! through [`PortData::downcast`].

use crate::port::PortType;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Shared handle to a runtime value. Cloning is cheap; the payload is
/// immutable once sent.
pub type DatatypeHandle = Arc<Datatype>;

/// A concrete value travelling through the network.
#[derive(Debug, Clone, PartialEq)]
pub enum Datatype {
    /// Matrix data (dense or sparse).
    Matrix(Matrix),
    /// A single scalar.
    Scalar(f64),
    /// Text data.
    Text(String),
    /// Field data (values attached to a mesh).
    Field(Field),
    /// Standalone mesh data.
    Mesh(Mesh),
    /// A renderable scene object handle.
    Geometry(Geometry),
}

impl Datatype {
    /// The port-type tag this value satisfies.
    pub fn tag(&self) -> PortType {
        match self {
            Self::Matrix(_) => PortType::Matrix,
            Self::Scalar(_) => PortType::Scalar,
            Self::Text(_) => PortType::String,
            Self::Field(_) => PortType::Field,
            Self::Mesh(_) => PortType::Mesh,
            Self::Geometry(_) => PortType::Geometry,
        }
    }
}

/// Matrix data in one of its concrete layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum Matrix {
    /// Row-major dense storage.
    Dense(DenseMatrix),
    /// Coordinate-list sparse storage.
    SparseRow(SparseRowMatrix),
}

impl Matrix {
    /// Row count, regardless of layout.
    pub fn rows(&self) -> usize {
        match self {
            Self::Dense(m) => m.rows,
            Self::SparseRow(m) => m.rows,
        }
    }

    /// Column count, regardless of layout.
    pub fn cols(&self) -> usize {
        match self {
            Self::Dense(m) => m.cols,
            Self::SparseRow(m) => m.cols,
        }
    }
}

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Row-major values, `rows * cols` entries.
    pub values: Vec<f64>,
}

impl DenseMatrix {
    /// A zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![0.0; rows * cols],
        }
    }

    /// A matrix filled with one value.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    /// Value at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    /// Append the rows of `other`. Fails when the column counts differ.
    pub fn append_rows(&mut self, other: &DenseMatrix) -> Result<(), String> {
        if self.cols != other.cols {
            return Err(format!(
                "column mismatch: {} vs {}",
                self.cols, other.cols
            ));
        }
        self.values.extend_from_slice(&other.values);
        self.rows += other.rows;
        Ok(())
    }
}

/// Sparse matrix stored as `(row, col, value)` triplets.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRowMatrix {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Non-zero entries.
    pub triplets: Vec<(usize, usize, f64)>,
}

/// Field data: values bound to a mesh topology.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Regular lattice volume.
    LatVol(LatVolField),
    /// Triangulated surface.
    TriSurf(TriSurfField),
}

impl Field {
    /// Number of data values stored on the field.
    pub fn num_values(&self) -> usize {
        match self {
            Self::LatVol(f) => f.values.len(),
            Self::TriSurf(f) => f.values.len(),
        }
    }
}

/// Field on a regular lattice volume.
#[derive(Debug, Clone, PartialEq)]
pub struct LatVolField {
    /// Lattice node counts per axis.
    pub dims: [usize; 3],
    /// One value per lattice node.
    pub values: Vec<f64>,
}

impl LatVolField {
    /// A zero-valued lattice field of the given dimensions.
    pub fn zeros(dims: [usize; 3]) -> Self {
        Self {
            dims,
            values: vec![0.0; dims[0] * dims[1] * dims[2]],
        }
    }
}

/// Field on a triangulated surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TriSurfField {
    /// Vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// Triangle vertex indices.
    pub faces: Vec<[usize; 3]>,
    /// One value per vertex.
    pub values: Vec<f64>,
}

/// Standalone point cloud / mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Point positions.
    pub points: Vec<[f64; 3]>,
}

/// Opaque handle to a renderable object, consumed by the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Human-readable label for the scene object.
    pub label: String,
}

/// Types that can be sent through a typed port.
///
/// `TAG` is the compile-time port tag; `downcast` is the run-time subtype
/// check applied when a value crosses a connection.
pub trait PortData: Sized {
    /// Port tag this type is assignable to.
    const TAG: PortType;

    /// View a runtime value as this type, if the concrete form matches.
    fn downcast(value: &Datatype) -> Option<&Self>;

    /// Wrap this value for transfer.
    fn upcast(self) -> Datatype;
}

impl PortData for Matrix {
    const TAG: PortType = PortType::Matrix;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Matrix(m) => Some(m),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Matrix(self)
    }
}

impl PortData for DenseMatrix {
    const TAG: PortType = PortType::Matrix;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Matrix(Matrix::Dense(m)) => Some(m),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Matrix(Matrix::Dense(self))
    }
}

impl PortData for SparseRowMatrix {
    const TAG: PortType = PortType::Matrix;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Matrix(Matrix::SparseRow(m)) => Some(m),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Matrix(Matrix::SparseRow(self))
    }
}

impl PortData for f64 {
    const TAG: PortType = PortType::Scalar;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Scalar(s) => Some(s),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Scalar(self)
    }
}

impl PortData for String {
    const TAG: PortType = PortType::String;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Text(s) => Some(s),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Text(self)
    }
}

impl PortData for Field {
    const TAG: PortType = PortType::Field;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Field(f) => Some(f),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Field(self)
    }
}

impl PortData for LatVolField {
    const TAG: PortType = PortType::Field;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Field(Field::LatVol(f)) => Some(f),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Field(Field::LatVol(self))
    }
}

impl PortData for TriSurfField {
    const TAG: PortType = PortType::Field;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Field(Field::TriSurf(f)) => Some(f),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Field(Field::TriSurf(self))
    }
}

impl PortData for Mesh {
    const TAG: PortType = PortType::Mesh;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Mesh(m) => Some(m),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Mesh(self)
    }
}

impl PortData for Geometry {
    const TAG: PortType = PortType::Geometry;

    fn downcast(value: &Datatype) -> Option<&Self> {
        match value {
            Datatype::Geometry(g) => Some(g),
            _ => None,
        }
    }

    fn upcast(self) -> Datatype {
        Datatype::Geometry(self)
    }
}

impl PortData for Datatype {
    const TAG: PortType = PortType::Datatype;

    fn downcast(value: &Datatype) -> Option<&Self> {
        Some(value)
    }

    fn upcast(self) -> Datatype {
        self
    }
}

/// A [`DatatypeHandle`] whose concrete form was verified against `T`.
#[derive(Debug, Clone)]
pub struct TypedHandle<T: PortData> {
    handle: DatatypeHandle,
    _marker: PhantomData<T>,
}

impl<T: PortData> TypedHandle<T> {
    /// Verify `handle` against `T`; returns the handle back on mismatch.
    pub fn new(handle: DatatypeHandle) -> Result<Self, DatatypeHandle> {
        if T::downcast(&handle).is_some() {
            Ok(Self {
                handle,
                _marker: PhantomData,
            })
        } else {
            Err(handle)
        }
    }

    /// The underlying shared handle.
    pub fn handle(&self) -> &DatatypeHandle {
        &self.handle
    }

    /// Unwrap into the shared handle.
    pub fn into_handle(self) -> DatatypeHandle {
        self.handle
    }
}

impl<T: PortData> Deref for TypedHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match T::downcast(&self.handle) {
            Some(value) => value,
            // Verified in `new`; the payload behind an Arc never changes.
            None => unreachable!("TypedHandle holds a verified value"),
        }
    }
}
