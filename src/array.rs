// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! In-memory columns.
//!
//! The engine stores non-nullable fixed-width values, so arrays here are a
//! plain `Vec` of the native type. [`ArrayImpl`] embeds one variant per
//! physical type plus `Bool`, which only appears as the transient result of
//! a filter expression.

use std::ops::Range as StdRange;

use crate::types::{DataValue, PhysicalType};

/// A trait over the native types an array can hold.
pub trait NativeType:
    Copy + Default + PartialOrd + Send + Sync + std::fmt::Debug + 'static
{
}

macro_rules! impl_native_type {
    ($($ty:ty),*) => {
        $(impl NativeType for $ty {})*
    };
}

impl_native_type!(bool, u8, u16, u32, u64, i8, i64);

/// A trait over all arrays.
pub trait Array: Sized + Send + Sync + 'static {
    /// Corresponding builder of this array.
    type Builder: ArrayBuilder<Array = Self>;

    /// Type of element in the array.
    type Item: Copy;

    /// Retrieve a value by index.
    fn get(&self, idx: usize) -> Self::Item;

    /// Number of items in the array.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all values of the array.
    fn iter(&self) -> ArrayValueIter<'_, Self> {
        ArrayValueIter { array: self, pos: 0 }
    }
}

/// A trait over all array builders.
pub trait ArrayBuilder: Send + 'static {
    /// Corresponding `Array` of this builder.
    type Array: Array<Builder = Self>;

    fn with_capacity(capacity: usize) -> Self;

    /// Append a value to the builder.
    fn push(&mut self, value: <Self::Array as Array>::Item);

    /// Append a whole array to the builder.
    fn append(&mut self, other: &Self::Array);

    /// Finish building and return the array.
    fn finish(self) -> Self::Array;
}

/// An iterator over the values of an [`Array`].
pub struct ArrayValueIter<'a, A: Array> {
    array: &'a A,
    pos: usize,
}

impl<A: Array> Iterator for ArrayValueIter<'_, A> {
    type Item = A::Item;

    fn next(&mut self) -> Option<A::Item> {
        if self.pos >= self.array.len() {
            None
        } else {
            let item = self.array.get(self.pos);
            self.pos += 1;
            Some(item)
        }
    }
}

/// A collection of primitive values.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveArray<T: NativeType> {
    data: Vec<T>,
}

impl<T: NativeType> Array for PrimitiveArray<T> {
    type Builder = PrimitiveArrayBuilder<T>;
    type Item = T;

    fn get(&self, idx: usize) -> T {
        self.data[idx]
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl<T: NativeType> From<Vec<T>> for PrimitiveArray<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T: NativeType> FromIterator<T> for PrimitiveArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

/// `PrimitiveArrayBuilder` constructs a [`PrimitiveArray`] value by value.
pub struct PrimitiveArrayBuilder<T: NativeType> {
    data: Vec<T>,
}

impl<T: NativeType> ArrayBuilder for PrimitiveArrayBuilder<T> {
    type Array = PrimitiveArray<T>;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: T) {
        self.data.push(value);
    }

    fn append(&mut self, other: &PrimitiveArray<T>) {
        self.data.extend_from_slice(&other.data);
    }

    fn finish(self) -> PrimitiveArray<T> {
        PrimitiveArray { data: self.data }
    }
}

pub type BoolArray = PrimitiveArray<bool>;
pub type U8Array = PrimitiveArray<u8>;
pub type U16Array = PrimitiveArray<u16>;
pub type U32Array = PrimitiveArray<u32>;
pub type U64Array = PrimitiveArray<u64>;
pub type I8Array = PrimitiveArray<i8>;
pub type I64Array = PrimitiveArray<i64>;

/// Embeds all array types of the engine.
///
/// `Date` shares the `u16` representation with `UInt16` but keeps its own
/// variant so values surface as [`DataValue::Date`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayImpl {
    Bool(BoolArray),
    UInt8(U8Array),
    UInt16(U16Array),
    UInt32(U32Array),
    UInt64(U64Array),
    Int8(I8Array),
    Int64(I64Array),
    Date(U16Array),
}

/// Dispatch a method call to every [`ArrayImpl`] variant.
macro_rules! for_each_variant {
    ($self:expr, $array:ident, $body:expr) => {
        match $self {
            ArrayImpl::Bool($array) => $body,
            ArrayImpl::UInt8($array) => $body,
            ArrayImpl::UInt16($array) => $body,
            ArrayImpl::UInt32($array) => $body,
            ArrayImpl::UInt64($array) => $body,
            ArrayImpl::Int8($array) => $body,
            ArrayImpl::Int64($array) => $body,
            ArrayImpl::Date($array) => $body,
        }
    };
}

impl ArrayImpl {
    pub fn len(&self) -> usize {
        for_each_variant!(self, a, a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve a value by index as a [`DataValue`].
    pub fn get(&self, idx: usize) -> DataValue {
        match self {
            Self::Bool(a) => DataValue::Bool(a.get(idx)),
            Self::UInt8(a) => DataValue::UInt8(a.get(idx)),
            Self::UInt16(a) => DataValue::UInt16(a.get(idx)),
            Self::UInt32(a) => DataValue::UInt32(a.get(idx)),
            Self::UInt64(a) => DataValue::UInt64(a.get(idx)),
            Self::Int8(a) => DataValue::Int8(a.get(idx)),
            Self::Int64(a) => DataValue::Int64(a.get(idx)),
            Self::Date(a) => DataValue::Date(a.get(idx)),
        }
    }

    /// Keep the elements whose visibility bit is set and return a new array.
    pub fn filter(&self, visibility: impl Iterator<Item = bool>) -> ArrayImpl {
        macro_rules! filter_variant {
            ($variant:ident, $a:expr) => {
                ArrayImpl::$variant(
                    $a.iter()
                        .zip(visibility)
                        .filter_map(|(v, visible)| visible.then_some(v))
                        .collect(),
                )
            };
        }
        match self {
            Self::Bool(a) => filter_variant!(Bool, a),
            Self::UInt8(a) => filter_variant!(UInt8, a),
            Self::UInt16(a) => filter_variant!(UInt16, a),
            Self::UInt32(a) => filter_variant!(UInt32, a),
            Self::UInt64(a) => filter_variant!(UInt64, a),
            Self::Int8(a) => filter_variant!(Int8, a),
            Self::Int64(a) => filter_variant!(Int64, a),
            Self::Date(a) => filter_variant!(Date, a),
        }
    }

    /// Return a copy of the given index range.
    pub fn slice(&self, range: StdRange<usize>) -> ArrayImpl {
        macro_rules! slice_variant {
            ($variant:ident, $a:expr) => {
                ArrayImpl::$variant(
                    $a.iter()
                        .skip(range.start)
                        .take(range.end - range.start)
                        .collect(),
                )
            };
        }
        match self {
            Self::Bool(a) => slice_variant!(Bool, a),
            Self::UInt8(a) => slice_variant!(UInt8, a),
            Self::UInt16(a) => slice_variant!(UInt16, a),
            Self::UInt32(a) => slice_variant!(UInt32, a),
            Self::UInt64(a) => slice_variant!(UInt64, a),
            Self::Int8(a) => slice_variant!(Int8, a),
            Self::Int64(a) => slice_variant!(Int64, a),
            Self::Date(a) => slice_variant!(Date, a),
        }
    }

    /// Build a date array from raw day numbers.
    pub fn from_dates(days: Vec<u16>) -> ArrayImpl {
        ArrayImpl::Date(days.into())
    }
}

macro_rules! impl_array_impl_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<Vec<$ty>> for ArrayImpl {
                fn from(data: Vec<$ty>) -> Self {
                    ArrayImpl::$variant(data.into())
                }
            }
        )*
    };
}

impl_array_impl_from! {
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i64 => Int64
}

/// Embeds all array builders of the engine.
pub enum ArrayBuilderImpl {
    Bool(PrimitiveArrayBuilder<bool>),
    UInt8(PrimitiveArrayBuilder<u8>),
    UInt16(PrimitiveArrayBuilder<u16>),
    UInt32(PrimitiveArrayBuilder<u32>),
    UInt64(PrimitiveArrayBuilder<u64>),
    Int8(PrimitiveArrayBuilder<i8>),
    Int64(PrimitiveArrayBuilder<i64>),
    Date(PrimitiveArrayBuilder<u16>),
}

impl ArrayBuilderImpl {
    /// Create a builder for the given physical type.
    pub fn for_type(ty: PhysicalType, capacity: usize) -> Self {
        match ty {
            PhysicalType::UInt8 => Self::UInt8(PrimitiveArrayBuilder::with_capacity(capacity)),
            PhysicalType::UInt16 => Self::UInt16(PrimitiveArrayBuilder::with_capacity(capacity)),
            PhysicalType::UInt32 => Self::UInt32(PrimitiveArrayBuilder::with_capacity(capacity)),
            PhysicalType::UInt64 => Self::UInt64(PrimitiveArrayBuilder::with_capacity(capacity)),
            PhysicalType::Int8 => Self::Int8(PrimitiveArrayBuilder::with_capacity(capacity)),
            PhysicalType::Int64 => Self::Int64(PrimitiveArrayBuilder::with_capacity(capacity)),
            PhysicalType::Date => Self::Date(PrimitiveArrayBuilder::with_capacity(capacity)),
        }
    }

    /// Create a builder matching the type of a value.
    pub fn for_value(value: &DataValue, capacity: usize) -> Self {
        match value {
            DataValue::Bool(_) => Self::Bool(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::UInt8(_) => Self::UInt8(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::UInt16(_) => Self::UInt16(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::UInt32(_) => Self::UInt32(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::UInt64(_) => Self::UInt64(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::Int8(_) => Self::Int8(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::Int64(_) => Self::Int64(PrimitiveArrayBuilder::with_capacity(capacity)),
            DataValue::Date(_) => Self::Date(PrimitiveArrayBuilder::with_capacity(capacity)),
        }
    }

    /// Create a builder matching the type of an existing array.
    pub fn from_type_of_array(array: &ArrayImpl, capacity: usize) -> Self {
        match array {
            ArrayImpl::Bool(_) => Self::Bool(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::UInt8(_) => Self::UInt8(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::UInt16(_) => Self::UInt16(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::UInt32(_) => Self::UInt32(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::UInt64(_) => Self::UInt64(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::Int8(_) => Self::Int8(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::Int64(_) => Self::Int64(PrimitiveArrayBuilder::with_capacity(capacity)),
            ArrayImpl::Date(_) => Self::Date(PrimitiveArrayBuilder::with_capacity(capacity)),
        }
    }

    /// Append a value. Panics if the value type does not match the builder;
    /// the stream layer only pushes values read back from same-schema blocks.
    pub fn push(&mut self, value: &DataValue) {
        match (self, value) {
            (Self::Bool(b), DataValue::Bool(v)) => b.push(*v),
            (Self::UInt8(b), DataValue::UInt8(v)) => b.push(*v),
            (Self::UInt16(b), DataValue::UInt16(v)) => b.push(*v),
            (Self::UInt32(b), DataValue::UInt32(v)) => b.push(*v),
            (Self::UInt64(b), DataValue::UInt64(v)) => b.push(*v),
            (Self::Int8(b), DataValue::Int8(v)) => b.push(*v),
            (Self::Int64(b), DataValue::Int64(v)) => b.push(*v),
            (Self::Date(b), DataValue::Date(v)) => b.push(*v),
            (_, v) => panic!("value type mismatch in array builder: {v:?}"),
        }
    }

    pub fn finish(self) -> ArrayImpl {
        match self {
            Self::Bool(b) => ArrayImpl::Bool(b.finish()),
            Self::UInt8(b) => ArrayImpl::UInt8(b.finish()),
            Self::UInt16(b) => ArrayImpl::UInt16(b.finish()),
            Self::UInt32(b) => ArrayImpl::UInt32(b.finish()),
            Self::UInt64(b) => ArrayImpl::UInt64(b.finish()),
            Self::Int8(b) => ArrayImpl::Int8(b.finish()),
            Self::Int64(b) => ArrayImpl::Int64(b.finish()),
            Self::Date(b) => ArrayImpl::Date(b.finish()),
        }
    }
}
