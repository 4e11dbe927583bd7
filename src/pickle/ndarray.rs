//! numpy `dtype` and `ndarray` reconstruction.
//!
//! numpy pickles an array as `_reconstruct(ndarray, (0,), b'b')` followed by
//! BUILD with `(version, shape, dtype, is_fortran, rawdata)`, and a dtype as
//! `dtype('f4', 0, 1)` followed by BUILD with
//! `(version, byteorder, subarray, names, fields, elsize, alignment, flags)`.
//! Under Python 2 `rawdata` and `byteorder` are `str`, so a Python 3 reader has
//! to decode them with latin-1 and the array re-encodes them back to bytes.

use std::fmt;
use std::sync::Arc;

use super::arrayprint::array_repr;
use super::error::{PickleError, Result};
use super::latin1_encode;
use super::value::Value;

// ---------------------------------------------------------------------------
// DType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DTypeKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DTypeKind {
    pub fn itemsize(self) -> usize {
        match self {
            DTypeKind::Bool | DTypeKind::Int8 | DTypeKind::UInt8 => 1,
            DTypeKind::Int16 | DTypeKind::UInt16 => 2,
            DTypeKind::Int32 | DTypeKind::UInt32 | DTypeKind::Float32 => 4,
            DTypeKind::Int64 | DTypeKind::UInt64 | DTypeKind::Float64 => 8,
        }
    }

    fn code(self) -> char {
        match self {
            DTypeKind::Bool => 'b',
            DTypeKind::Int8 | DTypeKind::Int16 | DTypeKind::Int32 | DTypeKind::Int64 => 'i',
            DTypeKind::UInt8 | DTypeKind::UInt16 | DTypeKind::UInt32 | DTypeKind::UInt64 => 'u',
            DTypeKind::Float32 | DTypeKind::Float64 => 'f',
        }
    }

    fn from_code(code: char, size: usize) -> Option<Self> {
        Some(match (code, size) {
            ('b' | '?', 1) => DTypeKind::Bool,
            ('i', 1) => DTypeKind::Int8,
            ('i', 2) => DTypeKind::Int16,
            ('i', 4) => DTypeKind::Int32,
            ('i', 8) => DTypeKind::Int64,
            ('u', 1) => DTypeKind::UInt8,
            ('u', 2) => DTypeKind::UInt16,
            ('u', 4) => DTypeKind::UInt32,
            ('u', 8) => DTypeKind::UInt64,
            ('f', 4) => DTypeKind::Float32,
            ('f', 8) => DTypeKind::Float64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            DTypeKind::Bool => "bool",
            DTypeKind::Int8 => "int8",
            DTypeKind::Int16 => "int16",
            DTypeKind::Int32 => "int32",
            DTypeKind::Int64 => "int64",
            DTypeKind::UInt8 => "uint8",
            DTypeKind::UInt16 => "uint16",
            DTypeKind::UInt32 => "uint32",
            DTypeKind::UInt64 => "uint64",
            DTypeKind::Float32 => "float32",
            DTypeKind::Float64 => "float64",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => DTypeKind::Bool,
            "int8" => DTypeKind::Int8,
            "int16" => DTypeKind::Int16,
            "int32" => DTypeKind::Int32,
            "int64" => DTypeKind::Int64,
            "uint8" => DTypeKind::UInt8,
            "uint16" => DTypeKind::UInt16,
            "uint32" => DTypeKind::UInt32,
            "uint64" => DTypeKind::UInt64,
            "float32" => DTypeKind::Float32,
            "float64" => DTypeKind::Float64,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(self, DTypeKind::Float32 | DTypeKind::Float64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    /// Single-byte types (`|`).
    NotApplicable,
}

impl ByteOrder {
    fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c {
            '<' => Some(ByteOrder::Little),
            '>' | '!' => Some(ByteOrder::Big),
            '|' => Some(ByteOrder::NotApplicable),
            '=' => Some(ByteOrder::native()),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
            ByteOrder::NotApplicable => '|',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DType {
    pub kind: DTypeKind,
    pub byte_order: ByteOrder,
}

impl DType {
    /// Little-endian dtype (`|` for single-byte kinds).
    pub fn new(kind: DTypeKind) -> Self {
        let byte_order = if kind.itemsize() == 1 {
            ByteOrder::NotApplicable
        } else {
            ByteOrder::Little
        };
        Self { kind, byte_order }
    }

    /// Parse a numpy type descriptor such as `f4`, `<i8`, `|u1` or `float32`.
    pub fn from_descr(descr: &str) -> Result<Self> {
        let unsupported = || PickleError::UnsupportedDType(descr.to_string());
        let mut rest = descr;
        let mut byte_order = None;
        if let Some(first) = rest.chars().next() {
            if let Some(order) = ByteOrder::from_char(first) {
                byte_order = Some(order);
                rest = &rest[first.len_utf8()..];
            }
        }

        let kind = match DTypeKind::from_name(rest) {
            Some(kind) => kind,
            None => {
                let mut chars = rest.chars();
                let code = chars.next().ok_or_else(unsupported)?;
                let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
                DTypeKind::from_code(code, size).ok_or_else(unsupported)?
            }
        };

        let mut dtype = DType::new(kind);
        if let Some(order) = byte_order {
            if kind.itemsize() > 1 {
                dtype.byte_order = order;
            }
        }
        Ok(dtype)
    }

    /// Descriptor without byte order, as numpy passes it to `dtype(...)`.
    pub fn descr(&self) -> String {
        format!("{}{}", self.kind.code(), self.kind.itemsize())
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn itemsize(&self) -> usize {
        self.kind.itemsize()
    }

    /// Apply the BUILD state of a pickled dtype.
    pub(crate) fn set_state(&mut self, state: &Value) -> Result<()> {
        let items = match state {
            Value::Tuple(items) if items.len() >= 2 => items,
            other => {
                return Err(PickleError::InvalidArray(format!(
                    "dtype state must be a tuple, got {}",
                    other.type_name()
                )))
            }
        };

        let order = match &items[1] {
            Value::String(s) => s.chars().next(),
            Value::Bytes(b) => b.first().map(|&b| char::from(b)),
            _ => None,
        }
        .and_then(ByteOrder::from_char)
        .ok_or_else(|| PickleError::InvalidArray(format!("bad dtype byte order {}", items[1])))?;

        // Structured dtypes carry field names in slot 3.
        if items.len() > 3 && items[3] != Value::None {
            return Err(PickleError::UnsupportedDType(format!(
                "structured dtype with fields {}",
                items[3]
            )));
        }

        if self.kind.itemsize() > 1 {
            self.byte_order = order;
        }
        Ok(())
    }

    /// Python 2 style BUILD state: `(3, '<', None, None, None, -1, -1, 0)`.
    pub(crate) fn state(&self) -> Value {
        Value::Tuple(vec![
            Value::Int(3),
            Value::Bytes(vec![self.byte_order.as_char() as u8]),
            Value::None,
            Value::None,
            Value::None,
            Value::Int(-1),
            Value::Int(-1),
            Value::Int(0),
        ])
    }

    fn decode(&self, raw: &[u8]) -> Scalar {
        macro_rules! read {
            ($t:ty) => {{
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(raw);
                match self.byte_order {
                    ByteOrder::Big => <$t>::from_be_bytes(buf),
                    _ => <$t>::from_le_bytes(buf),
                }
            }};
        }
        match self.kind {
            DTypeKind::Bool => Scalar::Bool(raw[0] != 0),
            DTypeKind::Int8 => Scalar::Int(i64::from(raw[0] as i8)),
            DTypeKind::Int16 => Scalar::Int(i64::from(read!(i16))),
            DTypeKind::Int32 => Scalar::Int(i64::from(read!(i32))),
            DTypeKind::Int64 => Scalar::Int(read!(i64)),
            DTypeKind::UInt8 => Scalar::UInt(u64::from(raw[0])),
            DTypeKind::UInt16 => Scalar::UInt(u64::from(read!(u16))),
            DTypeKind::UInt32 => Scalar::UInt(u64::from(read!(u32))),
            DTypeKind::UInt64 => Scalar::UInt(read!(u64)),
            DTypeKind::Float32 => Scalar::Float(f64::from(read!(f32))),
            DTypeKind::Float64 => Scalar::Float(read!(f64)),
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar – one array element
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Bool(b) => f64::from(u8::from(b)),
            Scalar::Int(i) => i as f64,
            Scalar::UInt(u) => u as f64,
            Scalar::Float(v) => v,
        }
    }

    /// Integer value; `None` for floats and for unsigned values above `i64::MAX`.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(i64::from(b)),
            Scalar::Int(i) => Some(i),
            Scalar::UInt(u) => i64::try_from(u).ok(),
            Scalar::Float(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::UInt(u) => i64::try_from(u).map_or(Value::Float(u as f64), Value::Int),
            Scalar::Float(v) => Value::Float(v),
        }
    }
}

// ---------------------------------------------------------------------------
// NdArray
// ---------------------------------------------------------------------------

/// A dense numpy array: shape, dtype and the raw element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    dtype: DType,
    fortran_order: bool,
    data: Arc<[u8]>,
}

impl NdArray {
    /// C-ordered array over `data`, which must hold exactly
    /// `product(shape) * itemsize` bytes in the dtype's byte order.
    pub fn new(shape: Vec<usize>, dtype: DType, data: Vec<u8>) -> Result<Self> {
        check_payload(&shape, dtype, data.len())?;
        Ok(Self {
            shape,
            dtype,
            fortran_order: false,
            data: data.into(),
        })
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(shape, DType::new(DTypeKind::Float32), data)
    }

    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(shape, DType::new(DTypeKind::Int64), data)
    }

    pub fn from_u8(shape: Vec<usize>, values: &[u8]) -> Result<Self> {
        Self::new(shape, DType::new(DTypeKind::UInt8), values.to_vec())
    }

    /// What `_reconstruct` returns before BUILD fills it in.
    pub(crate) fn placeholder() -> Self {
        Self {
            shape: vec![0],
            dtype: DType::new(DTypeKind::UInt8),
            fortran_order: false,
            data: Arc::from(Vec::new()),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        // Construction checked that the non-empty product fits.
        if self.shape.contains(&0) {
            0
        } else {
            self.shape.iter().product()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fortran_order(&self) -> bool {
        self.fortran_order
    }

    /// Raw element bytes in storage order.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Element at a C-order flat index.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        if index >= self.len() {
            return None;
        }
        let storage = if self.fortran_order && self.ndim() > 1 {
            self.fortran_offset(index)
        } else {
            index
        };
        let size = self.dtype.itemsize();
        let start = storage * size;
        Some(self.dtype.decode(&self.data[start..start + size]))
    }

    /// All elements in C order, converted to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        (0..self.len())
            .filter_map(|i| self.get(i))
            .map(|s| s.as_f64() as f32)
            .collect()
    }

    /// All elements in C order as integers; `None` for float arrays.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        if self.dtype.kind.is_float() {
            return None;
        }
        (0..self.len())
            .map(|i| self.get(i).and_then(Scalar::as_i64))
            .collect()
    }

    /// Items along the first axis, as iterating the array in Python yields:
    /// sub-arrays in C order, or scalars for a 1-d array. `None` when 0-d.
    pub fn outer_items(&self) -> Option<Vec<Value>> {
        let (&rows, inner_shape) = self.shape.split_first()?;
        if inner_shape.is_empty() {
            return Some((0..rows).filter_map(|i| self.get(i)).map(Scalar::into_value).collect());
        }
        let inner = if rows == 0 { 0 } else { self.len() / rows };
        let size = self.dtype.itemsize();
        let items = (0..rows)
            .map(|row| {
                let flat = row * inner..(row + 1) * inner;
                let data: Vec<u8> = if self.fortran_order {
                    flat.flat_map(|i| {
                        let start = self.fortran_offset(i) * size;
                        self.data[start..start + size].iter().copied()
                    })
                    .collect()
                } else {
                    self.data[flat.start * size..flat.end * size].to_vec()
                };
                Value::NdArray(NdArray {
                    shape: inner_shape.to_vec(),
                    dtype: self.dtype,
                    fortran_order: false,
                    data: data.into(),
                })
            })
            .collect();
        Some(items)
    }

    fn fortran_offset(&self, index: usize) -> usize {
        let mut rem = index;
        let mut offset = 0;
        let mut stride = 1;
        // C-order unravel from the last axis; Fortran strides grow from the first.
        let mut coords = vec![0usize; self.ndim()];
        for (axis, &dim) in self.shape.iter().enumerate().rev() {
            coords[axis] = rem % dim;
            rem /= dim;
        }
        for (axis, &dim) in self.shape.iter().enumerate() {
            offset += coords[axis] * stride;
            stride *= dim;
        }
        offset
    }

    /// Apply the BUILD state produced by `ndarray.__reduce__`.
    pub(crate) fn set_state(&mut self, state: Value) -> Result<()> {
        let mut items = match state {
            Value::Tuple(items) => items,
            other => {
                return Err(PickleError::InvalidArray(format!(
                    "state must be a tuple, got {}",
                    other.type_name()
                )))
            }
        };
        // Version 1 prepends an int; version 0 omits it.
        match items.len() {
            5 => {
                items.remove(0);
            }
            4 => {}
            n => {
                return Err(PickleError::InvalidArray(format!(
                    "state tuple has {n} items, expected 4 or 5"
                )))
            }
        }
        let mut items = items.into_iter();
        let (shape, dtype, fortran, payload) =
            match (items.next(), items.next(), items.next(), items.next()) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => return Err(PickleError::InvalidArray("truncated state".into())),
            };

        let shape = match shape {
            Value::Tuple(dims) | Value::List(dims) => dims
                .iter()
                .map(|d| {
                    d.as_i64()
                        .and_then(|d| usize::try_from(d).ok())
                        .ok_or_else(|| PickleError::InvalidArray(format!("bad dimension {d}")))
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(PickleError::InvalidArray(format!(
                    "shape must be a tuple, got {}",
                    other.type_name()
                )))
            }
        };
        let dtype = match dtype {
            Value::DType(dtype) => dtype,
            other => {
                return Err(PickleError::InvalidArray(format!(
                    "expected dtype, got {}",
                    other.type_name()
                )))
            }
        };
        let fortran_order = fortran.as_i64().is_some_and(|f| f != 0);
        let data: Vec<u8> = match payload {
            Value::Bytes(bytes) => bytes,
            Value::String(text) => latin1_encode(&text).map_err(|c| {
                PickleError::InvalidArray(format!(
                    "payload text contains {c:?}, which is not latin-1; \
                     load with the latin1 or bytes encoding"
                ))
            })?,
            Value::List(_) => return Err(PickleError::UnsupportedDType("object".into())),
            other => {
                return Err(PickleError::InvalidArray(format!(
                    "payload must be bytes, got {}",
                    other.type_name()
                )))
            }
        };

        check_payload(&shape, dtype, data.len())?;
        self.shape = shape;
        self.dtype = dtype;
        self.fortran_order = fortran_order;
        self.data = data.into();
        Ok(())
    }
}

/// Byte size of a `shape` array of `dtype`, `None` when it overflows `usize`.
fn payload_size(shape: &[usize], dtype: DType) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape
        .iter()
        .try_fold(dtype.itemsize(), |acc, &dim| acc.checked_mul(dim))
}

fn check_payload(shape: &[usize], dtype: DType, actual: usize) -> Result<()> {
    let expected = payload_size(shape, dtype).ok_or_else(|| {
        PickleError::InvalidArray(format!("shape {shape:?} of {} is too large", dtype.name()))
    })?;
    if actual != expected {
        return Err(PickleError::InvalidArray(format!(
            "payload has {actual} bytes, shape {shape:?} of {} needs {expected}",
            dtype.name()
        )));
    }
    Ok(())
}

impl fmt::Display for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&array_repr(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_descriptors() {
        assert_eq!(DType::from_descr("f4").unwrap(), DType::new(DTypeKind::Float32));
        let be = DType::from_descr(">i8").unwrap();
        assert_eq!(be.kind, DTypeKind::Int64);
        assert_eq!(be.byte_order, ByteOrder::Big);
        assert_eq!(DType::from_descr("|u1").unwrap().byte_order, ByteOrder::NotApplicable);
        assert_eq!(DType::from_descr("float64").unwrap().kind, DTypeKind::Float64);
        assert!(matches!(
            DType::from_descr("O8"),
            Err(PickleError::UnsupportedDType(_))
        ));
    }

    #[test]
    fn dtype_state_sets_byte_order() {
        let mut dtype = DType::from_descr("i4").unwrap();
        let state = Value::Tuple(vec![
            Value::Int(3),
            Value::String(">".into()),
            Value::None,
            Value::None,
            Value::None,
            Value::Int(-1),
            Value::Int(-1),
            Value::Int(0),
        ]);
        dtype.set_state(&state).unwrap();
        assert_eq!(dtype.byte_order, ByteOrder::Big);
    }

    #[test]
    fn reads_big_endian_elements() {
        let dtype = DType::from_descr(">i2").unwrap();
        let arr = NdArray::new(vec![2], dtype, vec![0x01, 0x00, 0xff, 0xfe]).unwrap();
        assert_eq!(arr.to_i64_vec(), Some(vec![256, -2]));
    }

    #[test]
    fn fortran_order_is_read_in_c_order() {
        // [[1, 2, 3], [4, 5, 6]] stored column-major.
        let mut arr = NdArray::placeholder();
        let payload: Vec<u8> = [1u8, 4, 2, 5, 3, 6].to_vec();
        arr.set_state(Value::Tuple(vec![
            Value::Int(1),
            Value::Tuple(vec![Value::Int(2), Value::Int(3)]),
            Value::DType(DType::new(DTypeKind::UInt8)),
            Value::Bool(true),
            Value::Bytes(payload),
        ]))
        .unwrap();
        assert_eq!(arr.to_i64_vec(), Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn state_rejects_short_payload() {
        let mut arr = NdArray::placeholder();
        let err = arr
            .set_state(Value::Tuple(vec![
                Value::Int(1),
                Value::Tuple(vec![Value::Int(4)]),
                Value::DType(DType::new(DTypeKind::Float32)),
                Value::Bool(false),
                Value::Bytes(vec![0; 8]),
            ]))
            .unwrap_err();
        assert!(matches!(err, PickleError::InvalidArray(_)));
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let huge = 1i64 << 40;
        let mut arr = NdArray::placeholder();
        let err = arr
            .set_state(Value::Tuple(vec![
                Value::Int(1),
                Value::Tuple(vec![Value::Int(huge), Value::Int(huge)]),
                Value::DType(DType::new(DTypeKind::Float32)),
                Value::Bool(false),
                Value::Bytes(vec![0; 8]),
            ]))
            .unwrap_err();
        assert!(matches!(err, PickleError::InvalidArray(ref m) if m.contains("too large")));
        assert_eq!(arr, NdArray::placeholder());

        let err = NdArray::from_u8(vec![1 << 40, 1 << 40], &[0; 4]).unwrap_err();
        assert!(matches!(err, PickleError::InvalidArray(_)));
        // A zero axis makes the product zero whatever the other axes hold.
        let empty = NdArray::from_u8(vec![usize::MAX, 2, 0], &[]).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn outer_items_split_the_first_axis() {
        let arr = NdArray::from_i64(vec![3, 2], &[1, 2, 3, 4, 5, 6]).unwrap();
        let rows = arr.outer_items().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[2],
            Value::NdArray(NdArray::from_i64(vec![2], &[5, 6]).unwrap())
        );

        let flat = NdArray::from_u8(vec![2], &[7, 9]).unwrap();
        assert_eq!(flat.outer_items(), Some(vec![Value::Int(7), Value::Int(9)]));

        let scalar = NdArray::from_u8(vec![], &[1]).unwrap();
        assert_eq!(scalar.outer_items(), None);
    }

    #[test]
    fn fortran_rows_come_out_in_c_order() {
        let mut arr = NdArray::placeholder();
        // Column-major storage of [[1, 2, 3], [4, 5, 6]].
        arr.set_state(Value::Tuple(vec![
            Value::Int(1),
            Value::Tuple(vec![Value::Int(2), Value::Int(3)]),
            Value::DType(DType::new(DTypeKind::UInt8)),
            Value::Bool(true),
            Value::Bytes(vec![1, 4, 2, 5, 3, 6]),
        ]))
        .unwrap();
        let rows = arr.outer_items().unwrap();
        let first = NdArray::from_u8(vec![3], &[1, 2, 3]).unwrap();
        assert_eq!(rows[0], Value::NdArray(first));
    }

    #[test]
    fn latin1_text_payload_is_reencoded() {
        let mut arr = NdArray::placeholder();
        arr.set_state(Value::Tuple(vec![
            Value::Int(1),
            Value::Tuple(vec![Value::Int(2)]),
            Value::DType(DType::new(DTypeKind::UInt8)),
            Value::Bool(false),
            Value::String("\u{ff}\u{80}".into()),
        ]))
        .unwrap();
        assert_eq!(arr.raw_bytes(), &[0xff, 0x80]);
    }

    #[test]
    fn small_array_repr() {
        let arr = NdArray::from_f32(vec![2, 2], &[0.0, 0.5, 1.0, 0.25]).unwrap();
        assert_eq!(
            arr.to_string(),
            "array([[0.  , 0.5 ],\n       [1.  , 0.25]], dtype=float32)"
        );
        let labels = NdArray::from_i64(vec![3], &[5, 0, 4]).unwrap();
        assert_eq!(labels.to_string(), "array([5, 0, 4])");
    }

    #[test]
    fn large_array_repr_is_summarised() {
        let values: Vec<i64> = (0..2000).collect();
        let arr = NdArray::from_i64(vec![2000], &values).unwrap();
        assert_eq!(arr.to_string(), "array([   0,    1,    2, ..., 1997, 1998, 1999])");
    }

    #[test]
    fn summarised_matrix_repr() {
        let values = vec![0.0f32; 10 * 200];
        let arr = NdArray::from_f32(vec![10, 200], &values).unwrap();
        let row = "[0., 0., 0., ..., 0., 0., 0.]";
        let expected = format!(
            "array([{row},\n       {row},\n       {row},\n       ...,\n       {row},\n       {row},\n       {row}], dtype=float32)"
        );
        assert_eq!(arr.to_string(), expected);
    }

    #[test]
    fn empty_array_repr() {
        let arr = NdArray::from_f32(vec![0, 784], &[]).unwrap();
        assert_eq!(arr.to_string(), "array([], shape=(0, 784), dtype=float32)");
    }
}
