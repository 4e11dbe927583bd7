use std::io::Write;

use super::error::{PickleError, Result};
use super::ndarray::{DType, NdArray};
use super::op;
use super::value::Value;

/// Python 2 writes APPENDS/SETITEMS in batches of this size.
const BATCH_SIZE: usize = 1000;

/// Serialize `value` as a protocol 2 pickle.
pub fn to_vec(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    to_writer(&mut buf, value)?;
    Ok(buf)
}

pub fn to_writer<W: Write>(writer: W, value: &Value) -> Result<()> {
    Pickler::new(writer).dump(value)
}

// ---------------------------------------------------------------------------
// Pickler
// ---------------------------------------------------------------------------

/// Protocol 2 encoder producing the layout of Python 2's `cPickle`:
/// `Bytes` are written as `str` (BINSTRING), `String` as `unicode`.
pub struct Pickler<W> {
    writer: W,
    next_memo: u32,
}

impl<W: Write> Pickler<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            next_memo: 0,
        }
    }

    pub fn dump(&mut self, value: &Value) -> Result<()> {
        self.writer.write_all(&[op::PROTO, 2])?;
        self.save(value)?;
        self.writer.write_all(&[op::STOP])?;
        self.writer.flush()?;
        Ok(())
    }

    fn save(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::None => self.op(op::NONE),
            Value::Bool(true) => self.op(op::NEWTRUE),
            Value::Bool(false) => self.op(op::NEWFALSE),
            Value::Int(i) => self.save_int(*i),
            Value::Float(v) => {
                self.op(op::BINFLOAT)?;
                self.raw(&v.to_be_bytes())
            }
            Value::Bytes(bytes) => {
                self.save_str(bytes)?;
                self.memoize()
            }
            Value::String(text) => {
                let len = u32::try_from(text.len())
                    .map_err(|_| PickleError::Unencodable("string longer than 4 GiB".into()))?;
                self.op(op::BINUNICODE)?;
                self.raw(&len.to_le_bytes())?;
                self.raw(text.as_bytes())?;
                self.memoize()
            }
            Value::List(items) => {
                self.op(op::EMPTY_LIST)?;
                self.memoize()?;
                self.save_batched(items, op::APPEND, op::APPENDS, |p, item| p.save(item))
            }
            Value::Tuple(items) => self.save_tuple(items),
            Value::Dict(pairs) => {
                self.op(op::EMPTY_DICT)?;
                self.memoize()?;
                self.save_batched(pairs, op::SETITEM, op::SETITEMS, |p, (k, v)| {
                    p.save(k)?;
                    p.save(v)
                })
            }
            Value::Set(items) => self.save_set("set", items),
            Value::FrozenSet(items) => self.save_set("frozenset", items),
            Value::Global { module, name } => self.save_global(module, name),
            Value::Object(obj) => {
                self.save_global(&obj.module, &obj.name)?;
                self.save_tuple(&obj.args)?;
                self.op(op::REDUCE)?;
                self.memoize()?;
                if let Some(state) = &obj.state {
                    self.save(state)?;
                    self.op(op::BUILD)?;
                }
                Ok(())
            }
            Value::DType(dtype) => self.save_dtype(dtype),
            Value::NdArray(arr) => self.save_array(arr),
        }
    }

    fn op(&mut self, opcode: u8) -> Result<()> {
        self.raw(&[opcode])
    }

    fn raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn memoize(&mut self) -> Result<()> {
        let id = self.next_memo;
        self.next_memo += 1;
        match u8::try_from(id) {
            Ok(short) => self.raw(&[op::BINPUT, short]),
            Err(_) => {
                self.op(op::LONG_BINPUT)?;
                self.raw(&id.to_le_bytes())
            }
        }
    }

    fn save_int(&mut self, value: i64) -> Result<()> {
        if let Ok(small) = u8::try_from(value) {
            self.raw(&[op::BININT1, small])
        } else if let Ok(medium) = u16::try_from(value) {
            self.op(op::BININT2)?;
            self.raw(&medium.to_le_bytes())
        } else if let Ok(word) = i32::try_from(value) {
            self.op(op::BININT)?;
            self.raw(&word.to_le_bytes())
        } else {
            let bytes = encode_long(value);
            self.raw(&[op::LONG1, bytes.len() as u8])?;
            self.raw(&bytes)
        }
    }

    /// Python 2 `str`.
    fn save_str(&mut self, bytes: &[u8]) -> Result<()> {
        match u8::try_from(bytes.len()) {
            Ok(len) => self.raw(&[op::SHORT_BINSTRING, len])?,
            Err(_) => {
                let len = i32::try_from(bytes.len())
                    .map_err(|_| PickleError::Unencodable("str longer than 2 GiB".into()))?;
                self.op(op::BINSTRING)?;
                self.raw(&len.to_le_bytes())?;
            }
        }
        self.raw(bytes)
    }

    fn save_tuple(&mut self, items: &[Value]) -> Result<()> {
        if items.is_empty() {
            return self.op(op::EMPTY_TUPLE);
        }
        let short = match items.len() {
            1 => Some(op::TUPLE1),
            2 => Some(op::TUPLE2),
            3 => Some(op::TUPLE3),
            _ => None,
        };
        if short.is_none() {
            self.op(op::MARK)?;
        }
        for item in items {
            self.save(item)?;
        }
        self.op(short.unwrap_or(op::TUPLE))?;
        self.memoize()
    }

    fn save_batched<T>(
        &mut self,
        items: &[T],
        single: u8,
        many: u8,
        mut save_one: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        for chunk in items.chunks(BATCH_SIZE) {
            if let [only] = chunk {
                save_one(self, only)?;
                self.op(single)?;
                continue;
            }
            self.op(op::MARK)?;
            for item in chunk {
                save_one(self, item)?;
            }
            self.op(many)?;
        }
        Ok(())
    }

    fn save_global(&mut self, module: &str, name: &str) -> Result<()> {
        // Python 2 spelling of the modules the decoder maps forward.
        let module = match module {
            "builtins" => "__builtin__",
            "copyreg" => "copy_reg",
            other => other,
        };
        if module.contains('\n') || name.contains('\n') {
            return Err(PickleError::Unencodable(format!(
                "global name {module:?}.{name:?} contains a newline"
            )));
        }
        self.op(op::GLOBAL)?;
        self.raw(module.as_bytes())?;
        self.raw(b"\n")?;
        self.raw(name.as_bytes())?;
        self.raw(b"\n")?;
        self.memoize()
    }

    /// `set(list)` via REDUCE, as protocol 2 has no set opcodes.
    fn save_set(&mut self, name: &str, items: &[Value]) -> Result<()> {
        self.save_global("builtins", name)?;
        self.op(op::EMPTY_LIST)?;
        self.memoize()?;
        self.save_batched(items, op::APPEND, op::APPENDS, |p, item| p.save(item))?;
        self.op(op::TUPLE1)?;
        self.memoize()?;
        self.op(op::REDUCE)?;
        self.memoize()
    }

    /// `dtype('f4', 0, 1)` + BUILD.
    fn save_dtype(&mut self, dtype: &DType) -> Result<()> {
        self.save_global("numpy", "dtype")?;
        self.save_tuple(&[
            Value::Bytes(dtype.descr().into_bytes()),
            Value::Int(0),
            Value::Int(1),
        ])?;
        self.op(op::REDUCE)?;
        self.memoize()?;
        self.save(&dtype.state())?;
        self.op(op::BUILD)
    }

    /// `_reconstruct(ndarray, (0,), 'b')` + BUILD with the raw payload as `str`.
    fn save_array(&mut self, arr: &NdArray) -> Result<()> {
        self.save_global("numpy.core.multiarray", "_reconstruct")?;
        self.save_tuple(&[
            Value::Global {
                module: "numpy".into(),
                name: "ndarray".into(),
            },
            Value::Tuple(vec![Value::Int(0)]),
            Value::Bytes(b"b".to_vec()),
        ])?;
        self.op(op::REDUCE)?;
        self.memoize()?;

        self.op(op::MARK)?;
        self.save_int(1)?;
        let shape: Vec<Value> = arr.shape().iter().map(|&d| Value::Int(d as i64)).collect();
        self.save_tuple(&shape)?;
        self.save_dtype(&arr.dtype())?;
        self.save(&Value::Bool(arr.is_fortran_order()))?;
        self.save_str(arr.raw_bytes())?;
        self.memoize()?;
        self.op(op::TUPLE)?;
        self.memoize()?;
        self.op(op::BUILD)
    }
}

/// Minimal little-endian two's complement bytes, as LONG1 expects.
fn encode_long(value: i64) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let prev_high = bytes[bytes.len() - 2] & 0x80;
        let redundant = (last == 0x00 && prev_high == 0) || (last == 0xff && prev_high != 0);
        if !redundant {
            break;
        }
        bytes.pop();
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::{from_slice, DecodeOptions, Encoding};

    #[test]
    fn matches_python2_cpickle_layout() {
        // cPickle.dumps((1, '\xe9'), 2)
        let v = Value::Tuple(vec![Value::Int(1), Value::Bytes(vec![0xe9])]);
        assert_eq!(to_vec(&v).unwrap(), b"\x80\x02K\x01U\x01\xe9q\x00\x86q\x01.");
    }

    #[test]
    fn long_encoding_is_minimal() {
        assert_eq!(encode_long(32768), vec![0x00, 0x80, 0x00]);
        assert_eq!(encode_long(-1), vec![0xff]);
        assert_eq!(encode_long(-129), vec![0x7f, 0xff]);
        assert_eq!(encode_long(i64::MAX).len(), 8);
    }

    #[test]
    fn python2_str_decodes_by_encoding() {
        let v = Value::List(vec![Value::Bytes(b"caf\xe9".to_vec()), Value::String("é".into())]);
        let blob = to_vec(&v).unwrap();

        let as_text = from_slice(&blob, DecodeOptions::with_encoding(Encoding::Latin1)).unwrap();
        assert_eq!(
            as_text,
            Value::List(vec![Value::String("café".into()), Value::String("é".into())])
        );

        let as_bytes = from_slice(&blob, DecodeOptions::with_encoding(Encoding::Bytes)).unwrap();
        assert_eq!(as_bytes, v);
    }

    #[test]
    fn arrays_survive_encode_decode() {
        let images = NdArray::from_f32(vec![2, 3], &[0.0, 0.25, 1.0, 0.5, 0.75, 0.125]).unwrap();
        let labels = NdArray::from_i64(vec![2], &[7, 3]).unwrap();
        let v = Value::Tuple(vec![Value::NdArray(images), Value::NdArray(labels)]);

        let blob = to_vec(&v).unwrap();
        for encoding in [Encoding::Latin1, Encoding::Bytes] {
            let back = from_slice(&blob, DecodeOptions::with_encoding(encoding)).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn large_containers_are_batched() {
        let items: Vec<Value> = (0..2500).map(Value::Int).collect();
        let v = Value::Dict(vec![
            (Value::String("list".into()), Value::List(items.clone())),
            (Value::String("set".into()), Value::Set(items[..3].to_vec())),
        ]);
        let blob = to_vec(&v).unwrap();
        let back = from_slice(&blob, DecodeOptions::default()).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn objects_keep_args_and_state() {
        let v = Value::Object(Box::new(crate::pickle::Object {
            module: "collections".into(),
            name: "OrderedDict".into(),
            args: vec![],
            state: Some(Value::Dict(vec![(Value::Int(1), Value::None)])),
        }));
        let back = from_slice(&to_vec(&v).unwrap(), DecodeOptions::default()).unwrap();
        assert_eq!(back, v);
    }
}
