use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use log::{debug, trace};

use super::error::{PickleError, Result};
use super::ndarray::{DType, NdArray};
use super::op;
use super::value::{Object, Value};
use super::{latin1_decode, latin1_encode, DecodeOptions, Encoding};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Decode one pickled object from `reader`.
pub fn from_reader<R: Read>(reader: R, options: DecodeOptions) -> Result<Value> {
    Unpickler::new(reader, options).load()
}

/// Decode one pickled object from a byte slice.
pub fn from_slice(bytes: &[u8], options: DecodeOptions) -> Result<Value> {
    from_reader(bytes, options)
}

// ---------------------------------------------------------------------------
// Unpickler
// ---------------------------------------------------------------------------

/// A stack slot. Memoized containers live in the memo and the stack refers to
/// them, so APPEND/SETITEM/BUILD after a PUT mutate the shared object.
/// Memoized immutable values are shared with the memo instead of copied.
#[derive(Debug)]
enum Item {
    Value(Value),
    Memo(u32),
    Shared(Arc<Value>),
}

/// Pickle virtual machine.
pub struct Unpickler<R> {
    reader: R,
    options: DecodeOptions,
    /// Bytes consumed so far.
    offset: u64,
    /// Offset of the opcode being executed.
    op_offset: u64,
    stack: Vec<Item>,
    marks: Vec<usize>,
    memo: HashMap<u32, Arc<Value>>,
    protocol: u8,
}

impl<R: Read> Unpickler<R> {
    pub fn new(reader: R, options: DecodeOptions) -> Self {
        Self {
            reader,
            options,
            offset: 0,
            op_offset: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
            protocol: 0,
        }
    }

    /// Protocol announced by the last PROTO opcode (0 when absent).
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Bytes consumed from the reader.
    pub fn bytes_read(&self) -> u64 {
        self.offset
    }

    /// Run the machine until STOP and return the object on top of the stack.
    pub fn load(&mut self) -> Result<Value> {
        self.stack.clear();
        self.marks.clear();
        self.memo.clear();

        loop {
            self.op_offset = self.offset;
            let opcode = self.read_u8()?;
            match opcode {
                op::PROTO => {
                    let version = self.read_u8()?;
                    if version > op::HIGHEST_PROTOCOL {
                        return Err(PickleError::UnsupportedProtocol(version));
                    }
                    debug!("pickle protocol {version}");
                    self.protocol = version;
                }
                op::FRAME => {
                    let len = self.read_u64()?;
                    trace!("frame of {len} bytes at offset {}", self.op_offset);
                }
                op::STOP => {
                    let value = self.pop_value()?;
                    debug!(
                        "decoded {} from {} bytes ({} memo entries)",
                        value.type_name(),
                        self.offset,
                        self.memo.len()
                    );
                    self.memo.clear();
                    return Ok(value);
                }

                // -- scalars --
                op::NONE => self.push(Value::None),
                op::NEWTRUE => self.push(Value::Bool(true)),
                op::NEWFALSE => self.push(Value::Bool(false)),
                op::INT => {
                    let line = self.read_text_line("INT")?;
                    let value = match line.trim() {
                        "01" => Value::Bool(true),
                        "00" => Value::Bool(false),
                        digits => Value::Int(self.parse_int(digits, "INT")?),
                    };
                    self.push(value);
                }
                op::LONG => {
                    let line = self.read_text_line("LONG")?;
                    let digits = line.trim().trim_end_matches('L');
                    let value = self.parse_int(digits, "LONG")?;
                    self.push(Value::Int(value));
                }
                op::BININT => {
                    let value = i32::from_le_bytes(self.read_array()?);
                    self.push(Value::Int(i64::from(value)));
                }
                op::BININT1 => {
                    let value = self.read_u8()?;
                    self.push(Value::Int(i64::from(value)));
                }
                op::BININT2 => {
                    let value = u16::from_le_bytes(self.read_array()?);
                    self.push(Value::Int(i64::from(value)));
                }
                op::LONG1 => {
                    let len = usize::from(self.read_u8()?);
                    let bytes = self.read_bytes(len)?;
                    let value = self.decode_long(&bytes)?;
                    self.push(Value::Int(value));
                }
                op::LONG4 => {
                    let len = self.read_len_i32("LONG4")?;
                    let bytes = self.read_bytes(len)?;
                    let value = self.decode_long(&bytes)?;
                    self.push(Value::Int(value));
                }
                op::FLOAT => {
                    let line = self.read_text_line("FLOAT")?;
                    let value = line
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| PickleError::InvalidLiteral {
                            opcode: "FLOAT",
                            literal: line.clone(),
                            offset: self.op_offset,
                        })?;
                    self.push(Value::Float(value));
                }
                op::BINFLOAT => {
                    let value = f64::from_be_bytes(self.read_array()?);
                    self.push(Value::Float(value));
                }

                // -- strings and bytes --
                op::STRING => {
                    let line = self.read_line()?;
                    let raw = self.unquote_string(&line)?;
                    let value = self.decode_legacy_str(raw)?;
                    self.push(value);
                }
                op::BINSTRING => {
                    let len = self.read_len_i32("BINSTRING")?;
                    let raw = self.read_bytes(len)?;
                    let value = self.decode_legacy_str(raw)?;
                    self.push(value);
                }
                op::SHORT_BINSTRING => {
                    let len = usize::from(self.read_u8()?);
                    let raw = self.read_bytes(len)?;
                    let value = self.decode_legacy_str(raw)?;
                    self.push(value);
                }
                op::UNICODE => {
                    let line = self.read_line()?;
                    let text = raw_unicode_escape(&line);
                    self.push(Value::String(text));
                }
                op::SHORT_BINUNICODE => {
                    let len = usize::from(self.read_u8()?);
                    let text = self.read_utf8(len)?;
                    self.push(Value::String(text));
                }
                op::BINUNICODE => {
                    let len = u32::from_le_bytes(self.read_array()?) as usize;
                    let text = self.read_utf8(len)?;
                    self.push(Value::String(text));
                }
                op::BINUNICODE8 => {
                    let len = self.read_len_u64()?;
                    let text = self.read_utf8(len)?;
                    self.push(Value::String(text));
                }
                op::SHORT_BINBYTES => {
                    let len = usize::from(self.read_u8()?);
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::Bytes(bytes));
                }
                op::BINBYTES => {
                    let len = u32::from_le_bytes(self.read_array()?) as usize;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::Bytes(bytes));
                }
                op::BINBYTES8 | op::BYTEARRAY8 => {
                    let len = self.read_len_u64()?;
                    let bytes = self.read_bytes(len)?;
                    self.push(Value::Bytes(bytes));
                }

                // -- tuples --
                op::EMPTY_TUPLE => self.push(Value::Tuple(Vec::new())),
                op::TUPLE => {
                    let items = self.pop_mark_values()?;
                    self.push(Value::Tuple(items));
                }
                op::TUPLE1 | op::TUPLE2 | op::TUPLE3 => {
                    let n = usize::from(opcode - op::TUPLE1 + 1);
                    let mut items = Vec::with_capacity(n);
                    for _ in 0..n {
                        items.push(self.pop_value()?);
                    }
                    items.reverse();
                    self.push(Value::Tuple(items));
                }

                // -- lists --
                op::EMPTY_LIST => self.push(Value::List(Vec::new())),
                op::LIST => {
                    let items = self.pop_mark_values()?;
                    self.push(Value::List(items));
                }
                op::APPEND => {
                    let item = self.pop_value()?;
                    self.extend_list(vec![item])?;
                }
                op::APPENDS => {
                    let items = self.pop_mark_values()?;
                    self.extend_list(items)?;
                }

                // -- dicts --
                op::EMPTY_DICT => self.push(Value::Dict(Vec::new())),
                op::DICT => {
                    let items = self.pop_mark_values()?;
                    let pairs = self.pair_up(items)?;
                    self.push(Value::Dict(pairs));
                }
                op::SETITEM => {
                    let value = self.pop_value()?;
                    let key = self.pop_value()?;
                    self.set_items(vec![(key, value)])?;
                }
                op::SETITEMS => {
                    let items = self.pop_mark_values()?;
                    let pairs = self.pair_up(items)?;
                    self.set_items(pairs)?;
                }

                // -- sets --
                op::EMPTY_SET => self.push(Value::Set(Vec::new())),
                op::ADDITEMS => {
                    let items = self.pop_mark_values()?;
                    let offset = self.op_offset;
                    match self.top_mut()? {
                        Value::Set(set) => add_unique(set, items),
                        other => return Err(mismatch("set", other, offset)),
                    }
                }
                op::FROZENSET => {
                    let items = self.pop_mark_values()?;
                    let mut set = Vec::with_capacity(items.len());
                    add_unique(&mut set, items);
                    self.push(Value::FrozenSet(set));
                }

                // -- stack manipulation --
                op::MARK => self.marks.push(self.stack.len()),
                op::POP => {
                    if self.stack.len() > self.frame_floor() {
                        self.stack.pop();
                    } else {
                        self.pop_mark()?;
                    }
                }
                op::POP_MARK => {
                    self.pop_mark()?;
                }
                op::DUP => {
                    let item = match self.top_item()? {
                        Item::Value(v) => Item::Value(v.clone()),
                        Item::Memo(id) => Item::Memo(*id),
                        Item::Shared(value) => Item::Shared(Arc::clone(value)),
                    };
                    self.stack.push(item);
                }

                // -- memo --
                op::GET => {
                    let id = self.read_memo_id_line("GET")?;
                    self.memo_get(id)?;
                }
                op::BINGET => {
                    let id = u32::from(self.read_u8()?);
                    self.memo_get(id)?;
                }
                op::LONG_BINGET => {
                    let id = u32::from_le_bytes(self.read_array()?);
                    self.memo_get(id)?;
                }
                op::PUT => {
                    let id = self.read_memo_id_line("PUT")?;
                    self.memo_put(id)?;
                }
                op::BINPUT => {
                    let id = u32::from(self.read_u8()?);
                    self.memo_put(id)?;
                }
                op::LONG_BINPUT => {
                    let id = u32::from_le_bytes(self.read_array()?);
                    self.memo_put(id)?;
                }
                op::MEMOIZE => {
                    let id = self.memo.len() as u32;
                    self.memo_put(id)?;
                }

                // -- globals and object construction --
                op::GLOBAL => {
                    let module = self.read_text_line("GLOBAL")?;
                    let name = self.read_text_line("GLOBAL")?;
                    let module = self.fix_module(module);
                    self.push(Value::Global { module, name });
                }
                op::STACK_GLOBAL => {
                    let name = self.pop_value()?;
                    let module = self.pop_value()?;
                    match (module, name) {
                        (Value::String(module), Value::String(name)) => {
                            let module = self.fix_module(module);
                            self.push(Value::Global { module, name });
                        }
                        (module, _) => return Err(mismatch("str", &module, self.op_offset)),
                    }
                }
                op::REDUCE => {
                    let args = self.pop_value()?;
                    let callable = self.pop_value()?;
                    let args = match args {
                        Value::Tuple(args) => args,
                        other => return Err(mismatch("tuple", &other, self.op_offset)),
                    };
                    let value = self.call(callable, args)?;
                    self.push(value);
                }
                op::BUILD => {
                    let state = self.pop_value()?;
                    let offset = self.op_offset;
                    build(self.top_mut()?, state, offset)?;
                }
                op::NEWOBJ => {
                    let args = self.pop_value()?;
                    let cls = self.pop_value()?;
                    let args = match args {
                        Value::Tuple(args) => args,
                        other => return Err(mismatch("tuple", &other, self.op_offset)),
                    };
                    let value = self.instantiate(cls, args)?;
                    self.push(value);
                }
                op::NEWOBJ_EX => {
                    let kwargs = self.pop_value()?;
                    let args = self.pop_value()?;
                    let cls = self.pop_value()?;
                    let mut args = match args {
                        Value::Tuple(args) => args,
                        other => return Err(mismatch("tuple", &other, self.op_offset)),
                    };
                    if !matches!(&kwargs, Value::Dict(pairs) if pairs.is_empty()) {
                        args.push(kwargs);
                    }
                    let value = self.instantiate(cls, args)?;
                    self.push(value);
                }
                op::INST => {
                    let module = self.read_text_line("INST")?;
                    let name = self.read_text_line("INST")?;
                    let module = self.fix_module(module);
                    let args = self.pop_mark_values()?;
                    let value = self.call(Value::Global { module, name }, args)?;
                    self.push(value);
                }
                op::OBJ => {
                    let mut items = self.pop_mark_values()?.into_iter();
                    let cls = items
                        .next()
                        .ok_or(PickleError::StackUnderflow { offset: self.op_offset })?;
                    let value = self.call(cls, items.collect())?;
                    self.push(value);
                }
                op::READONLY_BUFFER => {}

                op::PERSID | op::BINPERSID => return Err(self.unsupported("PERSID")),
                op::EXT1 | op::EXT2 | op::EXT4 => return Err(self.unsupported("EXT")),
                op::NEXT_BUFFER => return Err(self.unsupported("NEXT_BUFFER")),

                other => {
                    return Err(PickleError::UnknownOpcode {
                        opcode: other,
                        printable: char::from(other),
                        offset: self.op_offset,
                    })
                }
            }
        }
    }

    // -- reading --

    fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        let result = self.reader.read_exact(&mut buf);
        result.map_err(|e| self.eof_or_io(e))?;
        self.offset += N as u64;
        Ok(buf)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let result = (&mut self.reader).take(len as u64).read_to_end(&mut buf);
        let read = result.map_err(|e| self.eof_or_io(e))?;
        self.offset += read as u64;
        if read < len {
            return Err(PickleError::Truncated { offset: self.offset });
        }
        Ok(buf)
    }

    /// Bytes up to (not including) the next `\n`.
    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            match self.read_u8()? {
                b'\n' => return Ok(line),
                b => line.push(b),
            }
        }
    }

    fn read_text_line(&mut self, opcode: &'static str) -> Result<String> {
        let line = self.read_line()?;
        String::from_utf8(line).map_err(|e| PickleError::InvalidLiteral {
            opcode,
            literal: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            offset: self.op_offset,
        })
    }

    fn read_utf8(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        self.decode_text(bytes, Encoding::Utf8)
    }

    fn read_len_i32(&mut self, opcode: &'static str) -> Result<usize> {
        let len = i32::from_le_bytes(self.read_array()?);
        usize::try_from(len).map_err(|_| PickleError::InvalidLiteral {
            opcode,
            literal: len.to_string(),
            offset: self.op_offset,
        })
    }

    fn read_len_u64(&mut self) -> Result<usize> {
        let len = self.read_u64()?;
        usize::try_from(len).map_err(|_| PickleError::Truncated { offset: self.offset })
    }

    fn read_memo_id_line(&mut self, opcode: &'static str) -> Result<u32> {
        let line = self.read_text_line(opcode)?;
        line.trim().parse().map_err(|_| PickleError::InvalidLiteral {
            opcode,
            literal: line.clone(),
            offset: self.op_offset,
        })
    }

    fn eof_or_io(&self, err: std::io::Error) -> PickleError {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            PickleError::Truncated { offset: self.offset }
        } else {
            PickleError::Io(err)
        }
    }

    // -- literal decoding --

    fn parse_int(&self, digits: &str, opcode: &'static str) -> Result<i64> {
        digits.parse::<i64>().map_err(|e| match e.kind() {
            std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
                PickleError::IntegerOverflow { offset: self.op_offset }
            }
            _ => PickleError::InvalidLiteral {
                opcode,
                literal: digits.to_string(),
                offset: self.op_offset,
            },
        })
    }

    /// Little-endian two's complement integer of arbitrary width.
    fn decode_long(&self, bytes: &[u8]) -> Result<i64> {
        let Some(&last) = bytes.last() else {
            return Ok(0);
        };
        let fill = if last & 0x80 != 0 { 0xff } else { 0x00 };
        let mut buf = [fill; 8];
        if bytes.len() > 8 {
            let sign_ok = (bytes[7] & 0x80) == (fill & 0x80);
            if !sign_ok || bytes[8..].iter().any(|&b| b != fill) {
                return Err(PickleError::IntegerOverflow { offset: self.op_offset });
            }
            buf.copy_from_slice(&bytes[..8]);
        } else {
            buf[..bytes.len()].copy_from_slice(bytes);
        }
        Ok(i64::from_le_bytes(buf))
    }

    /// Strip the quotes of a protocol 0 STRING argument and undo its escapes.
    fn unquote_string(&self, line: &[u8]) -> Result<Vec<u8>> {
        let quoted = line.len() >= 2
            && (line[0] == b'\'' || line[0] == b'"')
            && line[line.len() - 1] == line[0];
        if !quoted {
            return Err(PickleError::InvalidLiteral {
                opcode: "STRING",
                literal: String::from_utf8_lossy(line).into_owned(),
                offset: self.op_offset,
            });
        }
        Ok(unescape_bytes(&line[1..line.len() - 1]))
    }

    /// Apply the configured encoding to a Python 2 `str` payload.
    fn decode_legacy_str(&self, raw: Vec<u8>) -> Result<Value> {
        match self.options.encoding {
            Encoding::Bytes => Ok(Value::Bytes(raw)),
            Encoding::Latin1 => Ok(Value::String(latin1_decode(&raw))),
            encoding => self.decode_text(raw, encoding).map(Value::String),
        }
    }

    fn decode_text(&self, raw: Vec<u8>, encoding: Encoding) -> Result<String> {
        if encoding == Encoding::Ascii {
            if let Some(position) = raw.iter().position(|&b| b >= 0x80) {
                return Err(PickleError::Decode {
                    encoding: encoding.name(),
                    byte: raw[position],
                    position,
                    offset: self.op_offset,
                });
            }
        }
        String::from_utf8(raw).map_err(|e| {
            let position = e.utf8_error().valid_up_to();
            PickleError::Decode {
                encoding: encoding.name(),
                byte: e.as_bytes()[position],
                position,
                offset: self.op_offset,
            }
        })
    }

    fn fix_module(&self, module: String) -> String {
        if !self.options.fix_imports {
            return module;
        }
        match module.as_str() {
            "__builtin__" => "builtins".to_string(),
            "copy_reg" => "copyreg".to_string(),
            _ => module,
        }
    }

    // -- stack --

    fn push(&mut self, value: Value) {
        self.stack.push(Item::Value(value));
    }

    fn frame_floor(&self) -> usize {
        self.marks.last().copied().unwrap_or(0)
    }

    fn top_item(&self) -> Result<&Item> {
        if self.stack.len() <= self.frame_floor() {
            return Err(PickleError::StackUnderflow { offset: self.op_offset });
        }
        self.stack
            .last()
            .ok_or(PickleError::StackUnderflow { offset: self.op_offset })
    }

    fn top_mut(&mut self) -> Result<&mut Value> {
        let offset = self.op_offset;
        if self.stack.len() <= self.frame_floor() {
            return Err(PickleError::StackUnderflow { offset });
        }
        match self.stack.last_mut() {
            Some(Item::Value(value)) => Ok(value),
            Some(Item::Memo(id)) => {
                let id = *id;
                self.memo
                    .get_mut(&id)
                    .map(Arc::make_mut)
                    .ok_or(PickleError::MissingMemo { id, offset })
            }
            Some(Item::Shared(value)) => Ok(Arc::make_mut(value)),
            None => Err(PickleError::StackUnderflow { offset }),
        }
    }

    fn pop_value(&mut self) -> Result<Value> {
        if self.stack.len() <= self.frame_floor() {
            return Err(PickleError::StackUnderflow { offset: self.op_offset });
        }
        match self.stack.pop() {
            Some(item) => self.resolve(item),
            None => Err(PickleError::StackUnderflow { offset: self.op_offset }),
        }
    }

    fn pop_mark(&mut self) -> Result<Vec<Item>> {
        let mark = self
            .marks
            .pop()
            .ok_or(PickleError::MissingMark { offset: self.op_offset })?;
        Ok(self.stack.split_off(mark))
    }

    fn pop_mark_values(&mut self) -> Result<Vec<Value>> {
        self.pop_mark()?
            .into_iter()
            .map(|item| self.resolve(item))
            .collect()
    }

    fn resolve(&self, item: Item) -> Result<Value> {
        match item {
            Item::Value(value) => Ok(value),
            Item::Memo(id) => self
                .memo
                .get(&id)
                .map(|value| Value::clone(value))
                .ok_or(PickleError::MissingMemo {
                    id,
                    offset: self.op_offset,
                }),
            // Copied only here, and only while the memo still holds it.
            Item::Shared(value) => Ok(Arc::unwrap_or_clone(value)),
        }
    }

    fn pair_up(&self, items: Vec<Value>) -> Result<Vec<(Value, Value)>> {
        if items.len() % 2 != 0 {
            return Err(PickleError::InvalidLiteral {
                opcode: "SETITEMS",
                literal: format!("{} stack items", items.len()),
                offset: self.op_offset,
            });
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            pairs.push((k, v));
        }
        Ok(pairs)
    }

    fn extend_list(&mut self, items: Vec<Value>) -> Result<()> {
        let offset = self.op_offset;
        match self.top_mut()? {
            Value::List(list) => {
                list.extend(items);
                Ok(())
            }
            other => Err(mismatch("list", other, offset)),
        }
    }

    fn set_items(&mut self, pairs: Vec<(Value, Value)>) -> Result<()> {
        let offset = self.op_offset;
        match self.top_mut()? {
            Value::Dict(dict) => {
                for (key, value) in pairs {
                    match dict.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = value,
                        None => dict.push((key, value)),
                    }
                }
                Ok(())
            }
            Value::Object(obj) => {
                // SETITEM on an instance is `obj[key] = value`; keep it in the state.
                let state = obj.state.get_or_insert_with(|| Value::Dict(Vec::new()));
                if let Value::Dict(dict) = state {
                    dict.extend(pairs);
                }
                Ok(())
            }
            other => Err(mismatch("dict", other, offset)),
        }
    }

    // -- memo --

    fn memo_get(&mut self, id: u32) -> Result<()> {
        let value = self.memo.get(&id).ok_or(PickleError::MissingMemo {
            id,
            offset: self.op_offset,
        })?;
        let item = if value.is_mutable() {
            Item::Memo(id)
        } else {
            Item::Shared(Arc::clone(value))
        };
        self.stack.push(item);
        Ok(())
    }

    fn memo_put(&mut self, id: u32) -> Result<()> {
        if self.stack.len() <= self.frame_floor() {
            return Err(PickleError::StackUnderflow { offset: self.op_offset });
        }
        let Some(top) = self.stack.pop() else {
            return Err(PickleError::StackUnderflow { offset: self.op_offset });
        };
        trace!("memo[{id}] at offset {}", self.op_offset);
        let replacement = match top {
            Item::Value(value) if value.is_mutable() => {
                self.memo.insert(id, Arc::new(value));
                Item::Memo(id)
            }
            Item::Value(value) => {
                let value = Arc::new(value);
                self.memo.insert(id, Arc::clone(&value));
                Item::Shared(value)
            }
            Item::Shared(value) => {
                self.memo.insert(id, Arc::clone(&value));
                Item::Shared(value)
            }
            Item::Memo(other) => {
                let value = self.resolve(Item::Memo(other))?;
                self.memo.insert(id, Arc::new(value));
                Item::Memo(other)
            }
        };
        self.stack.push(replacement);
        Ok(())
    }

    // -- reduction --

    /// REDUCE / INST / OBJ: `callable(*args)` for the callables we understand.
    fn call(&self, callable: Value, args: Vec<Value>) -> Result<Value> {
        let (module, name) = match callable {
            Value::Global { module, name } => (module, name),
            other => return Err(mismatch("global", &other, self.op_offset)),
        };
        let offset = self.op_offset;
        let value = match (module.as_str(), name.as_str()) {
            ("numpy.core.multiarray" | "numpy._core.multiarray", "_reconstruct") => {
                Value::NdArray(NdArray::placeholder())
            }
            ("numpy", "dtype") => {
                let descr = match args.first() {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Bytes(b)) => latin1_decode(b),
                    Some(other) => return Err(mismatch("str", other, offset)),
                    None => return Err(PickleError::StackUnderflow { offset }),
                };
                Value::DType(DType::from_descr(&descr)?)
            }
            ("numpy.core.multiarray" | "numpy._core.multiarray", "scalar") => {
                scalar_from_args(args, offset)?
            }
            ("_codecs", "encode") => match args.as_slice() {
                [Value::String(text), Value::String(codec)] => {
                    let codec: Encoding = codec.parse().map_err(|_| PickleError::InvalidLiteral {
                        opcode: "REDUCE",
                        literal: format!("_codecs.encode codec {codec:?}"),
                        offset,
                    })?;
                    match codec {
                        Encoding::Latin1 => Value::Bytes(latin1_encode(text).map_err(|c| {
                            PickleError::InvalidLiteral {
                                opcode: "REDUCE",
                                literal: c.to_string(),
                                offset,
                            }
                        })?),
                        _ => Value::Bytes(text.as_bytes().to_vec()),
                    }
                }
                [Value::String(text)] => Value::Bytes(text.as_bytes().to_vec()),
                _ => return Err(PickleError::InvalidLiteral {
                    opcode: "REDUCE",
                    literal: "_codecs.encode arguments".to_string(),
                    offset,
                }),
            },
            ("builtins", "set") => Value::Set(iterable_items(args, offset)?),
            ("builtins", "frozenset") => Value::FrozenSet(iterable_items(args, offset)?),
            ("builtins", "bytearray") => match args.into_iter().next() {
                None => Value::Bytes(Vec::new()),
                Some(Value::Bytes(b)) => Value::Bytes(b),
                Some(Value::String(s)) => Value::Bytes(latin1_decode_back(&s, offset)?),
                Some(other) => return Err(mismatch("bytes", &other, offset)),
            },
            ("copyreg", "_reconstructor") => match args.into_iter().next() {
                Some(Value::Global { module, name }) => Value::Object(Box::new(Object {
                    module,
                    name,
                    args: Vec::new(),
                    state: None,
                })),
                Some(other) => return Err(mismatch("class", &other, offset)),
                None => return Err(PickleError::StackUnderflow { offset }),
            },
            _ => {
                trace!("opaque reduce {module}.{name} at offset {offset}");
                Value::Object(Box::new(Object {
                    module,
                    name,
                    args,
                    state: None,
                }))
            }
        };
        Ok(value)
    }

    /// NEWOBJ / NEWOBJ_EX: `cls.__new__(cls, *args)`.
    fn instantiate(&self, cls: Value, args: Vec<Value>) -> Result<Value> {
        match cls {
            Value::Global { module, name } => Ok(Value::Object(Box::new(Object {
                module,
                name,
                args,
                state: None,
            }))),
            other => Err(mismatch("class", &other, self.op_offset)),
        }
    }

    fn unsupported(&self, name: &'static str) -> PickleError {
        PickleError::UnsupportedOpcode {
            name,
            offset: self.op_offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mismatch(expected: &'static str, found: &Value, offset: u64) -> PickleError {
    PickleError::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
        offset,
    }
}

/// BUILD: hand `state` to the object on top of the stack.
fn build(target: &mut Value, state: Value, offset: u64) -> Result<()> {
    match target {
        Value::NdArray(arr) => arr.set_state(state),
        Value::DType(dtype) => dtype.set_state(&state),
        Value::Object(obj) => {
            obj.state = Some(state);
            Ok(())
        }
        other => Err(mismatch("object with state", other, offset)),
    }
}

fn add_unique(set: &mut Vec<Value>, items: Vec<Value>) {
    for item in items {
        if !set.contains(&item) {
            set.push(item);
        }
    }
}

fn iterable_items(args: Vec<Value>, offset: u64) -> Result<Vec<Value>> {
    let mut set = Vec::new();
    match args.into_iter().next() {
        None => {}
        Some(Value::List(items) | Value::Tuple(items) | Value::Set(items)) => {
            add_unique(&mut set, items)
        }
        Some(other) => return Err(mismatch("iterable", &other, offset)),
    }
    Ok(set)
}

fn latin1_decode_back(text: &str, offset: u64) -> Result<Vec<u8>> {
    latin1_encode(text).map_err(|c| PickleError::InvalidLiteral {
        opcode: "REDUCE",
        literal: c.to_string(),
        offset,
    })
}

/// `numpy.core.multiarray.scalar(dtype, payload)`: a single array element.
fn scalar_from_args(args: Vec<Value>, offset: u64) -> Result<Value> {
    let mut args = args.into_iter();
    let dtype = match args.next() {
        Some(Value::DType(dtype)) => dtype,
        Some(other) => return Err(mismatch("numpy.dtype", &other, offset)),
        None => return Err(PickleError::StackUnderflow { offset }),
    };
    let payload = match args.next() {
        Some(Value::Bytes(b)) => b,
        Some(Value::String(s)) => latin1_decode_back(&s, offset)?,
        Some(other) => return Err(mismatch("bytes", &other, offset)),
        None => return Err(PickleError::StackUnderflow { offset }),
    };
    let arr = NdArray::new(Vec::new(), dtype, payload)?;
    arr.get(0)
        .map(|s| s.into_value())
        .ok_or_else(|| PickleError::InvalidArray("empty scalar payload".into()))
}

/// Python 2 `string-escape` decoding of a STRING literal body.
fn unescape_bytes(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let b = body[i];
        if b != b'\\' || i + 1 == body.len() {
            out.push(b);
            i += 1;
            continue;
        }
        let esc = body[i + 1];
        i += 2;
        match esc {
            b'\\' | b'\'' | b'"' => out.push(esc),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'x' if i + 2 <= body.len() => {
                match std::str::from_utf8(&body[i..i + 2])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                {
                    Some(v) => {
                        out.push(v);
                        i += 2;
                    }
                    None => out.extend_from_slice(b"\\x"),
                }
            }
            b'0'..=b'7' => {
                let mut v = u32::from(esc - b'0');
                let mut digits = 1;
                while digits < 3 && i < body.len() && (b'0'..=b'7').contains(&body[i]) {
                    v = v * 8 + u32::from(body[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((v & 0xff) as u8);
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    out
}

/// Python `raw-unicode-escape`: `\uXXXX` / `\UXXXXXXXX`, every other byte is latin-1.
fn raw_unicode_escape(line: &[u8]) -> String {
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i] == b'\\' && i + 1 < line.len() && (line[i + 1] == b'u' || line[i + 1] == b'U') {
            let width = if line[i + 1] == b'u' { 4 } else { 8 };
            let hex = line.get(i + 2..i + 2 + width);
            let decoded = hex
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u32::from_str_radix(h, 16).ok())
                .and_then(char::from_u32);
            if let Some(c) = decoded {
                out.push(c);
                i += 2 + width;
                continue;
            }
        }
        out.push(char::from(line[i]));
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::ndarray::DTypeKind;

    fn load(bytes: &[u8], encoding: Encoding) -> Result<Value> {
        from_slice(bytes, DecodeOptions::with_encoding(encoding))
    }

    #[test]
    fn protocol0_list() {
        let v = load(b"(lp0\nI1\naS'a'\np1\na.", Encoding::Latin1).unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Int(1), Value::String("a".into())])
        );
    }

    #[test]
    fn protocol0_escaped_string() {
        let v = load(b"S'a\\x00\\'b\\n'\np0\n.", Encoding::Bytes).unwrap();
        assert_eq!(v, Value::Bytes(b"a\x00'b\n".to_vec()));
    }

    #[test]
    fn protocol0_booleans_and_longs() {
        let v = load(b"(I01\nI00\nL12345678901L\ntp0\n.", Encoding::Latin1).unwrap();
        assert_eq!(
            v,
            Value::Tuple(vec![
                Value::Bool(true),
                Value::Bool(false),
                Value::Int(12_345_678_901)
            ])
        );
    }

    #[test]
    fn protocol0_unicode_escape() {
        let v = load(b"Vcaf\\u00e9\np0\n.", Encoding::Ascii).unwrap();
        assert_eq!(v, Value::String("café".into()));
    }

    #[test]
    fn legacy_str_follows_encoding() {
        let blob = b"\x80\x02K\x01U\x01\xe9q\x00\x86q\x01.";

        let latin1 = load(blob, Encoding::Latin1).unwrap();
        assert_eq!(
            latin1,
            Value::Tuple(vec![Value::Int(1), Value::String("é".into())])
        );

        let raw = load(blob, Encoding::Bytes).unwrap();
        assert_eq!(
            raw,
            Value::Tuple(vec![Value::Int(1), Value::Bytes(vec![0xe9])])
        );

        let err = load(blob, Encoding::Ascii).unwrap_err();
        assert!(matches!(
            err,
            PickleError::Decode { encoding: "ascii", byte: 0xe9, position: 0, .. }
        ));

        assert!(matches!(
            load(blob, Encoding::Utf8),
            Err(PickleError::Decode { encoding: "utf-8", .. })
        ));
    }

    #[test]
    fn memoized_list_is_mutated_in_place() {
        // l = [1]; pickle.dumps((l, l), 2)
        let v = load(b"\x80\x02]q\x00K\x01ah\x00\x86q\x01.", Encoding::Latin1).unwrap();
        let l = Value::List(vec![Value::Int(1)]);
        assert_eq!(v, Value::Tuple(vec![l.clone(), l]));
    }

    #[test]
    fn memoized_string_is_fetched_again() {
        // s = 'ab'; cPickle.dumps((s, s), 2)
        let v = load(b"\x80\x02U\x02abq\x00h\x00\x86q\x01.", Encoding::Latin1).unwrap();
        let s = Value::String("ab".into());
        assert_eq!(v, Value::Tuple(vec![s.clone(), s]));
    }

    #[test]
    fn memoized_immutables_share_one_allocation() {
        let mut vm = Unpickler::new(&b""[..], DecodeOptions::default());
        vm.push(Value::Bytes(vec![7; 1 << 16]));
        vm.memo_put(0).unwrap();
        vm.memo_get(0).unwrap();

        let memo = &vm.memo[&0];
        assert_eq!(Arc::strong_count(memo), 3);
        for item in &vm.stack {
            match item {
                Item::Shared(value) => assert!(Arc::ptr_eq(value, memo)),
                other => panic!("expected a shared slot, got {other:?}"),
            }
        }
    }

    #[test]
    fn dict_setitems() {
        let v = load(b"\x80\x02}q\x00(U\x01aK\x01U\x01bK\x02u.", Encoding::Latin1).unwrap();
        assert_eq!(
            v,
            Value::Dict(vec![
                (Value::String("a".into()), Value::Int(1)),
                (Value::String("b".into()), Value::Int(2)),
            ])
        );
    }

    #[test]
    fn protocol4_frame_and_stack_global_free_dict() {
        let blob = b"\x80\x04\x95\x0c\x00\x00\x00\x00\x00\x00\x00}\x94\x8c\x01a\x94C\x01x\x94s.";
        let v = load(blob, Encoding::Ascii).unwrap();
        assert_eq!(
            v,
            Value::Dict(vec![(Value::String("a".into()), Value::Bytes(b"x".to_vec()))])
        );
    }

    #[test]
    fn python2_set_is_reduced() {
        let blob = b"\x80\x02c__builtin__\nset\nq\x00]q\x01(K\x01K\x02K\x01e\x85q\x02Rq\x03.";
        let v = load(blob, Encoding::Latin1).unwrap();
        assert_eq!(v, Value::Set(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn long1_values() {
        assert_eq!(
            load(b"\x80\x02\x8a\x03\x00\x80\x00.", Encoding::Latin1).unwrap(),
            Value::Int(32768)
        );
        assert_eq!(
            load(b"\x80\x02\x8a\x01\xff.", Encoding::Latin1).unwrap(),
            Value::Int(-1)
        );
        assert_eq!(
            load(b"\x80\x02\x8a\x00.", Encoding::Latin1).unwrap(),
            Value::Int(0)
        );
        assert!(matches!(
            load(b"\x80\x02\x8a\x09\x00\x00\x00\x00\x00\x00\x00\x00\x01.", Encoding::Latin1),
            Err(PickleError::IntegerOverflow { .. })
        ));
    }

    /// `numpy.array([1, -1], dtype='<i2')` pickled by Python 2 with protocol 2.
    const PY2_INT16_ARRAY: &[u8] = b"\x80\x02cnumpy.core.multiarray\n_reconstruct\nq\x00cnumpy\nndarray\nq\x01K\x00\x85q\x02U\x01bq\x03\x87q\x04Rq\x05(K\x01K\x02\x85q\x06cnumpy\ndtype\nq\x07U\x02i2q\x08K\x00K\x01\x87q\x09Rq\x0a(K\x03U\x01<q\x0bNNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tq\x0cb\x89U\x04\x01\x00\xff\xffq\x0dtq\x0eb.";

    #[test]
    fn python2_numpy_array_with_latin1() {
        let v = load(PY2_INT16_ARRAY, Encoding::Latin1).unwrap();
        let arr = v.as_array().expect("ndarray");
        assert_eq!(arr.shape(), &[2]);
        assert_eq!(arr.dtype().kind, DTypeKind::Int16);
        assert_eq!(arr.to_i64_vec(), Some(vec![1, -1]));
        assert_eq!(v.to_string(), "array([ 1, -1], dtype=int16)");
    }

    #[test]
    fn python2_numpy_array_with_bytes() {
        let v = load(PY2_INT16_ARRAY, Encoding::Bytes).unwrap();
        assert_eq!(v.as_array().and_then(|a| a.to_i64_vec()), Some(vec![1, -1]));
    }

    #[test]
    fn python2_numpy_array_fails_under_ascii() {
        let err = load(PY2_INT16_ARRAY, Encoding::Ascii).unwrap_err();
        assert!(matches!(err, PickleError::Decode { byte: 0xff, .. }));
    }

    #[test]
    fn unknown_global_becomes_object() {
        let blob = b"\x80\x02cmymod\nThing\nq\x00K\x07\x85q\x01Rq\x02}q\x03U\x01xK\x01sb.";
        let v = load(blob, Encoding::Latin1).unwrap();
        match v {
            Value::Object(obj) => {
                assert_eq!(obj.module, "mymod");
                assert_eq!(obj.name, "Thing");
                assert_eq!(obj.args, vec![Value::Int(7)]);
                assert_eq!(
                    obj.state,
                    Some(Value::Dict(vec![(Value::String("x".into()), Value::Int(1))]))
                );
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn error_cases() {
        assert!(matches!(
            load(b"\x80\x02\xff", Encoding::Latin1),
            Err(PickleError::UnknownOpcode { opcode: 0xff, offset: 2, .. })
        ));
        assert!(matches!(
            load(b"\x80\x02K", Encoding::Latin1),
            Err(PickleError::Truncated { .. })
        ));
        assert!(matches!(
            load(b"\x80\x02U\x05ab", Encoding::Latin1),
            Err(PickleError::Truncated { .. })
        ));
        assert!(matches!(
            load(b".", Encoding::Latin1),
            Err(PickleError::StackUnderflow { offset: 0 })
        ));
        assert!(matches!(
            load(b"\x80\x02t.", Encoding::Latin1),
            Err(PickleError::MissingMark { .. })
        ));
        assert!(matches!(
            load(b"\x80\x02h\x05.", Encoding::Latin1),
            Err(PickleError::MissingMemo { id: 5, .. })
        ));
        assert!(matches!(
            load(b"\x80\x09.", Encoding::Latin1),
            Err(PickleError::UnsupportedProtocol(9))
        ));
        assert!(matches!(
            load(b"\x80\x02K\x01K\x02a.", Encoding::Latin1),
            Err(PickleError::TypeMismatch { expected: "list", .. })
        ));
        assert!(matches!(
            load(b"\x80\x02P1\n.", Encoding::Latin1),
            Err(PickleError::UnsupportedOpcode { name: "PERSID", .. })
        ));
    }

    #[test]
    fn values_inside_a_mark_are_not_reachable() {
        // MARK then APPEND: the list sits below the mark.
        assert!(matches!(
            load(b"\x80\x02](K\x01a.", Encoding::Latin1),
            Err(PickleError::StackUnderflow { .. })
        ));
    }
}
