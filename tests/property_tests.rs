//! Property-based tests for the pickle codec.

use mnist_pkl::pickle::{self, DecodeOptions, Encoding, NdArray, Value};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1e300f64..1e300).prop_map(Value::Float),
        "\\PC{0,12}".prop_map(Value::String),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(3, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Tuple),
            // Unique keys: a repeated key would collapse on load, as in Python.
            proptest::collection::btree_map(any::<i64>(), inner, 0..4).prop_map(|map| {
                Value::Dict(map.into_iter().map(|(k, v)| (Value::Int(k), v)).collect())
            }),
        ]
    })
}

fn decode(bytes: &[u8], encoding: Encoding) -> Value {
    pickle::from_slice(bytes, DecodeOptions::with_encoding(encoding)).unwrap()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: plain Python values survive a protocol 2 round trip
    #[test]
    fn prop_values_round_trip(value in arb_value()) {
        let bytes = pickle::to_vec(&value).unwrap();
        prop_assert_eq!(decode(&bytes, Encoding::Latin1), value);
    }

    /// Property: every byte string is readable as latin-1 and as raw bytes
    #[test]
    fn prop_legacy_str_latin1_and_bytes(raw in proptest::collection::vec(any::<u8>(), 0..300)) {
        let bytes = pickle::to_vec(&Value::Bytes(raw.clone())).unwrap();

        let text: String = raw.iter().map(|&b| char::from(b)).collect();
        prop_assert_eq!(decode(&bytes, Encoding::Latin1), Value::String(text));
        prop_assert_eq!(decode(&bytes, Encoding::Bytes), Value::Bytes(raw));
    }

    /// Property: ascii decoding fails exactly when a byte is >= 0x80
    #[test]
    fn prop_ascii_rejects_high_bytes(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
        let bytes = pickle::to_vec(&Value::Bytes(raw.clone())).unwrap();
        let decoded = pickle::from_slice(&bytes, DecodeOptions::with_encoding(Encoding::Ascii));
        prop_assert_eq!(decoded.is_ok(), raw.is_ascii());
    }

    /// Property: arrays keep shape, dtype and values
    #[test]
    fn prop_arrays_round_trip(
        rows in 0usize..6,
        cols in 1usize..9,
        seed in proptest::collection::vec(-1.0e6f32..1.0e6, 54),
    ) {
        let values = &seed[..rows * cols];
        let arr = NdArray::from_f32(vec![rows, cols], values).unwrap();
        let bytes = pickle::to_vec(&Value::NdArray(arr.clone())).unwrap();

        match decode(&bytes, Encoding::Latin1) {
            Value::NdArray(back) => {
                prop_assert_eq!(back.shape(), arr.shape());
                prop_assert_eq!(back.dtype(), arr.dtype());
                prop_assert_eq!(back.to_f32_vec(), values.to_vec());
            }
            other => prop_assert!(false, "expected an ndarray, got {}", other.type_name()),
        }
    }
}
