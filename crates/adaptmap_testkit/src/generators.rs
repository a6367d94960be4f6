//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random base keys, sub-keys, values
//! and operation sequences against logical maps.

use adaptmap_store::{SubKey, Value};
use proptest::prelude::*;

/// Strategy for generating valid base keys shaped like `customer:day`.
pub fn base_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,8}:[0-9]{1,13}").expect("Invalid regex")
}

/// Strategy for generating sub-keys from a small domain, so that
/// sequences revisit keys.
pub fn sub_key_strategy() -> impl Strategy<Value = SubKey> {
    -500i64..500
}

/// Strategy for generating strictly increasing sub-keys.
pub fn increasing_sub_keys_strategy(max_len: usize) -> impl Strategy<Value = Vec<SubKey>> {
    prop::collection::btree_set(any::<i64>(), 1..max_len).prop_map(|keys| keys.into_iter().collect())
}

/// Strategy for generating entry values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::List)
    })
}

/// An operation against a logical map.
#[derive(Debug, Clone)]
pub enum MapOperation {
    /// Put an entry
    Put {
        /// Base key
        base_key: String,
        /// Sub-key
        sub_key: SubKey,
        /// Entry value
        value: Value,
    },
    /// Get an entry
    Get {
        /// Base key
        base_key: String,
        /// Sub-key
        sub_key: SubKey,
    },
}

/// Strategy for generating operations over a fixed set of base keys.
pub fn map_operation_strategy(base_keys: Vec<String>) -> impl Strategy<Value = MapOperation> {
    let keys = prop::sample::select(base_keys);
    prop_oneof![
        3 => (keys.clone(), sub_key_strategy(), value_strategy())
            .prop_map(|(base_key, sub_key, value)| MapOperation::Put { base_key, sub_key, value }),
        1 => (keys, sub_key_strategy())
            .prop_map(|(base_key, sub_key)| MapOperation::Get { base_key, sub_key }),
    ]
}

/// Strategy for generating a sequence of operations over up to three
/// base keys.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<MapOperation>> {
    prop::collection::vec(base_key_strategy(), 1..4).prop_flat_map(move |base_keys| {
        prop::collection::vec(map_operation_strategy(base_keys), min_ops..max_ops)
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
