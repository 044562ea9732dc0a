use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dynmsg::message::Value;

/// Uniform index in `[0, n)`. `n <= 1` short-circuits to zero without
/// consuming randomness.
pub(crate) fn random_index(rng: &mut StdRng, n: usize) -> usize {
    debug_assert!(n > 0);
    if n <= 1 {
        return 0;
    }
    rng.gen_range(0..n)
}

/// True with probability 1/n.
pub(crate) fn random_bool(rng: &mut StdRng, n: usize) -> bool {
    random_index(rng, n) == 0
}

/// Flips one uniformly chosen bit of the buffer.
pub(crate) fn flip_bit(rng: &mut StdRng, bytes: &mut [u8]) {
    let bit = random_index(rng, bytes.len() * 8);
    bytes[bit / 8] ^= 1 << (bit % 8);
}

/// Per-primitive-type value mutation hooks. `StdValueMutator` supplies
/// the default strategies; alternative implementations may replace any of
/// them (e.g. dictionary-driven string edits).
pub trait ValueMutator {
    fn new(seed: u64) -> Self
    where
        Self: Sized;

    fn mutate_i32(&mut self, value: i32) -> i32;
    fn mutate_i64(&mut self, value: i64) -> i64;
    fn mutate_u32(&mut self, value: u32) -> u32;
    fn mutate_u64(&mut self, value: u64) -> u64;
    fn mutate_f32(&mut self, value: f32) -> f32;
    fn mutate_f64(&mut self, value: f64) -> f64;
    fn mutate_bool(&mut self, value: bool) -> bool;

    /// Returns a valid index distinct from `value` whenever `count > 1`.
    fn mutate_enum(&mut self, value: usize, count: usize) -> usize;

    /// Shared by string and bytes fields; `size_hint` bounds growth.
    fn mutate_string(&mut self, value: Vec<u8>, size_hint: usize) -> Vec<u8>;
}

pub struct StdValueMutator {
    rng: StdRng,
}

impl ValueMutator for StdValueMutator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn mutate_i32(&mut self, value: i32) -> i32 {
        let mut bytes = value.to_le_bytes();
        flip_bit(&mut self.rng, &mut bytes);
        i32::from_le_bytes(bytes)
    }

    fn mutate_i64(&mut self, value: i64) -> i64 {
        let mut bytes = value.to_le_bytes();
        flip_bit(&mut self.rng, &mut bytes);
        i64::from_le_bytes(bytes)
    }

    fn mutate_u32(&mut self, value: u32) -> u32 {
        let mut bytes = value.to_le_bytes();
        flip_bit(&mut self.rng, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn mutate_u64(&mut self, value: u64) -> u64 {
        let mut bytes = value.to_le_bytes();
        flip_bit(&mut self.rng, &mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn mutate_f32(&mut self, value: f32) -> f32 {
        let mut bytes = value.to_le_bytes();
        flip_bit(&mut self.rng, &mut bytes);
        f32::from_le_bytes(bytes)
    }

    fn mutate_f64(&mut self, value: f64) -> f64 {
        let mut bytes = value.to_le_bytes();
        flip_bit(&mut self.rng, &mut bytes);
        f64::from_le_bytes(bytes)
    }

    fn mutate_bool(&mut self, value: bool) -> bool {
        !value
    }

    fn mutate_enum(&mut self, value: usize, count: usize) -> usize {
        if count <= 1 {
            return value;
        }
        (value + 1 + random_index(&mut self.rng, count - 1)) % count
    }

    fn mutate_string(&mut self, mut value: Vec<u8>, size_hint: usize) -> Vec<u8> {
        // Geometric shrink, then geometric growth up to the hint; expected
        // edit size stays O(1) per call.
        while !value.is_empty() && random_bool(&mut self.rng, 2) {
            let index = random_index(&mut self.rng, value.len());
            value.remove(index);
        }

        while value.len() < size_hint && random_bool(&mut self.rng, 2) {
            let index = random_index(&mut self.rng, value.len() + 1);
            value.insert(index, self.rng.gen::<u8>());
        }

        if !value.is_empty() {
            flip_bit(&mut self.rng, &mut value);
        }
        value
    }
}

/// Applies the matching per-type hook to a tagged value. Sub-messages are
/// never mutated as a whole; the traversal reaches their scalar
/// descendants instead.
pub(crate) fn mutate_value<V: ValueMutator>(mutator: &mut V, value: &mut Value, size_hint: usize) {
    match value {
        Value::Int32(v) => *v = mutator.mutate_i32(*v),
        Value::Int64(v) => *v = mutator.mutate_i64(*v),
        Value::UInt32(v) => *v = mutator.mutate_u32(*v),
        Value::UInt64(v) => *v = mutator.mutate_u64(*v),
        Value::Float(v) => *v = mutator.mutate_f32(*v),
        Value::Double(v) => *v = mutator.mutate_f64(*v),
        Value::Bool(v) => *v = mutator.mutate_bool(*v),
        Value::Enum(e) => {
            e.index = mutator.mutate_enum(e.index, e.count);
            debug_assert!(e.index < e.count);
        }
        Value::Str(bytes) => *bytes = mutator.mutate_string(std::mem::take(bytes), size_hint),
        Value::Bytes(bytes) => *bytes = mutator.mutate_string(std::mem::take(bytes), size_hint),
        Value::Message(_) => {}
    }
}
