//! Fixed-width bit-field codec for a single identifier field.

use serde::{Deserialize, Serialize};

use crate::Identifier;

/// Packs, unpacks and resets one field of an [`Identifier`].
///
/// Bounded fields store `value - offset`; enumerated fields store the index
/// of the value in the sorted value table. A codec never touches bits outside
/// its own mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCodec {
    name: String,
    index: usize,
    bits: u32,
    shift: u32,
    offset: i32,
    values: Option<Vec<i32>>,
}

impl FieldCodec {
    /// Codec for a contiguous span starting at `offset`.
    pub fn bounded(
        name: impl Into<String>,
        index: usize,
        bits: u32,
        shift: u32,
        offset: i32,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            bits,
            shift,
            offset,
            values: None,
        }
    }

    /// Codec mapping a sorted value table onto indices.
    pub fn enumerated(
        name: impl Into<String>,
        index: usize,
        bits: u32,
        shift: u32,
        values: Vec<i32>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            bits,
            shift,
            offset: values.first().copied().unwrap_or(0),
            values: Some(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the field in the dictionary.
    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    pub const fn shift(&self) -> u32 {
        self.shift
    }

    pub const fn offset(&self) -> i32 {
        self.offset
    }

    pub fn is_enumerated(&self) -> bool {
        self.values.is_some()
    }

    /// Mask of the field's bits in place.
    pub const fn mask(&self) -> u64 {
        if self.bits == 0 {
            0
        } else {
            (u64::MAX >> (64 - self.bits)) << self.shift
        }
    }

    /// Field code for `value`, or `None` if the value cannot be represented.
    pub fn encode(&self, value: i32) -> Option<u64> {
        let code = match &self.values {
            Some(values) => values.binary_search(&value).ok()? as u64,
            None => {
                let delta = i64::from(value) - i64::from(self.offset);
                u64::try_from(delta).ok()?
            }
        };
        let capacity = 1_u64.checked_shl(self.bits).unwrap_or(u64::MAX);
        (code < capacity).then_some(code)
    }

    /// Value for a field code (the inverse of [`encode`](Self::encode)).
    pub fn decode(&self, code: u64) -> i32 {
        match &self.values {
            Some(values) => usize::try_from(code)
                .ok()
                .and_then(|i| values.get(i).copied())
                .unwrap_or(self.offset),
            None => (i64::from(self.offset) + code as i64) as i32,
        }
    }

    /// OR the encoded value into `id`, replacing any previous field bits.
    ///
    /// Returns `false` and leaves `id` untouched when `value` is not encodable.
    pub fn pack(&self, value: i32, id: &mut Identifier) -> bool {
        let Some(code) = self.encode(value) else {
            return false;
        };
        if self.bits == 0 {
            return true;
        }
        let raw = (id.raw() & !self.mask()) | (code << self.shift);
        *id = Identifier::from_raw(raw);
        true
    }

    /// Extract this field's value.
    pub fn unpack(&self, id: Identifier) -> i32 {
        if self.bits == 0 {
            return self.decode(0);
        }
        self.decode((id.raw() & self.mask()) >> self.shift)
    }

    /// Zero just this field's bits.
    pub fn reset(&self, id: &mut Identifier) {
        *id = Identifier::from_raw(id.raw() & !self.mask());
    }
}

/// Minimal number of bits able to hold `count` distinct codes.
pub const fn bits_for(count: u64) -> u32 {
    if count <= 1 {
        0
    } else {
        64 - (count - 1).leading_zeros()
    }
}
