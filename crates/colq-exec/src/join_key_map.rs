//! Join-key map: encoded key bytes → 64-bit chain locator.
//!
//! Keys are written column by column through [`MapKey`], which is a
//! [`RowWriter`] validating each value against the declared key types. The
//! finished key is then either upserted ([`MapKey::find_or_create`], build
//! side) or looked up ([`MapKey::find_value`], probe side). The probe path
//! never inserts.
//!
//! ## Key encoding
//! Per column: one tag byte, then the payload. `INT` is 4 bytes LE, `LONG`
//! 8 bytes LE (an `INT` written into a `LONG` key is widened first), `DOUBLE`
//! its IEEE bits with `-0.0` folded into `0.0` and every NaN folded into one
//! pattern, `BOOLEAN` one byte, `VARCHAR` a `u32` LE length and the UTF-8
//! bytes. NULL is the tag alone, so NULL keys match each other.

use colq_error::{ColqError, Result};
use colq_types::{ColumnType, ValueRef};
use hashbrown::HashMap;
use hashbrown::hash_map::EntryRef;
use smallvec::SmallVec;

use crate::sink::RowWriter;

/// Locator value meaning "no chain".
pub const NO_LOCATOR: u64 = u64::MAX;

const TAG_NULL: u8 = 0;
const TAG_BOOLEAN: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_LONG: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_VARCHAR: u8 = 5;

/// Unordered map from join-key encodings to chain head locators.
#[derive(Debug)]
pub struct JoinKeyMap {
    key_types: SmallVec<[ColumnType; 4]>,
    entries: HashMap<Box<[u8]>, u64>,
    key_buf: Vec<u8>,
    initial_capacity: usize,
    is_open: bool,
}

impl JoinKeyMap {
    /// Create a map for `key_types` keys and `value_types` values.
    ///
    /// The only supported value layout is a single `LONG` (the locator).
    /// Symbol keys must be declared `VARCHAR`: symbol keys are local to their
    /// table, so they are joined on text.
    pub fn try_new(
        key_types: &[ColumnType],
        value_types: &[ColumnType],
        initial_capacity: usize,
    ) -> Result<Self> {
        if key_types.is_empty() {
            return Err(ColqError::invalid_config("join key map needs at least one key column"));
        }
        if let Some(pos) = key_types.iter().position(|t| *t == ColumnType::Symbol) {
            return Err(ColqError::invalid_config(format!(
                "join key column {pos} is SYMBOL; declare symbol keys as VARCHAR"
            )));
        }
        if value_types != [ColumnType::Long] {
            return Err(ColqError::invalid_config(format!(
                "join key map value must be a single LONG locator, got {value_types:?}"
            )));
        }
        Ok(Self {
            key_types: key_types.iter().copied().collect(),
            entries: HashMap::with_capacity(initial_capacity),
            key_buf: Vec::with_capacity(64),
            initial_capacity,
            is_open: true,
        })
    }

    /// Start writing a new key. Any previously written key is discarded.
    pub fn with_key(&mut self) -> MapKey<'_> {
        self.key_buf.clear();
        MapKey {
            map: self,
            column: 0,
        }
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn key_types(&self) -> &[ColumnType] {
        &self.key_types
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Drop all entries, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Make a closed map usable again.
    pub fn reopen(&mut self) {
        if !self.is_open {
            self.entries = HashMap::with_capacity(self.initial_capacity);
            self.is_open = true;
        }
    }

    /// Drop all entries and release their memory.
    pub fn close(&mut self) {
        if self.is_open {
            self.entries = HashMap::new();
            self.key_buf = Vec::new();
            self.is_open = false;
        }
    }
}

/// Key under construction.
pub struct MapKey<'m> {
    map: &'m mut JoinKeyMap,
    column: usize,
}

impl<'m> MapKey<'m> {
    /// Encoded key bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.map.key_buf
    }

    /// Insert-or-find: the build path. A new entry starts at
    /// [`NO_LOCATOR`] and is flagged by [`MapValue::is_new`].
    pub fn find_or_create(self) -> Result<MapValue<'m>> {
        self.check_complete()?;
        let map = self.map;
        let JoinKeyMap {
            entries, key_buf, ..
        } = map;
        let value = match entries.entry_ref(key_buf.as_slice()) {
            EntryRef::Occupied(entry) => MapValue {
                slot: entry.into_mut(),
                is_new: false,
            },
            EntryRef::Vacant(entry) => MapValue {
                slot: entry.insert(NO_LOCATOR),
                is_new: true,
            },
        };
        Ok(value)
    }

    /// Pure lookup: the probe path. Never inserts.
    pub fn find_value(self) -> Result<Option<u64>> {
        self.check_complete()?;
        Ok(self.map.entries.get(self.map.key_buf.as_slice()).copied())
    }

    fn check_complete(&self) -> Result<()> {
        let expected = self.map.key_types.len();
        if self.column != expected {
            return Err(ColqError::internal(format!(
                "join key has {} of {expected} columns",
                self.column
            )));
        }
        Ok(())
    }
}

impl RowWriter for MapKey<'_> {
    fn put(&mut self, value: ValueRef<'_>) -> Result<()> {
        let Some(&key_type) = self.map.key_types.get(self.column) else {
            return Err(ColqError::internal(format!(
                "join key declares {} columns, sink wrote more",
                self.map.key_types.len()
            )));
        };
        encode_key_value(&mut self.map.key_buf, key_type, value)?;
        self.column += 1;
        Ok(())
    }
}

/// Value slot of a map entry.
pub struct MapValue<'m> {
    slot: &'m mut u64,
    is_new: bool,
}

impl MapValue<'_> {
    /// True when the entry was created by this `find_or_create` call.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    #[must_use]
    pub fn locator(&self) -> u64 {
        *self.slot
    }

    pub fn set_locator(&mut self, locator: u64) {
        *self.slot = locator;
    }
}

fn encode_key_value(buf: &mut Vec<u8>, key_type: ColumnType, value: ValueRef<'_>) -> Result<()> {
    match (key_type, value) {
        (_, ValueRef::Null) => buf.push(TAG_NULL),
        (ColumnType::Boolean, ValueRef::Boolean(v)) => {
            buf.push(TAG_BOOLEAN);
            buf.push(u8::from(v));
        }
        (ColumnType::Int, ValueRef::Int(v)) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        (ColumnType::Long, ValueRef::Int(_) | ValueRef::Long(_)) => {
            let v = value.as_i64().unwrap_or_default();
            buf.push(TAG_LONG);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        (ColumnType::Double, ValueRef::Double(v)) => {
            buf.push(TAG_DOUBLE);
            buf.extend_from_slice(&canonical_double_bits(v).to_le_bytes());
        }
        (ColumnType::Varchar, ValueRef::Varchar(s)) => {
            let len = u32::try_from(s.len()).map_err(|_| ColqError::LimitExceeded {
                resource: "join key varchar bytes",
                limit: u32::MAX as usize,
            })?;
            buf.push(TAG_VARCHAR);
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        (expected, actual) => {
            return Err(ColqError::TypeMismatch {
                expected: expected.as_str(),
                actual: actual.type_name(),
            });
        }
    }
    Ok(())
}

fn canonical_double_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0.0_f64.to_bits()
    } else {
        v.to_bits()
    }
}
