//! Typed column storage (spec §3, design notes: "three concrete vectors is
//! enough: int64, float64, string; enum is a small dictionary + int codes").

use fnv::FnvHashMap;

/// A type hint as accepted on insert/query (`X-QCache-types`, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    String,
    Enum,
}

/// One column's storage. Int columns never hold nulls (§3: "Null/missing
/// permitted only in float columns ... and for string columns"). Enum
/// columns are dictionary-encoded for compact, equality-only comparison.
#[derive(Debug, Clone)]
pub enum Column {
    Int(Vec<i64>),
    /// NaN is the null representation.
    Float(Vec<f64>),
    /// `None` is a true null (JSON `null` / a missing key); `Some(String::new())`
    /// is a literal empty string, distinct from null (§3, open question
    /// resolved as: literal empty string).
    Str(Vec<Option<String>>),
    Enum(EnumColumn),
}

#[derive(Debug, Clone, Default)]
pub struct EnumColumn {
    pub dict: Vec<String>,
    by_value: FnvHashMap<String, u32>,
    /// `u32::MAX` is the null sentinel.
    pub codes: Vec<u32>,
}

pub const ENUM_NULL: u32 = u32::MAX;

impl EnumColumn {
    pub fn from_strings(values: &[Option<String>]) -> Self {
        let mut enc = EnumColumn::default();
        for v in values {
            enc.codes.push(match v {
                None => ENUM_NULL,
                Some(s) => enc_intern(&mut enc.dict, &mut enc.by_value, s),
            });
        }
        enc
    }

    pub fn push(&mut self, value: Option<&str>) {
        let code = match value {
            None => ENUM_NULL,
            Some(s) => enc_intern(&mut self.dict, &mut self.by_value, s),
        };
        self.codes.push(code);
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        let code = self.codes[idx];
        if code == ENUM_NULL {
            None
        } else {
            Some(self.dict[code as usize].as_str())
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn enc_intern(dict: &mut Vec<String>, by_value: &mut FnvHashMap<String, u32>, s: &str) -> u32 {
    if let Some(&code) = by_value.get(s) {
        return code;
    }
    let code = dict.len() as u32;
    dict.push(s.to_string());
    by_value.insert(s.to_string(), code);
    code
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Enum(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Int(_) => "int64",
            Column::Float(_) => "float64",
            Column::Str(_) => "string",
            Column::Enum(_) => "enum",
        }
    }

    /// Selects rows by index, preserving order, for a generic row-subset
    /// operation shared by filtering, distinct, sort and slicing.
    pub fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(indices.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(indices.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(indices.iter().map(|&i| v[i].clone()).collect()),
            Column::Enum(v) => {
                let mut out = EnumColumn {
                    dict: v.dict.clone(),
                    by_value: v.by_value.clone(),
                    codes: indices.iter().map(|&i| v.codes[i]).collect(),
                };
                // Keep dict/by_value in sync (take doesn't need re-interning
                // since codes reference the same dict).
                out.by_value = v.by_value.clone();
                Column::Enum(out)
            }
        }
    }

    /// An estimate of resident bytes: 8 bytes/cell for fixed-width columns,
    /// UTF-8 byte length summed for strings, dictionary + code width for
    /// enum (§4.3.6).
    pub fn byte_size(&self) -> usize {
        match self {
            Column::Int(v) => v.len() * 8,
            Column::Float(v) => v.len() * 8,
            Column::Str(v) => v
                .iter()
                .map(|s| s.as_ref().map(|s| s.len()).unwrap_or(0))
                .sum(),
            Column::Enum(v) => {
                v.codes.len() * 4 + v.dict.iter().map(|s| s.len()).sum::<usize>()
            }
        }
    }

    pub fn is_null_at(&self, idx: usize) -> bool {
        match self {
            Column::Int(_) => false,
            Column::Float(v) => v[idx].is_nan(),
            Column::Str(v) => v[idx].is_none(),
            Column::Enum(v) => v.codes[idx] == ENUM_NULL,
        }
    }
}
