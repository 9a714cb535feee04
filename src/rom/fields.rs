//! Display-ready field lists and standardized metadata properties.

use std::fmt;

/// Display base for numeric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Dec,
    /// Hexadecimal, zero-padded to `digits`.
    Hex { digits: u8 },
}

/// Value of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Number { value: u64, base: Base },
    /// Named flags; bit `i` is described by `names[i]`.
    Bitfield { names: &'static [&'static str], value: u32 },
    /// Table with one header per column.
    List { headers: &'static [&'static str], rows: Vec<Vec<String>> },
    /// Something about the file looks wrong but parsing continued.
    Warning(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) | FieldValue::Warning(s) => f.write_str(s),
            FieldValue::Number { value, base: Base::Dec } => write!(f, "{value}"),
            FieldValue::Number {
                value,
                base: Base::Hex { digits },
            } => write!(f, "0x{value:0width$X}", width = usize::from(*digits)),
            FieldValue::Bitfield { names, value } => {
                let set: Vec<&str> = names
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| value & (1 << i) != 0)
                    .map(|(_, n)| *n)
                    .collect();
                if set.is_empty() {
                    f.write_str("(none)")
                } else {
                    f.write_str(&set.join(", "))
                }
            }
            FieldValue::List { headers, rows } => {
                write!(f, "{}", headers.join(" | "))?;
                for row in rows {
                    write!(f, "\n{}", row.join(" | "))?;
                }
                Ok(())
            }
        }
    }
}

/// A named field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered list of fields, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RomFields {
    fields: Vec<Field>,
}

impl RomFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    pub fn add_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add(name, FieldValue::String(value.into()));
    }

    pub fn add_dec(&mut self, name: impl Into<String>, value: u64) {
        self.add(
            name,
            FieldValue::Number {
                value,
                base: Base::Dec,
            },
        );
    }

    pub fn add_hex(&mut self, name: impl Into<String>, value: u64, digits: u8) {
        self.add(
            name,
            FieldValue::Number {
                value,
                base: Base::Hex { digits },
            },
        );
    }

    pub fn add_bitfield(&mut self, name: impl Into<String>, names: &'static [&'static str], value: u32) {
        self.add(name, FieldValue::Bitfield { names, value });
    }

    pub fn add_list(&mut self, name: impl Into<String>, headers: &'static [&'static str], rows: Vec<Vec<String>>) {
        self.add(name, FieldValue::List { headers, rows });
    }

    pub fn add_warning(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.add(name, FieldValue::Warning(message.into()));
    }

    /// First field called `name`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Shorthand for [`get`](Self::get) on string fields.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Standardized property names shared by every format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Title,
    Publisher,
    GameId,
    TitleId,
    Region,
    Description,
    EncryptionKey,
    OsVersion,
}

/// Small, format-independent property set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RomMetaData {
    props: Vec<(Property, String)>,
}

impl RomMetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property. Empty values are skipped; later values replace
    /// earlier ones.
    pub fn set(&mut self, prop: Property, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        match self.props.iter_mut().find(|(p, _)| *p == prop) {
            Some((_, v)) => *v = value,
            None => self.props.push((prop, value)),
        }
    }

    pub fn get(&self, prop: Property) -> Option<&str> {
        self.props
            .iter()
            .find(|(p, _)| *p == prop)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Property, &str)> {
        self.props.iter().map(|(p, v)| (*p, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}
