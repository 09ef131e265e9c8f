//! Per-nano EMM save/block policy

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::Error;

/// Policy flags attached to one nano type
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NanoFlags(u8);

impl NanoFlags {
    /// No flags
    pub const NONE: Self = Self(0x00);
    /// Do not forward EMMs with this nano to the card
    pub const BLOCK: Self = Self(0x01);
    /// Archive EMMs with this nano before dispatch
    pub const SAVE: Self = Self(0x02);

    /// Raw flag bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags with `other` added
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Flags with `other` removed
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Whether EMMs should be archived
    pub const fn save(self) -> bool {
        self.contains(Self::SAVE)
    }

    /// Whether EMMs should be blocked
    pub const fn block(self) -> bool {
        self.contains(Self::BLOCK)
    }
}

impl fmt::Debug for NanoFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NanoFlags")
            .field("save", &self.save())
            .field("block", &self.block())
            .finish()
    }
}

/// Mapping from nano type byte to policy flags
#[derive(Clone, PartialEq, Eq)]
pub struct NanoPolicyTable {
    flags: [NanoFlags; 256],
}

impl NanoPolicyTable {
    /// A table with no flags set
    pub const fn new() -> Self {
        Self {
            flags: [NanoFlags::NONE; 256],
        }
    }

    /// Build a table from save and block selections
    pub fn from_selections(save: &NanoSelection, block: &NanoSelection) -> Self {
        let mut table = Self::new();
        for nano in save.nanos() {
            table.insert(nano, NanoFlags::SAVE);
        }
        for nano in block.nanos() {
            table.insert(nano, NanoFlags::BLOCK);
        }
        table
    }

    /// Flags for `nano`
    pub const fn get(&self, nano: u8) -> NanoFlags {
        self.flags[nano as usize]
    }

    /// Replace the flags for `nano`, returning the previous ones
    pub const fn set(&mut self, nano: u8, flags: NanoFlags) -> NanoFlags {
        let previous = self.flags[nano as usize];
        self.flags[nano as usize] = flags;
        previous
    }

    /// Add flags for `nano`
    pub const fn insert(&mut self, nano: u8, flags: NanoFlags) {
        self.flags[nano as usize] = self.flags[nano as usize].union(flags);
    }
}

impl Default for NanoPolicyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NanoPolicyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (nano, flags) in self.flags.iter().enumerate() {
            if *flags != NanoFlags::NONE {
                map.entry(&format_args!("{nano:02X}"), flags);
            }
        }
        map.finish()
    }
}

/// A set of nano types, as written in reader configuration
///
/// Either the keyword `all` or a comma separated list of hex bytes, e.g. `"82,83"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum NanoSelection {
    /// No nano
    #[default]
    None,
    /// Every nano
    All,
    /// The listed nanos
    Nanos(Vec<u8>),
}

impl NanoSelection {
    /// Iterate over the selected nano bytes
    pub fn nanos(&self) -> Box<dyn Iterator<Item = u8> + '_> {
        match self {
            Self::None => Box::new(std::iter::empty()),
            Self::All => Box::new(0..=u8::MAX),
            Self::Nanos(list) => Box::new(list.iter().copied()),
        }
    }
}

impl FromStr for NanoSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::None);
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        s.split(',')
            .map(|item| {
                let item = item.trim();
                u8::from_str_radix(item, 16).map_err(|_| Error::InvalidNano(item.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::Nanos)
    }
}

impl TryFrom<String> for NanoSelection {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent() {
        let both = NanoFlags::SAVE.union(NanoFlags::BLOCK);
        assert!(both.save() && both.block());
        assert_eq!(both.bits(), 0x03);

        let save_only = both.difference(NanoFlags::BLOCK);
        assert!(save_only.save());
        assert!(!save_only.block());
        assert!(!NanoFlags::NONE.save() && !NanoFlags::NONE.block());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!("".parse::<NanoSelection>().unwrap(), NanoSelection::None);
        assert_eq!("ALL".parse::<NanoSelection>().unwrap(), NanoSelection::All);
        assert_eq!(
            "82, 83,9f".parse::<NanoSelection>().unwrap(),
            NanoSelection::Nanos(vec![0x82, 0x83, 0x9F])
        );
        assert_eq!(
            "82,zz".parse::<NanoSelection>(),
            Err(Error::InvalidNano("zz".to_string()))
        );
    }

    #[test]
    fn test_table_from_selections() {
        let save = NanoSelection::Nanos(vec![0x82, 0x83]);
        let block = NanoSelection::Nanos(vec![0x83]);
        let table = NanoPolicyTable::from_selections(&save, &block);

        assert!(table.get(0x82).save() && !table.get(0x82).block());
        assert!(table.get(0x83).save() && table.get(0x83).block());
        assert_eq!(table.get(0x84), NanoFlags::NONE);

        let table = NanoPolicyTable::from_selections(&NanoSelection::None, &NanoSelection::All);
        assert!((0..=u8::MAX).all(|nano| table.get(nano) == NanoFlags::BLOCK));
    }

    #[test]
    fn test_set_returns_previous() {
        let mut table = NanoPolicyTable::new();
        table.insert(0x82, NanoFlags::SAVE);
        let previous = table.set(0x82, NanoFlags::NONE);
        assert_eq!(previous, NanoFlags::SAVE);
        assert_eq!(table.get(0x82), NanoFlags::NONE);
    }
}
