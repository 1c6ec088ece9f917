//! Acquisition and shutter mode constants and their symbolic tables.
//!
//! The acquisition engine speaks in raw mode constants. A newer engine may
//! report a constant this server does not know, so the constants are
//! transparent integer newtypes rather than closed Rust enums. Remote clients
//! only ever see the uppercase symbols held in an [`EnumerationTable`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Acquisition mode constant as understood by the acquisition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcqMode(pub i32);

impl AcqMode {
    /// One frame per image
    pub const SINGLE: Self = Self(0);
    /// Several exposures summed into one image
    pub const ACCUMULATION: Self = Self(1);
    /// Several frames stacked into one image
    pub const CONCATENATION: Self = Self(2);
}

/// Shutter mode constant as understood by the acquisition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShutterMode(pub i32);

impl ShutterMode {
    /// Shutter opened and closed by explicit commands
    pub const MANUAL: Self = Self(0);
    /// Shutter follows every frame
    pub const AUTO_FRAME: Self = Self(1);
    /// Shutter open for the whole acquisition sequence
    pub const AUTO_SEQUENCE: Self = Self(2);
}

impl fmt::Display for AcqMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AcqMode({})", self.0)
    }
}

impl fmt::Display for ShutterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShutterMode({})", self.0)
    }
}

/// Fixed bidirectional mapping between uppercase symbols and engine constants.
///
/// Entries are kept in declaration order, which is also the order reported to
/// clients asking for the list of authorized values.
#[derive(Debug, Clone, Copy)]
pub struct EnumerationTable<T: 'static> {
    entries: &'static [(&'static str, T)],
}

impl<T: Copy + PartialEq + 'static> EnumerationTable<T> {
    /// Build a table from a static list of `(symbol, constant)` pairs.
    pub const fn new(entries: &'static [(&'static str, T)]) -> Self {
        Self { entries }
    }

    /// Symbol for an engine constant, `None` when the engine value is unknown.
    pub fn symbol_of(&self, value: T) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(symbol, _)| *symbol)
    }

    /// Constant for a symbol. Lookup is case-insensitive.
    pub fn value_of(&self, symbol: &str) -> Option<T> {
        let symbol = symbol.to_uppercase();
        self.entries
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, v)| *v)
    }

    /// All symbols, in table order.
    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(symbol, _)| *symbol)
    }

    /// Symbols whose constant appears in `values`, in table order.
    pub fn symbols_in(&self, values: &[T]) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, v)| values.contains(v))
            .map(|(symbol, _)| *symbol)
            .collect()
    }
}

/// Symbol reported when the engine's mode has no table entry.
pub const NOT_SUPPORTED: &str = "NOT_SUPPORTED";

/// Acquisition mode table exposed through the `acq_mode` attribute.
pub static ACQ_MODE_TABLE: EnumerationTable<AcqMode> = EnumerationTable::new(&[
    ("SINGLE", AcqMode::SINGLE),
    ("CONCATENATION", AcqMode::CONCATENATION),
    ("ACCUMULATION", AcqMode::ACCUMULATION),
]);

/// Shutter mode table exposed through the `shutter_mode` attribute.
pub static SHUTTER_MODE_TABLE: EnumerationTable<ShutterMode> = EnumerationTable::new(&[
    ("MANUAL", ShutterMode::MANUAL),
    ("AUTO_FRAME", ShutterMode::AUTO_FRAME),
    ("AUTO_SEQUENCE", ShutterMode::AUTO_SEQUENCE),
]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_symbol_resolves_back_to_itself() {
        for symbol in ACQ_MODE_TABLE.symbols() {
            let value = ACQ_MODE_TABLE.value_of(symbol).unwrap();
            assert_eq!(ACQ_MODE_TABLE.symbol_of(value), Some(symbol));
        }
        for symbol in SHUTTER_MODE_TABLE.symbols() {
            let value = SHUTTER_MODE_TABLE.value_of(symbol).unwrap();
            assert_eq!(SHUTTER_MODE_TABLE.symbol_of(value), Some(symbol));
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(
            ACQ_MODE_TABLE.value_of("accumulation"),
            Some(AcqMode::ACCUMULATION)
        );
        assert_eq!(
            SHUTTER_MODE_TABLE.value_of("Auto_Frame"),
            Some(ShutterMode::AUTO_FRAME)
        );
    }

    #[test]
    fn unknown_values_have_no_symbol() {
        assert_eq!(ACQ_MODE_TABLE.symbol_of(AcqMode(42)), None);
        assert_eq!(SHUTTER_MODE_TABLE.value_of("bogus"), None);
    }

    #[test]
    fn symbols_keep_table_order() {
        let symbols: Vec<_> = ACQ_MODE_TABLE.symbols().collect();
        assert_eq!(symbols, ["SINGLE", "CONCATENATION", "ACCUMULATION"]);
    }

    #[test]
    fn symbols_in_filters_by_engine_list() {
        let supported = [ShutterMode::AUTO_SEQUENCE, ShutterMode::MANUAL, ShutterMode(9)];
        assert_eq!(
            SHUTTER_MODE_TABLE.symbols_in(&supported),
            ["MANUAL", "AUTO_SEQUENCE"]
        );
    }

    #[test]
    fn mode_constants_serialize_as_integers() {
        let json = serde_json::to_string(&AcqMode::CONCATENATION).unwrap();
        assert_eq!(json, "2");
    }
}
