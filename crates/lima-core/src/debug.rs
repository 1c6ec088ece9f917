//! Diagnostic debug flags.
//!
//! Remote clients read and write the type and module debug flags as a single
//! packed 32-bit value:
//!
//! ```text
//!  31      24 23      16 15                              0
//! ┌──────────┬──────────┬─────────────────────────────────┐
//! │  unused  │   type   │             module              │
//! └──────────┴──────────┴─────────────────────────────────┘
//! ```
//!
//! [`DebugFlags`] owns the packing. [`DebugParams`] is the full diagnostic
//! configuration (type, module and format flags) and [`DebugSettings`] is the
//! shared handle injected into every device of a server.

use bitflags::bitflags;
use parking_lot::RwLock;
use std::sync::Arc;

const TYPE_SHIFT: u32 = 16;
const TYPE_MASK: u32 = 0xFF;
const MODULE_MASK: u32 = 0xFFFF;

/// Packed type and module flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags {
    /// Message type flags, bits [23:16] of the packed value
    pub type_flags: u8,
    /// Module flags, bits [15:0] of the packed value
    pub module_flags: u16,
}

impl DebugFlags {
    /// Build from raw integers. Out-of-range bits are truncated, never rejected.
    pub fn new(type_flags: u32, module_flags: u32) -> Self {
        Self {
            type_flags: (type_flags & TYPE_MASK) as u8,
            module_flags: (module_flags & MODULE_MASK) as u16,
        }
    }

    /// Pack into the wire representation. Bits [31:24] are always zero.
    pub fn encode(self) -> u32 {
        ((u32::from(self.type_flags) & TYPE_MASK) << TYPE_SHIFT)
            | (u32::from(self.module_flags) & MODULE_MASK)
    }

    /// Unpack a wire value, discarding bits [31:24].
    pub fn decode(value: u32) -> Self {
        Self::new(value >> TYPE_SHIFT, value)
    }
}

bitflags! {
    /// Kind of diagnostic message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebTypeFlags: u8 {
        const FATAL = 1 << 0;
        const ERROR = 1 << 1;
        const WARNING = 1 << 2;
        const TRACE = 1 << 3;
        const FUNCT = 1 << 4;
        const PARAM = 1 << 5;
        const RETURN = 1 << 6;
        const ALWAYS = 1 << 7;
    }
}

bitflags! {
    /// Subsystem emitting the diagnostic message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebModuleFlags: u16 {
        const COMMON = 1 << 0;
        const HARDWARE = 1 << 1;
        const HARDWARE_SERIAL = 1 << 2;
        const CONTROL = 1 << 3;
        const ESPIA = 1 << 4;
        const ESPIA_SERIAL = 1 << 5;
        const FOCLA = 1 << 6;
        const CAMERA = 1 << 7;
        const CAMERA_COM = 1 << 8;
        const TEST = 1 << 9;
        const APPLICATION = 1 << 10;
    }
}

bitflags! {
    /// Decorations added to each diagnostic line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebFormatFlags: u16 {
        const DATE_TIME = 1 << 0;
        const THREAD = 1 << 1;
        const MODULE = 1 << 2;
        const OBJ = 1 << 3;
        const FUNCT = 1 << 4;
        const FILE_LINE = 1 << 5;
        const TYPE = 1 << 6;
        const INDENT = 1 << 7;
        const COLOR = 1 << 8;
    }
}

/// Full diagnostic configuration of a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugParams {
    /// Enabled message types
    pub type_flags: DebTypeFlags,
    /// Enabled modules
    pub module_flags: DebModuleFlags,
    /// Line decorations
    pub format_flags: DebFormatFlags,
}

impl Default for DebugParams {
    fn default() -> Self {
        Self {
            type_flags: DebTypeFlags::FATAL | DebTypeFlags::ERROR,
            module_flags: DebModuleFlags::all(),
            format_flags: DebFormatFlags::DATE_TIME
                | DebFormatFlags::MODULE
                | DebFormatFlags::FUNCT
                | DebFormatFlags::TYPE,
        }
    }
}

impl DebugParams {
    /// Type and module flags in packed form.
    pub fn flags(&self) -> DebugFlags {
        DebugFlags {
            type_flags: self.type_flags.bits(),
            module_flags: self.module_flags.bits(),
        }
    }

    /// Replace type and module flags, leaving the format flags untouched.
    pub fn set_flags(&mut self, flags: DebugFlags) {
        self.type_flags = DebTypeFlags::from_bits_retain(flags.type_flags);
        self.module_flags = DebModuleFlags::from_bits_retain(flags.module_flags);
    }

    /// Names of the enabled type flags.
    pub fn type_flag_names(&self) -> Vec<&'static str> {
        self.type_flags.iter_names().map(|(name, _)| name).collect()
    }

    /// Names of the enabled module flags. `NONE` when no module is enabled.
    pub fn module_flag_names(&self) -> Vec<&'static str> {
        if self.module_flags.is_empty() {
            return vec!["NONE"];
        }
        self.module_flags.iter_names().map(|(name, _)| name).collect()
    }

    /// Names of the enabled format flags.
    pub fn format_flag_names(&self) -> Vec<&'static str> {
        self.format_flags.iter_names().map(|(name, _)| name).collect()
    }
}

/// Shared handle on the diagnostic configuration.
///
/// Cloning the handle shares the underlying parameters, so every device
/// created by one server observes the same flags.
#[derive(Debug, Clone, Default)]
pub struct DebugSettings {
    inner: Arc<RwLock<DebugParams>>,
}

impl DebugSettings {
    /// Create a handle initialised with `params`.
    pub fn new(params: DebugParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Snapshot of the current parameters.
    pub fn params(&self) -> DebugParams {
        *self.inner.read()
    }

    /// Packed type and module flags.
    pub fn flags(&self) -> DebugFlags {
        self.inner.read().flags()
    }

    /// Replace type and module flags.
    pub fn set_flags(&self, flags: DebugFlags) {
        self.inner.write().set_flags(flags);
    }

    /// Replace the format flags.
    pub fn set_format_flags(&self, format: DebFormatFlags) {
        self.inner.write().format_flags = format;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_places_type_above_module() {
        let flags = DebugFlags::new(0xFF, 0x1234);
        assert_eq!(flags.encode(), 0x00FF_1234);
    }

    #[test]
    fn decode_discards_unused_high_byte() {
        let flags = DebugFlags::decode(0xAB12_3456);
        assert_eq!(flags.type_flags, 0x12);
        assert_eq!(flags.module_flags, 0x3456);
        assert_eq!(flags.encode(), 0x0012_3456);
    }

    #[test]
    fn out_of_range_inputs_are_truncated() {
        let flags = DebugFlags::new(0x1_23, 0x7_FFFF);
        assert_eq!(flags.type_flags, 0x23);
        assert_eq!(flags.module_flags, 0xFFFF);
    }

    #[test]
    fn decode_inverts_encode_for_every_flag_pair() {
        for t in 0u32..=0xFF {
            for m in 0u32..=0xFFFF {
                let flags = DebugFlags::decode(DebugFlags::new(t, m).encode());
                assert_eq!((u32::from(flags.type_flags), u32::from(flags.module_flags)), (t, m));
            }
        }
    }

    #[test]
    fn params_name_lists_follow_set_bits() {
        let mut params = DebugParams::default();
        params.set_flags(DebugFlags::new(
            u32::from((DebTypeFlags::TRACE | DebTypeFlags::PARAM).bits()),
            u32::from(DebModuleFlags::CAMERA.bits()),
        ));
        assert_eq!(params.type_flag_names(), ["TRACE", "PARAM"]);
        assert_eq!(params.module_flag_names(), ["CAMERA"]);

        params.set_flags(DebugFlags::new(0, 0));
        assert!(params.type_flag_names().is_empty());
        assert_eq!(params.module_flag_names(), ["NONE"]);
    }

    #[test]
    fn unnamed_module_bits_survive_a_round_trip() {
        let settings = DebugSettings::default();
        settings.set_flags(DebugFlags::decode(0x0001_F800));
        assert_eq!(settings.flags().encode(), 0x0001_F800);
    }

    #[test]
    fn settings_handles_share_state() {
        let a = DebugSettings::default();
        let b = a.clone();
        a.set_flags(DebugFlags::decode(0x00FF_1234));
        assert_eq!(b.flags().encode(), 0x00FF_1234);
        assert_eq!(b.params().format_flags, DebugParams::default().format_flags);
    }
}
