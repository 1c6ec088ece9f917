//! Attribute and command tables, and the generic dispatch used by remote
//! clients.

use crate::device::LimaCcds;
use lima_core::error::{LimaError, LimaResult};
use serde::Serialize;
use std::fmt;

/// Scalar type of an attribute or command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// No value
    Void,
    /// UTF-8 string
    String,
    /// 64-bit float
    Double,
    /// Signed 32-bit integer
    Long,
    /// Unsigned 32-bit integer
    ULong,
}

/// Shape of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrFormat {
    /// Single value
    Scalar,
    /// One-dimensional array of bounded length
    Spectrum {
        /// Maximum number of elements
        max_len: usize,
    },
}

/// Access mode of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrAccess {
    /// Read-only
    Read,
    /// Readable and writable
    ReadWrite,
}

/// Static description of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    /// Attribute name
    pub name: &'static str,
    /// Element type
    pub data_type: DataType,
    /// Scalar or spectrum
    pub format: AttrFormat,
    /// Access mode
    pub access: AttrAccess,
}

/// Static description of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    /// Command name
    pub name: &'static str,
    /// Input argument type
    pub arg_in: DataType,
    /// Output type; string lists are reported as `String`
    pub arg_out: DataType,
}

const fn attr(
    name: &'static str,
    data_type: DataType,
    format: AttrFormat,
    access: AttrAccess,
) -> AttributeInfo {
    AttributeInfo {
        name,
        data_type,
        format,
        access,
    }
}

use AttrAccess::{Read, ReadWrite};
use AttrFormat::Scalar;

/// Every attribute of the device.
pub static ATTRIBUTES: &[AttributeInfo] = &[
    attr("lima_type", DataType::String, Scalar, Read),
    attr("camera_type", DataType::String, Scalar, Read),
    attr("camera_model", DataType::String, Scalar, Read),
    attr("acc_max_expotime", DataType::Double, Scalar, ReadWrite),
    attr("acc_expotime", DataType::Double, Scalar, Read),
    attr("acc_nb_frames", DataType::Long, Scalar, Read),
    attr("acq_mode", DataType::String, Scalar, ReadWrite),
    attr("latency_time", DataType::Double, Scalar, ReadWrite),
    attr("last_image_ready", DataType::Long, Scalar, Read),
    attr("last_image_saved", DataType::Long, Scalar, Read),
    attr(
        "write_statistic",
        DataType::Double,
        AttrFormat::Spectrum {
            max_len: crate::device::WRITE_STATISTIC_CAPACITY,
        },
        Read,
    ),
    attr("shutter_mode", DataType::String, Scalar, ReadWrite),
    attr("shutter_state", DataType::String, Scalar, Read),
    attr("shutter_open_time", DataType::Double, Scalar, ReadWrite),
    attr("shutter_close_time", DataType::Double, Scalar, ReadWrite),
];

/// Every command of the device.
pub static COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "getDebugFlags",
        arg_in: DataType::Void,
        arg_out: DataType::ULong,
    },
    CommandInfo {
        name: "setDebugFlags",
        arg_in: DataType::ULong,
        arg_out: DataType::Void,
    },
    CommandInfo {
        name: "openShutterManual",
        arg_in: DataType::Void,
        arg_out: DataType::Void,
    },
    CommandInfo {
        name: "closeShutterManual",
        arg_in: DataType::Void,
        arg_out: DataType::Void,
    },
    CommandInfo {
        name: "getAttrStringValueList",
        arg_in: DataType::String,
        arg_out: DataType::String,
    },
];

/// Attribute description by name.
pub fn attribute_info(name: &str) -> Option<&'static AttributeInfo> {
    ATTRIBUTES.iter().find(|a| a.name == name)
}

/// Command description by name.
pub fn command_info(name: &str) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// A value read from or written to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// No value
    Void,
    /// String
    String(String),
    /// 64-bit float
    Double(f64),
    /// Signed 32-bit integer
    Long(i32),
    /// Unsigned 32-bit integer
    ULong(u32),
    /// Array of floats
    DoubleArray(Vec<f64>),
    /// Array of strings
    StringArray(Vec<String>),
}

impl AttrValue {
    /// Parse text typed by a user into a value of `data_type`.
    ///
    /// Unsigned integers accept a `0x` prefix.
    pub fn parse(name: &str, data_type: DataType, text: &str) -> LimaResult<Self> {
        let text = text.trim();
        let mismatch = |expected| LimaError::TypeMismatch {
            name: name.to_string(),
            expected,
        };
        Ok(match data_type {
            DataType::Void => Self::Void,
            DataType::String => Self::String(text.to_string()),
            DataType::Double => Self::Double(text.parse().map_err(|_| mismatch("a float"))?),
            DataType::Long => Self::Long(text.parse().map_err(|_| mismatch("an integer"))?),
            DataType::ULong => {
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u32::from_str_radix(hex, 16),
                    None => text.parse(),
                };
                Self::ULong(parsed.map_err(|_| mismatch("an unsigned integer"))?)
            }
        })
    }

    fn into_double(self, name: &str) -> LimaResult<f64> {
        match self {
            Self::Double(v) => Ok(v),
            Self::Long(v) => Ok(f64::from(v)),
            _ => Err(LimaError::TypeMismatch {
                name: name.to_string(),
                expected: "a float",
            }),
        }
    }

    fn into_string(self, name: &str) -> LimaResult<String> {
        match self {
            Self::String(v) => Ok(v),
            _ => Err(LimaError::TypeMismatch {
                name: name.to_string(),
                expected: "a string",
            }),
        }
    }

    fn into_ulong(self, name: &str) -> LimaResult<u32> {
        match self {
            Self::ULong(v) => Ok(v),
            Self::Long(v) => u32::try_from(v).map_err(|_| LimaError::TypeMismatch {
                name: name.to_string(),
                expected: "an unsigned integer",
            }),
            _ => Err(LimaError::TypeMismatch {
                name: name.to_string(),
                expected: "an unsigned integer",
            }),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => Ok(()),
            Self::String(v) => f.write_str(v),
            Self::Double(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::ULong(v) => write!(f, "0x{v:08x}"),
            Self::DoubleArray(v) => {
                let items: Vec<String> = v.iter().map(f64::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::StringArray(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

impl LimaCcds {
    /// Attribute table.
    pub fn attribute_list(&self) -> &'static [AttributeInfo] {
        ATTRIBUTES
    }

    /// Read any attribute by name.
    pub fn read_attribute(&self, name: &str) -> LimaResult<AttrValue> {
        Ok(match name {
            "lima_type" => AttrValue::String(self.read_lima_type()?),
            "camera_type" => AttrValue::String(self.read_camera_type()?),
            "camera_model" => AttrValue::String(self.read_camera_model()?),
            "acc_max_expotime" => AttrValue::Double(self.read_acc_max_expotime()?),
            "acc_expotime" => AttrValue::Double(self.read_acc_expotime()?),
            "acc_nb_frames" => AttrValue::Long(self.read_acc_nb_frames()?),
            "acq_mode" => AttrValue::String(self.read_acq_mode()?.to_string()),
            "latency_time" => AttrValue::Double(self.read_latency_time()?),
            "last_image_ready" => AttrValue::Long(self.read_last_image_ready()?),
            "last_image_saved" => AttrValue::Long(self.read_last_image_saved()?),
            "write_statistic" => AttrValue::DoubleArray(self.read_write_statistic()?),
            "shutter_mode" => AttrValue::String(self.read_shutter_mode()?.to_string()),
            "shutter_state" => {
                AttrValue::String(self.read_shutter_manual_state()?.as_str().to_string())
            }
            "shutter_open_time" => AttrValue::Double(self.read_shutter_open_time()?),
            "shutter_close_time" => AttrValue::Double(self.read_shutter_close_time()?),
            _ => return Err(LimaError::UnknownAttribute(name.to_string())),
        })
    }

    /// Write any writable attribute by name.
    pub fn write_attribute(&self, name: &str, value: AttrValue) -> LimaResult<()> {
        let info = attribute_info(name).ok_or_else(|| LimaError::UnknownAttribute(name.to_string()))?;
        if info.access == AttrAccess::Read {
            return Err(LimaError::ReadOnly(name.to_string()));
        }
        match name {
            "acc_max_expotime" => self.write_acc_max_expotime(value.into_double(name)?),
            "acq_mode" => self.write_acq_mode(&value.into_string(name)?),
            "latency_time" => self.write_latency_time(value.into_double(name)?),
            "shutter_mode" => self.write_shutter_mode(&value.into_string(name)?),
            "shutter_open_time" => self.write_shutter_open_time(value.into_double(name)?),
            "shutter_close_time" => self.write_shutter_close_time(value.into_double(name)?),
            _ => Err(LimaError::ReadOnly(name.to_string())),
        }
    }

    /// Run any command by name.
    pub fn command_inout(&self, name: &str, arg: AttrValue) -> LimaResult<AttrValue> {
        match name {
            "getDebugFlags" => Ok(AttrValue::ULong(self.get_debug_flags())),
            "setDebugFlags" => {
                self.set_debug_flags(arg.into_ulong(name)?);
                Ok(AttrValue::Void)
            }
            "openShutterManual" => self.open_shutter_manual().map(|()| AttrValue::Void),
            "closeShutterManual" => self.close_shutter_manual().map(|()| AttrValue::Void),
            "getAttrStringValueList" => Ok(AttrValue::StringArray(
                self.get_attr_string_value_list(&arg.into_string(name)?)?,
            )),
            _ => Err(LimaError::UnknownCommand(name.to_string())),
        }
    }
}
