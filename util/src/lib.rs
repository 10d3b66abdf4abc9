use std::{error::Error, fmt};

/// The 1802 addresses 16-bit quantities big-endian (`LBR hi lo`, the ELF/OS
/// header, Intel HEX address fields); every multi-byte read/write in this
/// workspace goes through this alias rather than naming `byteorder::BigEndian`
/// directly, so the endianness choice lives in one place.
pub type Endian = byteorder::BigEndian;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ParseEnumError {
    pub value: String,
    pub enum_name: &'static str,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Failed to parse \"{}\" as {}.",
            &self.value, &self.enum_name
        )
    }
}

impl Error for ParseEnumError {
    fn description(&self) -> &str {
        "Failed to parse enum."
    }
}

pub trait EnumFromStr: Sized {
    fn from_str(s: &str) -> Result<Self, ParseEnumError>;
}
