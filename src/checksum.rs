//! Checksum providers for frame validation.
//!
//! Two CRC variants are part of the wire format:
//!
//! - **CRC-16**, reflected polynomial `0x8408`, init `0x0000`, no final
//!   XOR. Used for all control frames and, by default, for data frames.
//! - **CRC-32**, reflected Koopman polynomial `0xEB31D82E`, init and final
//!   XOR `0xFFFFFFFF`. Optional data-frame checksum.
//!
//! Checksums are always emitted little-endian. The lookup tables are built
//! in `const` context and therefore immutable and freely shareable.
//!
//! # Example
//!
//! ```
//! use serwire::checksum::CrcKind;
//!
//! let crc = CrcKind::Crc16.checksum(b"123456789");
//! assert_eq!(crc, vec![0x89, 0x21]); // 0x2189, little-endian
//! assert!(CrcKind::Crc16.validate(b"123456789", &crc));
//! ```

use crc::{Algorithm, Crc};
use serde::{Deserialize, Serialize};

/// CRC-16 wire parameters. The catalog name for this variant is
/// CRC-16/KERMIT; `poly` is the normal form of the reflected 0x8408.
const CRC_16_WIRE: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0x2189,
    residue: 0x0000,
};

/// CRC-32 wire parameters; `poly` is the normal form of the reflected
/// Koopman polynomial 0xEB31D82E.
const CRC_32_WIRE: Algorithm<u32> = Algorithm {
    width: 32,
    poly: 0x741b_8cd7,
    init: 0xffff_ffff,
    refin: true,
    refout: true,
    xorout: 0xffff_ffff,
    check: 0x2d3d_d0ae,
    residue: 0x0843_323b,
};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_WIRE);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_WIRE);

/// Compute the 16-bit wire checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Compute the 32-bit wire checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Checksum variant used for data frames.
///
/// Selected once per port at construction. Control frames are always
/// validated with [`CrcKind::Crc16`] regardless of the configured variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrcKind {
    /// 16-bit checksum, 2 bytes on the wire.
    #[default]
    Crc16,
    /// 32-bit checksum, 4 bytes on the wire.
    Crc32,
}

impl CrcKind {
    /// Width of the stored checksum in bytes.
    #[inline]
    pub const fn width(self) -> usize {
        match self {
            CrcKind::Crc16 => 2,
            CrcKind::Crc32 => 4,
        }
    }

    /// Compute the checksum of `data` as little-endian bytes.
    pub fn checksum(self, data: &[u8]) -> Vec<u8> {
        match self {
            CrcKind::Crc16 => crc16(data).to_le_bytes().to_vec(),
            CrcKind::Crc32 => crc32(data).to_le_bytes().to_vec(),
        }
    }

    /// Check a stored little-endian checksum against `data`.
    ///
    /// Returns `false` when `raw` has the wrong width.
    pub fn validate(self, data: &[u8], raw: &[u8]) -> bool {
        match self {
            CrcKind::Crc16 => {
                let Ok(raw) = <[u8; 2]>::try_from(raw) else {
                    return false;
                };
                u16::from_le_bytes(raw) == crc16(data)
            }
            CrcKind::Crc32 => {
                let Ok(raw) = <[u8; 4]>::try_from(raw) else {
                    return false;
                };
                u32::from_le_bytes(raw) == crc32(data)
            }
        }
    }
}
