//! Port configuration.

use serde::{Deserialize, Serialize};

use crate::checksum::CrcKind;

/// Configuration for a [`Port`](crate::Port).
///
/// The only recognized option is the checksum width used for data frames.
/// Control frames always carry a CRC-16 regardless of this setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Checksum variant for data frames. Defaults to CRC-16.
    pub data_crc: CrcKind,
}
