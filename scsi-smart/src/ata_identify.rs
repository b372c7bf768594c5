//! Decoding the ATA IDENTIFY DEVICE data page
//!
//! ATA8-ACS defines the page as 256 little-endian 16-bit words. Fields
//! are read by explicit word offset rather than by overlaying a struct,
//! so nothing here depends on the host's layout or byte order.

use core::fmt;
use core::ops::Range;

/// ATA command code for IDENTIFY DEVICE
pub const IDENTIFY_DEVICE: u8 = 0xEC;

/// Size of the IDENTIFY DEVICE page in bytes
pub const IDENTIFY_DATA_LEN: usize = 512;

/// Returned for version and transport words the device leaves blank
pub const NOT_REPORTED: &str = "not reported";

/// Returned for version codes missing from the tables
pub const UNKNOWN: &str = "unknown";

// Word offsets, ATA8-ACS table 31
const SERIAL_NUMBER: Range<usize> = 10..20;
const FIRMWARE_REVISION: Range<usize> = 23..27;
const MODEL_NUMBER: Range<usize> = 27..47;
const MAJOR_VERSION: usize = 80;
const MINOR_VERSION: usize = 81;
const SECTOR_SIZE: usize = 106;
const WORLD_WIDE_NAME: Range<usize> = 108..112;
const LOGICAL_SECTOR_WORDS: Range<usize> = 117..119;
const ROTATION_RATE: usize = 217;
const TRANSPORT_MAJOR: usize = 222;

/// Indexed by the most significant bit set in word 80
///
/// Bit 0 is reserved by every revision of the standard; a device
/// setting only that bit is reported as ATA-1.
const MAJOR_VERSIONS: [&str; 11] = [
    "ATA-1",
    "ATA-1",
    "ATA-2",
    "ATA-3",
    "ATA/ATAPI-4",
    "ATA/ATAPI-5",
    "ATA/ATAPI-6",
    "ATA/ATAPI-7",
    "ATA8-ACS",
    "ACS-2",
    "ACS-3",
];

// Table 10 of X3T13/2008D (ATA-3) Revision 7b
// Table 31 of T13/1699-D Revision 6a
// Table 47 of T13/2161-D Revision 5
// Table 57 of T13/BSR INCITS 529 Revision 18
const MINOR_VERSIONS: &[(u16, &str)] = &[
    (0x0001, "ATA-1 X3T9.2/781D prior to revision 4"),
    (0x0002, "ATA-1 published, ANSI X3.221-1994"),
    (0x0003, "ATA-1 X3T9.2/781D revision 4"),
    (0x0004, "ATA-2 published, ANSI X3.279-1996"),
    (0x0005, "ATA-2 X3T10/948D prior to revision 2k"),
    (0x0006, "ATA-3 X3T10/2008D revision 1"),
    (0x0007, "ATA-2 X3T10/948D revision 2k"),
    (0x0008, "ATA-3 X3T10/2008D revision 0"),
    (0x0009, "ATA-2 X3T10/948D revision 3"),
    (0x000a, "ATA-3 published, ANSI X3.298-1997"),
    (0x000b, "ATA-3 X3T10/2008D revision 6"),
    (0x000c, "ATA-3 X3T13/2008D revision 7 and 7a"),
    (0x000d, "ATA/ATAPI-4 X3T13/1153D version 6"),
    (0x000e, "ATA/ATAPI-4 T13/1153D version 13"),
    (0x000f, "ATA/ATAPI-4 X3T13/1153D version 7"),
    (0x0010, "ATA/ATAPI-4 T13/1153D version 18"),
    (0x0011, "ATA/ATAPI-4 T13/1153D version 15"),
    (0x0012, "ATA/ATAPI-4 published, ANSI NCITS 317-1998"),
    (0x0013, "ATA/ATAPI-5 T13/1321D version 3"),
    (0x0014, "ATA/ATAPI-4 T13/1153D version 14"),
    (0x0015, "ATA/ATAPI-5 T13/1321D revision 1"),
    (0x0016, "ATA/ATAPI-5 published, ANSI NCITS 340-2000"),
    (0x0017, "ATA/ATAPI-4 T13/1153D revision 17"),
    (0x0018, "ATA/ATAPI-6 T13/1410D version 0"),
    (0x0019, "ATA/ATAPI-6 T13/1410D version 3a"),
    (0x001a, "ATA/ATAPI-7 T13/1532D version 1"),
    (0x001b, "ATA/ATAPI-6 T13/1410D version 2"),
    (0x001c, "ATA/ATAPI-6 T13/1410D version 1"),
    (0x001d, "ATA/ATAPI-7 published, ANSI INCITS 397-2005"),
    (0x001e, "ATA/ATAPI-7 T13/1532D version 0"),
    (0x001f, "ACS-3 revision 3b"),
    (0x0021, "ATA/ATAPI-7 T13/1532D version 4a"),
    (0x0022, "ATA/ATAPI-6 published, ANSI INCITS 361-2002"),
    (0x0027, "ATA8-ACS version 3c"),
    (0x0028, "ATA8-ACS version 6"),
    (0x0029, "ATA8-ACS version 4"),
    (0x0031, "ACS-2 revision 2"),
    (0x0033, "ATA8-ACS version 3e"),
    (0x0039, "ATA8-ACS version 4c"),
    (0x0042, "ATA8-ACS version 3f"),
    (0x0052, "ATA8-ACS version 3b"),
    (0x005e, "ACS-4 revision 5"),
    (0x006d, "ACS-3 revision 5"),
    (0x0082, "ACS-2 published, ANSI INCITS 482-2012"),
    (0x0107, "ATA8-ACS version 2d"),
    (0x010a, "ACS-3 published, ANSI INCITS 522-2014"),
    (0x0110, "ACS-2 revision 3"),
    (0x011b, "ACS-3 revision 4"),
];

/// Serial ATA revisions, indexed by the low 12 bits of word 222
const SATA_REVISIONS: [&str; 8] = [
    "ATA8-AST",
    "SATA 1.0a",
    "SATA II Ext",
    "SATA 2.5",
    "SATA 2.6",
    "SATA 3.0",
    "SATA 3.1",
    "SATA 3.2",
];

/// The page was not exactly [`IDENTIFY_DATA_LEN`] bytes long
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("IDENTIFY DEVICE data is {0} bytes, expected 512")]
pub struct InvalidLength(pub usize);

/// Logical and physical sector sizes, in bytes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SectorSizes {
    pub logical: u32,
    pub physical: u32,
}

impl Default for SectorSizes {
    fn default() -> Self {
        Self {
            logical: 512,
            physical: 512,
        }
    }
}

/// A raw IDENTIFY DEVICE page
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct IdentifyDeviceData {
    raw: [u8; IDENTIFY_DATA_LEN],
}

impl IdentifyDeviceData {
    pub fn new(raw: [u8; IDENTIFY_DATA_LEN]) -> Self {
        Self { raw }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InvalidLength> {
        let raw = bytes
            .try_into()
            .map_err(|_| InvalidLength(bytes.len()))?;
        Ok(Self { raw })
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFY_DATA_LEN] {
        &self.raw
    }

    /// Word `n` of the page, or `None` past the end of it
    pub fn word(&self, n: usize) -> Option<u16> {
        let start = n.checked_mul(2)?;
        let bytes = self.raw.get(start..start.checked_add(2)?)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn le_word(&self, n: usize) -> u16 {
        u16::from_le_bytes([self.raw[2 * n], self.raw[2 * n + 1]])
    }

    fn word_bytes(&self, words: Range<usize>) -> &[u8] {
        &self.raw[2 * words.start..2 * words.end]
    }

    pub fn serial_number(&self) -> String {
        ata_string(self.word_bytes(SERIAL_NUMBER))
    }

    pub fn firmware_revision(&self) -> String {
        ata_string(self.word_bytes(FIRMWARE_REVISION))
    }

    pub fn model_number(&self) -> String {
        ata_string(self.word_bytes(MODEL_NUMBER))
    }

    pub fn world_wide_name(&self) -> String {
        let w = WORLD_WIDE_NAME.start;
        world_wide_name([
            self.le_word(w),
            self.le_word(w + 1),
            self.le_word(w + 2),
            self.le_word(w + 3),
        ])
    }

    pub fn sector_sizes(&self) -> SectorSizes {
        let lls = LOGICAL_SECTOR_WORDS.start;
        sector_sizes(
            self.le_word(SECTOR_SIZE),
            [self.le_word(lls), self.le_word(lls + 1)],
        )
    }

    /// Nominal media rotation rate: 1 for non-rotating media, otherwise RPM
    pub fn rotation_rate(&self) -> u16 {
        self.le_word(ROTATION_RATE)
    }

    pub fn ata_major_version(&self) -> &'static str {
        ata_major_version(self.le_word(MAJOR_VERSION))
    }

    pub fn ata_minor_version(&self) -> &'static str {
        ata_minor_version(self.le_word(MINOR_VERSION))
    }

    pub fn transport(&self) -> String {
        transport_type(self.le_word(TRANSPORT_MAJOR))
    }
}

impl fmt::Debug for IdentifyDeviceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifyDeviceData")
            .field("model", &self.model_number())
            .field("serial", &self.serial_number())
            .field("firmware", &self.firmware_revision())
            .finish()
    }
}

/// Swap each adjacent pair of bytes
///
/// ATA strings are stored with the two characters of each word
/// reversed. A trailing odd byte is kept as is.
pub fn swap_byte_order(bytes: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = bytes
        .chunks_exact(2)
        .flat_map(|pair| [pair[1], pair[0]])
        .collect();
    if bytes.len() % 2 == 1 {
        out.push(bytes[bytes.len() - 1]);
    }
    out
}

/// Decode a byte-swapped, space-padded ATA string field
pub fn ata_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&swap_byte_order(bytes))
        .trim_end_matches([' ', '\0'])
        .to_string()
}

/// Format words 108..=111 as `<naa> <ieee-oui> <unique-id>`
pub fn world_wide_name(words: [u16; 4]) -> String {
    let naa = words[0] >> 12;
    let oui = ((u32::from(words[0]) & 0x0FFF) << 12) | (u32::from(words[1]) >> 4);
    let unique_id = ((u64::from(words[1]) & 0xF) << 32)
        | (u64::from(words[2]) << 16)
        | u64::from(words[3]);
    format!("{naa:x} {oui:06x} {unique_id:09x}")
}

/// Decode word 106, plus words 117..=118 for long logical sectors
///
/// Word 106 is only meaningful when bits 15:14 read 01. Bit 12 says
/// the logical sector is longer than 256 words (its size in words is
/// then in words 117..=118); bit 13 says there are 2^(bits 3:0)
/// logical sectors per physical sector.
pub fn sector_sizes(word: u16, logical_sector_words: [u16; 2]) -> SectorSizes {
    let mut sizes = SectorSizes::default();
    if word & 0xC000 != 0x4000 {
        return sizes;
    }
    if word & 0x1000 != 0 {
        let words = (u32::from(logical_sector_words[1]) << 16)
            | u32::from(logical_sector_words[0]);
        if words != 0 {
            sizes.logical = words.saturating_mul(2);
            sizes.physical = sizes.logical;
        }
    }
    if word & 0x2000 != 0 {
        sizes.physical = sizes.logical << (word & 0xF);
    }
    sizes
}

/// Name the newest ATA standard claimed by word 80
pub fn ata_major_version(word: u16) -> &'static str {
    if word == 0 || word == 0xFFFF {
        return NOT_REPORTED;
    }
    let msb = 15 - word.leading_zeros() as usize;
    MAJOR_VERSIONS.get(msb).copied().unwrap_or(UNKNOWN)
}

/// Look up word 81, which is an enumeration rather than a bitmask
pub fn ata_minor_version(word: u16) -> &'static str {
    if word == 0 || word == 0xFFFF {
        return NOT_REPORTED;
    }
    MINOR_VERSIONS
        .iter()
        .find(|(code, _)| *code == word)
        .map_or(UNKNOWN, |&(_, name)| name)
}

/// Describe the transport from word 222
///
/// The SATA revision is looked up with the low 12 bits as a table
/// index, so 0x1005 gives "Serial ATA SATA 3.0". Drives usually set one
/// bit per supported revision instead: 0x107F gives
/// "Serial ATA SATA (0x07f)" here, where decoding the highest set bit
/// would give SATA 3.1.
pub fn transport_type(word: u16) -> String {
    if word == 0 || word == 0xFFFF {
        return NOT_REPORTED.to_string();
    }
    let minor = word & 0x0FFF;
    match word >> 12 {
        0x0 => "Parallel ATA".to_string(),
        0x1 => match SATA_REVISIONS.get(minor as usize) {
            Some(revision) => format!("Serial ATA {revision}"),
            None => format!("Serial ATA SATA ({minor:#05x})"),
        },
        0xE => format!("PCIe ({minor:#05x})"),
        _ => format!("unknown ({word:#06x})"),
    }
}

#[cfg(test)]
#[path = "tests/ata_identify.rs"]
mod tests;
