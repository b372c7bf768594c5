use crate::ata_identify::{IdentifyDeviceData, IDENTIFY_DATA_LEN, IDENTIFY_DEVICE};
use crate::debug;
use crate::scsi_transport::{DataPhase, Error, ScsiTransport};
use core::fmt;

/// The commands this crate issues, for naming failures
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Inquiry,
    ModeSense6,
    ReadCapacity10,
    ReadCapacity16,
    AtaPassThrough16,
}

impl Command {
    pub fn opcode(self) -> u8 {
        match self {
            Command::Inquiry => 0x12,
            Command::ModeSense6 => 0x1A,
            Command::ReadCapacity10 => 0x25,
            Command::ReadCapacity16 => 0x9E,
            Command::AtaPassThrough16 => 0x85,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Inquiry => "INQUIRY",
            Command::ModeSense6 => "MODE SENSE(6)",
            Command::ReadCapacity10 => "READ CAPACITY(10)",
            Command::ReadCapacity16 => "READ CAPACITY(16)",
            Command::AtaPassThrough16 => "ATA PASS-THROUGH(16)",
        })
    }
}

/// Length of the standard INQUIRY data we ask for
pub const INQUIRY_LEN: usize = 36;

/// Allocation length used for MODE SENSE(6)
pub const MODE_SENSE_LEN: usize = 64;

/// Rigid Disk Geometry mode page
/// Seagate SCSI Commands Reference Manual s5.3.21
pub const RIGID_DISK_GEOMETRY_PAGE: u8 = 0x04;

/// Mode page control: current values
pub const PAGE_CONTROL_CURRENT: u8 = 0;
/// Mode page control: default values
pub const PAGE_CONTROL_DEFAULT: u8 = 2;

/// ATA protocol field of ATA PASS-THROUGH: PIO data-in
pub const ATA_PROTOCOL_PIO_DATA_IN: u8 = 4;

/// INQUIRY
/// Seagate SCSI Commands Reference Manual s3.6
#[derive(Debug, Copy, Clone)]
#[repr(C)]
struct Inquiry {
    operation_code: u8,
    evpd: u8,
    page_code: u8,
    allocation_length_be: [u8; 2],
    control: u8,
}

impl Inquiry {
    fn new(len: u16) -> Self {
        assert!(core::mem::size_of::<Self>() == 6);
        Self {
            operation_code: Command::Inquiry.opcode(),
            evpd: 0,
            page_code: 0,
            allocation_length_be: len.to_be_bytes(),
            control: 0,
        }
    }
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for Inquiry {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for Inquiry {}

/// MODE SENSE (6)
/// Seagate SCSI Commands Reference Manual s3.11
#[derive(Debug, Copy, Clone)]
#[repr(C)]
struct ModeSense6 {
    operation_code: u8,
    dbd: u8,
    page_control_code: u8,
    subpage_code: u8,
    allocation_length: u8,
    control: u8,
}

impl ModeSense6 {
    fn new(page: u8, subpage: u8, page_control: u8, len: u8) -> Self {
        assert!(core::mem::size_of::<Self>() == 6);
        Self {
            operation_code: Command::ModeSense6.opcode(),
            dbd: 0,
            page_control_code: (page_control << 6) | (page & 0x3F),
            subpage_code: subpage,
            allocation_length: len,
            control: 0,
        }
    }
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ModeSense6 {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ModeSense6 {}

/// READ CAPACITY (10)
/// Seagate SCSI Commands Reference Manual s3.23.2
#[derive(Debug, Copy, Clone)]
#[repr(C)]
struct ReadCapacity10 {
    operation_code: u8,
    reserved1: u8,
    lba_be: [u8; 4],
    reserved6: [u8; 3],
    control: u8,
}

impl ReadCapacity10 {
    fn new() -> Self {
        assert!(core::mem::size_of::<Self>() == 10);
        Self {
            operation_code: Command::ReadCapacity10.opcode(),
            reserved1: 0,
            lba_be: [0u8; 4],
            reserved6: [0; 3],
            control: 0,
        }
    }
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ReadCapacity10 {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ReadCapacity10 {}

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct ReadCapacity10Reply {
    pub(crate) lba: [u8; 4],
    pub(crate) block_size: [u8; 4],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ReadCapacity10Reply {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ReadCapacity10Reply {}

/// READ CAPACITY (16)
/// Seagate SCSI Commands Reference Manual s3.23.2
#[derive(Debug, Copy, Clone)]
#[repr(C)]
struct ReadCapacity16 {
    operation_code: u8,
    service_action: u8,
    lba_be: [u8; 8],
    allocation_length_be: [u8; 4],
    reserved: u8,
    control: u8,
}

impl ReadCapacity16 {
    fn new() -> Self {
        assert!(core::mem::size_of::<Self>() == 16);
        Self {
            operation_code: Command::ReadCapacity16.opcode(),
            service_action: 0x10,
            lba_be: [0u8; 8],
            allocation_length_be: [0, 0, 0, 32],
            reserved: 0,
            control: 0,
        }
    }
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ReadCapacity16 {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ReadCapacity16 {}

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct ReadCapacity16Reply {
    pub(crate) lba: [u8; 8],
    pub(crate) block_size: [u8; 4],
    pub(crate) flags: [u8; 2],
    pub(crate) lowest_aligned_lba: [u8; 2],
    pub(crate) reserved: [u8; 16],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for ReadCapacity16Reply {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for ReadCapacity16Reply {}

/// ATA PASS-THROUGH (16)
/// T10/BSR INCITS 491 (SAT-2) s12.2.3
#[derive(Debug, Copy, Clone)]
#[repr(C)]
struct AtaPassThrough16 {
    operation_code: u8,
    protocol: u8,
    flags: u8,
    features_be: [u8; 2],
    sector_count_be: [u8; 2],
    lba_low_be: [u8; 2],
    lba_mid_be: [u8; 2],
    lba_high_be: [u8; 2],
    device: u8,
    command: u8,
    control: u8,
}

impl AtaPassThrough16 {
    /// T_DIR = from device
    const T_DIR_FROM_DEVICE: u8 = 1 << 3;
    /// BYT_BLOK = transfer length counts 512-byte blocks
    const BYT_BLOK: u8 = 1 << 2;
    /// T_LENGTH = transfer length is in the SECTOR COUNT field
    const T_LENGTH_SECTOR_COUNT: u8 = 2;

    fn new_data_in(command: u8, protocol: u8, sectors: u16) -> Self {
        assert!(core::mem::size_of::<Self>() == 16);
        Self {
            operation_code: Command::AtaPassThrough16.opcode(),
            protocol: (protocol & 0xF) << 1,
            flags: Self::T_DIR_FROM_DEVICE
                | Self::BYT_BLOK
                | Self::T_LENGTH_SECTOR_COUNT,
            features_be: [0; 2],
            sector_count_be: sectors.to_be_bytes(),
            lba_low_be: [0; 2],
            lba_mid_be: [0; 2],
            lba_high_be: [0; 2],
            device: 0,
            command,
            control: 0,
        }
    }
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for AtaPassThrough16 {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for AtaPassThrough16 {}

/// Standard INQUIRY data
/// Seagate SCSI Commands Reference Manual s3.6.2
///
/// This is the compulsory leading 36 bytes. The ASCII identification
/// fields are kept exactly as the device sent them, padding included.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[repr(C)]
pub struct InquiryResponse {
    peripheral_device_type: u8,
    removable: u8,
    version: u8,
    data_format: u8,
    additional_length: u8,
    flags: [u8; 3],
    vendor_id: [u8; 8],
    product_id: [u8; 16],
    product_revision: [u8; 4],
}

// SAFETY: all fields zeroable
unsafe impl bytemuck::Zeroable for InquiryResponse {}
// SAFETY: no padding, no disallowed bit patterns
unsafe impl bytemuck::Pod for InquiryResponse {}

impl InquiryResponse {
    /// Parse the leading 36 bytes of an INQUIRY reply
    pub fn from_bytes<T>(buf: &[u8]) -> Result<Self, Error<T>> {
        let head = buf.get(..INQUIRY_LEN).ok_or(Error::ShortResponse {
            expected: INQUIRY_LEN,
            actual: buf.len(),
        })?;
        Ok(bytemuck::pod_read_unaligned(head))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn peripheral_type(&self) -> PeripheralType {
        // SAFETY: PeripheralType has a variant for every 5-bit value
        unsafe {
            core::mem::transmute::<u8, PeripheralType>(
                self.peripheral_device_type & 0x1F,
            )
        }
    }

    pub fn is_removable(&self) -> bool {
        (self.removable & 0x80) != 0
    }

    /// The SPC version the device claims to conform to
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn vendor_id(&self) -> &[u8; 8] {
        &self.vendor_id
    }

    pub fn product_id(&self) -> &[u8; 16] {
        &self.product_id
    }

    pub fn product_revision(&self) -> &[u8; 4] {
        &self.product_revision
    }

    /// Vendor identification, all 8 bytes
    pub fn vendor(&self) -> String {
        String::from_utf8_lossy(&self.vendor_id).into_owned()
    }

    /// Product identification and revision, separated by a space
    pub fn product_detail(&self) -> String {
        format!(
            "{} {}",
            String::from_utf8_lossy(&self.product_id),
            String::from_utf8_lossy(&self.product_revision)
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PeripheralType {
    Disk = 0,
    Sequential = 1,
    Printer = 2,
    Processor = 3,
    WriteOnce = 4,
    Optical = 5,
    Scanner = 6,
    OpticalMemory = 7,
    Changer = 8,
    Communications = 9,
    Obsolete10 = 0xa,
    Obsolete11 = 0xb,
    StorageArray = 0xc,
    EnclosureServices = 0xd,
    SimplifiedDirect = 0xe,
    OpticalCardReader = 0xf,
    BridgeController = 0x10,
    ObjectStorage = 0x11,
    Automation = 0x12,
    Reserved13 = 0x13,
    Reserved14 = 0x14,
    Reserved15 = 0x15,
    Reserved16 = 0x16,
    Reserved17 = 0x17,
    Reserved18 = 0x18,
    Reserved19 = 0x19,
    Reserved1A = 0x1A,
    Reserved1B = 0x1B,
    Reserved1C = 0x1C,
    Reserved1D = 0x1D,
    WellKnownUnit = 0x1E,
    Other = 0x1F,
}

/// Size of a device as reported by READ CAPACITY
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Capacity {
    /// Address of the last logical block
    pub last_lba: u64,
    /// Size of each logical block in bytes
    pub block_size: u32,
}

impl Capacity {
    /// READ CAPACITY(10) saturates the last LBA when the device is too
    /// big for it; READ CAPACITY(16) is needed then
    pub fn needs_read_capacity_16(&self) -> bool {
        self.last_lba == 0xFFFF_FFFF
    }

    /// Total size in bytes, `(last_lba + 1) * block_size`
    pub fn bytes(&self) -> u64 {
        self.last_lba
            .saturating_add(1)
            .saturating_mul(self.block_size as u64)
    }
}

/// A SCSI device reached through some [`ScsiTransport`]
pub struct ScsiDevice<T: ScsiTransport> {
    transport: T,
}

impl<T: ScsiTransport> ScsiDevice<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn command_response<C: bytemuck::Pod, R: bytemuck::Pod>(
        &mut self,
        cmd: C,
    ) -> Result<R, Error<T::Error>> {
        let mut r = R::zeroed();
        let sz = self.command_in(cmd, bytemuck::bytes_of_mut(&mut r))?;
        if sz < core::mem::size_of::<R>() {
            return Err(Error::ShortResponse {
                expected: core::mem::size_of::<R>(),
                actual: sz,
            });
        }
        Ok(r)
    }

    fn command_in<C: bytemuck::Pod>(
        &mut self,
        cmd: C,
        buf: &mut [u8],
    ) -> Result<usize, Error<T::Error>> {
        let cmd = bytemuck::bytes_of(&cmd);
        let rc = self.transport.command(cmd, DataPhase::In(buf));
        match &rc {
            Ok(sz) => {
                debug::println!("scsi {:#04x}: {} bytes", cmd[0], sz);
            }
            Err(e) => {
                debug::println!("scsi {:#04x} failed: {:?}", cmd[0], e);
            }
        }
        rc
    }

    /// Standard INQUIRY
    pub fn inquiry(&mut self) -> Result<InquiryResponse, Error<T::Error>> {
        self.command_response(Inquiry::new(INQUIRY_LEN as u16))
    }

    /// MODE SENSE(6) of one page, returned raw
    ///
    /// The reply is the 4-byte mode parameter header, then any block
    /// descriptors, then the page itself. It is cut to the bytes the
    /// device sent, and no further than the mode data length in the
    /// header allows.
    pub fn mode_sense_6(
        &mut self,
        page: u8,
        subpage: u8,
        page_control: u8,
    ) -> Result<Vec<u8>, Error<T::Error>> {
        let mut buf = [0u8; MODE_SENSE_LEN];
        let cmd =
            ModeSense6::new(page, subpage, page_control, MODE_SENSE_LEN as u8);
        let sz = self.command_in(cmd, &mut buf)?;
        if sz < 4 {
            return Err(Error::ShortResponse {
                expected: 4,
                actual: sz,
            });
        }
        let len = sz.min(buf[0] as usize + 1);
        Ok(buf[..len].to_vec())
    }

    /// Medium rotation rate from the Rigid Disk Geometry page
    pub fn rigid_disk_rpm(&mut self) -> Result<u16, Error<T::Error>> {
        let reply = self.mode_sense_6(
            RIGID_DISK_GEOMETRY_PAGE,
            0,
            PAGE_CONTROL_DEFAULT,
        )?;
        rigid_disk_rpm(&reply)
    }

    /// Read capacity (32-bit LBA version, supports <2TB only)
    pub fn read_capacity_10(&mut self) -> Result<Capacity, Error<T::Error>> {
        let reply: ReadCapacity10Reply =
            self.command_response(ReadCapacity10::new())?;
        Ok(Capacity {
            last_lba: u32::from_be_bytes(reply.lba) as u64,
            block_size: u32::from_be_bytes(reply.block_size),
        })
    }

    /// Read capacity (64-bit LBA version, supports >2TB)
    ///
    /// Not universally supported.
    pub fn read_capacity_16(&mut self) -> Result<Capacity, Error<T::Error>> {
        let reply: ReadCapacity16Reply =
            self.command_response(ReadCapacity16::new())?;
        Ok(Capacity {
            last_lba: u64::from_be_bytes(reply.lba),
            block_size: u32::from_be_bytes(reply.block_size),
        })
    }

    /// Read capacity, falling back to READ CAPACITY(16) only when the
    /// 32-bit LBA field is saturated
    pub fn capacity(&mut self) -> Result<Capacity, Error<T::Error>> {
        let capacity = self.read_capacity_10()?;
        if !capacity.needs_read_capacity_16() {
            Ok(capacity)
        } else {
            self.read_capacity_16()
        }
    }

    /// Issue a one-sector data-in ATA command through SAT
    pub fn ata_pass_through_16(
        &mut self,
        command: u8,
        protocol: u8,
    ) -> Result<[u8; IDENTIFY_DATA_LEN], Error<T::Error>> {
        self.command_response(AtaPassThrough16::new_data_in(
            command, protocol, 1,
        ))
    }

    /// ATA IDENTIFY DEVICE, via ATA PASS-THROUGH(16)
    pub fn ata_identify(
        &mut self,
    ) -> Result<IdentifyDeviceData, Error<T::Error>> {
        let page =
            self.ata_pass_through_16(IDENTIFY_DEVICE, ATA_PROTOCOL_PIO_DATA_IN)?;
        Ok(IdentifyDeviceData::new(page))
    }
}

/// Extract the medium rotation rate from a MODE SENSE(6) reply
/// carrying the Rigid Disk Geometry page
///
/// `reply` must hold only the bytes the device sent; a page that stops
/// before the rotation rate field is a protocol error.
pub fn rigid_disk_rpm<T>(reply: &[u8]) -> Result<u16, Error<T>> {
    let block_descriptors = *reply.get(3).ok_or(Error::ProtocolError)? as usize;
    let page = reply
        .get(4 + block_descriptors..)
        .ok_or(Error::ProtocolError)?;
    if page.first().map(|b| b & 0x3F) != Some(RIGID_DISK_GEOMETRY_PAGE) {
        return Err(Error::ProtocolError);
    }
    let rpm = page.get(20..22).ok_or(Error::ProtocolError)?;
    Ok(u16::from_be_bytes([rpm[0], rpm[1]]))
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/scsi_device.rs"]
pub(crate) mod tests;
