//! Device classification and the attribute-query façade
//!
//! A disk is classified once, from its INQUIRY vendor identification,
//! into either a plain SCSI disk or an ATA disk behind a SCSI-ATA
//! Translation layer. Both answer [`DiskDevice::basic_disk_info`];
//! each attribute query issues only the commands that attribute needs.

use crate::ata_identify::IdentifyDeviceData;
use crate::debug;
use crate::device_handle::DeviceHandle;
use crate::privilege::PermissionError;
use crate::scsi_device::{Command, InquiryResponse, ScsiDevice};
use crate::scsi_transport::{self, ScsiTransport};
use crate::sg_io::SgIoTransport;
use core::fmt;
use core::str::FromStr;
use nix::errno::Errno;
use std::io;
use std::path::{Path, PathBuf};

/// Answer for an attribute a plain SCSI disk does not provide
pub const ATTRIBUTE_NOT_FOUND: &str = "Attribute not found";

/// Answer for an attribute an ATA disk does not provide
pub const ATTRIBUTE_DETAILS_NOT_FOUND: &str = "Attribute Details not found";

/// INQUIRY vendor identification reported by SAT layers
pub const ATA_VENDOR_ID: &[u8; 8] = b"ATA     ";

/// The attributes that can be asked for by name
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Attribute {
    Vendor,
    ProductDetail,
    Capacity,
    LogicalSize,
    PhysicalSize,
    SerialNumber,
    LuWwnDeviceId,
    FirmwareRevision,
    ModelNumber,
    Rpm,
    AtaMajorVersion,
    AtaMinorVersion,
    AtaTransport,
}

impl Attribute {
    pub const ALL: [Attribute; 13] = [
        Attribute::Vendor,
        Attribute::ProductDetail,
        Attribute::Capacity,
        Attribute::LogicalSize,
        Attribute::PhysicalSize,
        Attribute::SerialNumber,
        Attribute::LuWwnDeviceId,
        Attribute::FirmwareRevision,
        Attribute::ModelNumber,
        Attribute::Rpm,
        Attribute::AtaMajorVersion,
        Attribute::AtaMinorVersion,
        Attribute::AtaTransport,
    ];

    /// The external name, as accepted by [`FromStr`]
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Vendor => "Vendor",
            Attribute::ProductDetail => "ProductDetail",
            Attribute::Capacity => "Capacity",
            Attribute::LogicalSize => "LogicalSize",
            Attribute::PhysicalSize => "PhysicalSize",
            Attribute::SerialNumber => "SerialNumber",
            Attribute::LuWwnDeviceId => "LuWWNDeviceID",
            Attribute::FirmwareRevision => "FirmwareRevision",
            Attribute::ModelNumber => "ModelNumber",
            Attribute::Rpm => "RPM",
            Attribute::AtaMajorVersion => "ATAMajorVersion",
            Attribute::AtaMinorVersion => "ATAMinorVersion",
            Attribute::AtaTransport => "AtaTransport",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The name matched no [`Attribute`] (names are case-sensitive)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attribute {0:?}")]
pub struct UnknownAttribute(pub String);

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| UnknownAttribute(s.to_string()))
    }
}

/// Errors from querying a disk attribute
#[derive(Debug, thiserror::Error)]
pub enum QueryError<E> {
    #[error("error while checking device access permissions: {0}")]
    Permission(#[from] PermissionError),

    #[error("no disk device path given")]
    NoDevicePath,

    #[error("cannot access {}: {error}", path.display())]
    Io { path: PathBuf, error: io::Error },

    /// A SCSI command failed; `command` says which
    #[error("{command} failed: {error}")]
    Command {
        command: Command,
        error: scsi_transport::Error<E>,
    },
}

impl<E> QueryError<E> {
    fn command(
        command: Command,
    ) -> impl FnOnce(scsi_transport::Error<E>) -> Self {
        move |error| QueryError::Command { command, error }
    }
}

/// Which command path a disk's attributes are read through
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiskKind {
    PlainScsi,
    AtaViaSat,
}

impl DiskKind {
    pub fn from_vendor_id(vendor_id: &[u8; 8]) -> Self {
        if vendor_id == ATA_VENDOR_ID {
            DiskKind::AtaViaSat
        } else {
            DiskKind::PlainScsi
        }
    }
}

/// Attribute queries common to every kind of disk
pub trait DiskDevice {
    type Error;

    /// Sentinel returned for attributes this disk does not provide
    fn not_found(&self) -> &'static str;

    fn supported_attributes(&self) -> &'static [Attribute];

    /// Read one attribute; `Ok(None)` if this disk does not provide it
    fn attribute(
        &mut self,
        attr: Attribute,
    ) -> Result<Option<String>, QueryError<Self::Error>>;

    /// Read an attribute by name
    ///
    /// Names that are unknown, or that this kind of disk does not
    /// provide, give the [`not_found`](DiskDevice::not_found) sentinel
    /// rather than an error.
    fn basic_disk_info(
        &mut self,
        name: &str,
    ) -> Result<String, QueryError<Self::Error>> {
        let value = match name.parse() {
            Ok(attr) => self.attribute(attr)?,
            Err(_) => None,
        };
        Ok(value.unwrap_or_else(|| self.not_found().to_string()))
    }
}

/// The attributes answered straight from an INQUIRY reply
pub fn inquiry_attribute(
    inquiry: &InquiryResponse,
    attr: Attribute,
) -> Option<String> {
    match attr {
        Attribute::Vendor => Some(inquiry.vendor()),
        Attribute::ProductDetail => Some(inquiry.product_detail()),
        _ => None,
    }
}

const SCSI_ATTRIBUTES: &[Attribute] = &[
    Attribute::Vendor,
    Attribute::ProductDetail,
    Attribute::Capacity,
    Attribute::Rpm,
];

/// A disk spoken to with SCSI commands only
pub struct ScsiDisk<T: ScsiTransport> {
    pub scsi: ScsiDevice<T>,
}

impl<T: ScsiTransport> ScsiDisk<T> {
    pub fn new(scsi: ScsiDevice<T>) -> Self {
        Self { scsi }
    }

    fn inquiry_attribute(
        &mut self,
        attr: Attribute,
    ) -> Result<Option<String>, QueryError<T::Error>> {
        let inquiry = self
            .scsi
            .inquiry()
            .map_err(QueryError::command(Command::Inquiry))?;
        Ok(inquiry_attribute(&inquiry, attr))
    }

    fn capacity(&mut self) -> Result<String, QueryError<T::Error>> {
        let mut capacity = self
            .scsi
            .read_capacity_10()
            .map_err(QueryError::command(Command::ReadCapacity10))?;
        if capacity.needs_read_capacity_16() {
            capacity = self
                .scsi
                .read_capacity_16()
                .map_err(QueryError::command(Command::ReadCapacity16))?;
        }
        Ok(capacity.bytes().to_string())
    }
}

impl<T: ScsiTransport> DiskDevice for ScsiDisk<T> {
    type Error = T::Error;

    fn not_found(&self) -> &'static str {
        ATTRIBUTE_NOT_FOUND
    }

    fn supported_attributes(&self) -> &'static [Attribute] {
        SCSI_ATTRIBUTES
    }

    fn attribute(
        &mut self,
        attr: Attribute,
    ) -> Result<Option<String>, QueryError<T::Error>> {
        Ok(Some(match attr {
            Attribute::Vendor | Attribute::ProductDetail => {
                return self.inquiry_attribute(attr)
            }
            Attribute::Capacity => self.capacity()?,
            Attribute::Rpm => self
                .scsi
                .rigid_disk_rpm()
                .map_err(QueryError::command(Command::ModeSense6))?
                .to_string(),
            _ => return Ok(None),
        }))
    }
}

/// An ATA disk reached through SCSI-ATA Translation
///
/// Everything a [`ScsiDisk`] answers, plus the IDENTIFY DEVICE fields.
pub struct SatDisk<T: ScsiTransport> {
    disk: ScsiDisk<T>,
}

impl<T: ScsiTransport> SatDisk<T> {
    pub fn new(scsi: ScsiDevice<T>) -> Self {
        Self {
            disk: ScsiDisk::new(scsi),
        }
    }

    pub fn scsi(&mut self) -> &mut ScsiDevice<T> {
        &mut self.disk.scsi
    }

    pub fn identify(
        &mut self,
    ) -> Result<IdentifyDeviceData, QueryError<T::Error>> {
        self.disk
            .scsi
            .ata_identify()
            .map_err(QueryError::command(Command::AtaPassThrough16))
    }
}

impl<T: ScsiTransport> DiskDevice for SatDisk<T> {
    type Error = T::Error;

    fn not_found(&self) -> &'static str {
        ATTRIBUTE_DETAILS_NOT_FOUND
    }

    fn supported_attributes(&self) -> &'static [Attribute] {
        &Attribute::ALL
    }

    fn attribute(
        &mut self,
        attr: Attribute,
    ) -> Result<Option<String>, QueryError<T::Error>> {
        if matches!(
            attr,
            Attribute::Vendor | Attribute::ProductDetail | Attribute::Capacity
        ) {
            return self.disk.attribute(attr);
        }

        let identify = self.identify()?;
        Ok(Some(match attr {
            Attribute::SerialNumber => identify.serial_number(),
            Attribute::ModelNumber => identify.model_number(),
            Attribute::FirmwareRevision => identify.firmware_revision(),
            Attribute::LuWwnDeviceId => identify.world_wide_name(),
            Attribute::AtaTransport => identify.transport(),
            Attribute::AtaMajorVersion => {
                identify.ata_major_version().to_string()
            }
            Attribute::AtaMinorVersion => {
                identify.ata_minor_version().to_string()
            }
            Attribute::Rpm => identify.rotation_rate().to_string(),
            Attribute::LogicalSize => {
                identify.sector_sizes().logical.to_string()
            }
            Attribute::PhysicalSize => {
                identify.sector_sizes().physical.to_string()
            }
            Attribute::Vendor
            | Attribute::ProductDetail
            | Attribute::Capacity => return Ok(None),
        }))
    }
}

/// A classified disk
pub enum Disk<T: ScsiTransport> {
    Scsi(ScsiDisk<T>),
    Sat(SatDisk<T>),
}

impl<T: ScsiTransport> Disk<T> {
    /// Classify a device by its INQUIRY vendor identification
    pub fn classify(
        scsi: ScsiDevice<T>,
    ) -> Result<Self, QueryError<T::Error>> {
        Self::classify_with_inquiry(scsi).map(|(disk, _)| disk)
    }

    /// As [`classify`](Disk::classify), also handing back the INQUIRY
    /// reply it was classified from
    pub fn classify_with_inquiry(
        mut scsi: ScsiDevice<T>,
    ) -> Result<(Self, InquiryResponse), QueryError<T::Error>> {
        let inquiry = scsi
            .inquiry()
            .map_err(QueryError::command(Command::Inquiry))?;
        let kind = DiskKind::from_vendor_id(inquiry.vendor_id());
        debug::println!("classified {:?} as {:?}", inquiry.vendor(), kind);
        let disk = match kind {
            DiskKind::PlainScsi => Disk::Scsi(ScsiDisk::new(scsi)),
            DiskKind::AtaViaSat => Disk::Sat(SatDisk::new(scsi)),
        };
        Ok((disk, inquiry))
    }

    pub fn kind(&self) -> DiskKind {
        match self {
            Disk::Scsi(_) => DiskKind::PlainScsi,
            Disk::Sat(_) => DiskKind::AtaViaSat,
        }
    }

    /// The attributes this disk can answer
    pub fn attributes(&self) -> &'static [Attribute] {
        self.supported_attributes()
    }

    pub fn into_scsi(self) -> ScsiDevice<T> {
        match self {
            Disk::Scsi(d) => d.scsi,
            Disk::Sat(d) => d.disk.scsi,
        }
    }
}

impl<T: ScsiTransport> DiskDevice for Disk<T> {
    type Error = T::Error;

    fn not_found(&self) -> &'static str {
        match self {
            Disk::Scsi(d) => d.not_found(),
            Disk::Sat(d) => d.not_found(),
        }
    }

    fn supported_attributes(&self) -> &'static [Attribute] {
        match self {
            Disk::Scsi(d) => d.supported_attributes(),
            Disk::Sat(d) => d.supported_attributes(),
        }
    }

    fn attribute(
        &mut self,
        attr: Attribute,
    ) -> Result<Option<String>, QueryError<T::Error>> {
        match self {
            Disk::Scsi(d) => d.attribute(attr),
            Disk::Sat(d) => d.attribute(attr),
        }
    }
}

impl Disk<SgIoTransport> {
    /// Open a device node and classify it
    ///
    /// If classification fails the device is closed again before the
    /// error is returned.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QueryError<Errno>> {
        Self::open_with_inquiry(path).map(|(disk, _)| disk)
    }

    /// As [`open`](Disk::open), also handing back the INQUIRY reply
    pub fn open_with_inquiry<P: AsRef<Path>>(
        path: P,
    ) -> Result<(Self, InquiryResponse), QueryError<Errno>> {
        let path = path.as_ref();
        let handle = DeviceHandle::open(path).map_err(|error| QueryError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Disk::classify_with_inquiry(ScsiDevice::new(SgIoTransport::new(handle)))
    }

    pub fn path(&self) -> &Path {
        match self {
            Disk::Scsi(d) => d.scsi.transport().handle().path(),
            Disk::Sat(d) => d.disk.scsi.transport().handle().path(),
        }
    }

    /// Close the device node, reporting any error
    pub fn close(self) -> io::Result<()> {
        self.into_scsi().into_transport().into_handle().close()
    }
}

#[cfg(all(test, feature = "std"))]
#[path = "tests/disk.rs"]
mod tests;
