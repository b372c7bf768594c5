//! Disk identity over the Linux SCSI generic pass-through
//!
//! Plain SCSI disks are asked with INQUIRY, MODE SENSE(6) and READ
//! CAPACITY; ATA disks behind a SCSI-ATA Translation layer are also
//! asked for their IDENTIFY DEVICE page through ATA PASS-THROUGH(16).
//!
//! ```no_run
//! for path in scsi_smart::scan_devices()? {
//!     let model = scsi_smart::basic_disk_info(&path, "ModelNumber")?;
//!     println!("{}: {model}", path.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[cfg(not(target_os = "linux"))]
compile_error!("scsi-smart needs the Linux SG_IO interface");

mod debug;
pub mod ata_identify;
pub use ata_identify::IdentifyDeviceData;
pub mod device_handle;
pub use device_handle::DeviceHandle;
pub mod disk;
pub use disk::{Attribute, Disk, DiskDevice, DiskKind, QueryError};
pub mod privilege;
pub use privilege::{check_access_capability, PermissionError};
pub mod scan;
pub use scan::scan_devices;
pub mod scsi_device;
pub use scsi_device::{Capacity, PeripheralType, ScsiDevice};
pub mod scsi_transport;
pub use scsi_transport::{Error, ScsiTransport};
pub mod sg_io;
pub use sg_io::SgIoTransport;

use disk::inquiry_attribute;
use nix::errno::Errno;
use privilege::CapabilitySets;
use scsi_device::InquiryResponse;
use std::path::Path;

/// Read one attribute of the disk at `path`
///
/// Checks the caller's capabilities first, then opens and classifies
/// the device, queries it, and closes it again. See [`Attribute`] for
/// the names understood; other names give the disk's "not found"
/// sentinel. Vendor and ProductDetail are answered from the INQUIRY
/// that classified the disk, so no further command is sent for them.
pub fn basic_disk_info<P: AsRef<Path>>(
    path: P,
    attr: &str,
) -> Result<String, QueryError<Errno>> {
    basic_disk_info_with(
        privilege::current_capabilities,
        |path| Disk::open_with_inquiry(path),
        path.as_ref(),
        attr,
    )
}

fn basic_disk_info_with<T, Q, O>(
    query: Q,
    open: O,
    path: &Path,
    attr: &str,
) -> Result<String, QueryError<T::Error>>
where
    T: ScsiTransport,
    Q: FnOnce() -> Result<CapabilitySets, Errno>,
    O: FnOnce(
        &Path,
    ) -> Result<(Disk<T>, InquiryResponse), QueryError<T::Error>>,
{
    privilege::check_access_capability_inner(query)?;
    if path.as_os_str().is_empty() {
        return Err(QueryError::NoDevicePath);
    }
    // Dropping the disk closes the device, on error paths too
    let (mut disk, inquiry) = open(path)?;
    match attr.parse().ok().and_then(|a| inquiry_attribute(&inquiry, a)) {
        Some(value) => Ok(value),
        None => disk.basic_disk_info(attr),
    }
}
