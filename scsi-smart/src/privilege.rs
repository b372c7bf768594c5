//! Capability gate for raw device access
//!
//! `SG_IO` on a disk node needs `CAP_SYS_RAWIO` (or the catch-all
//! `CAP_SYS_ADMIN`). The check is made against the *effective* set of
//! the calling thread, freshly on every call: nothing is cached.

use crate::debug;
use nix::errno::Errno;

/// `_LINUX_CAPABILITY_VERSION_3`: 64-bit capability sets, two u32 words
const CAPABILITY_VERSION_3: u32 = 0x2008_0522;

pub const CAP_SYS_RAWIO: u32 = 1 << 17;
pub const CAP_SYS_ADMIN: u32 = 1 << 21;

/// `struct __user_cap_header_struct`
#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: libc::c_int,
}

/// `struct __user_cap_data_struct`
#[repr(C)]
#[derive(Copy, Clone, Default)]
struct CapUserData {
    effective: u32,
    permitted: u32,
    inheritable: u32,
}

/// The low 32 capability bits of each set, as returned by `capget(2)`
///
/// Both capabilities of interest live in the low word.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySets {
    pub effective: u32,
    pub permitted: u32,
    pub inheritable: u32,
}

impl CapabilitySets {
    /// True if the effective set allows raw block-device commands
    pub fn allows_raw_io(&self) -> bool {
        self.effective & (CAP_SYS_RAWIO | CAP_SYS_ADMIN) != 0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error(
        "neither CAP_SYS_RAWIO nor CAP_SYS_ADMIN is effective \
         (effective set {effective:#010x})"
    )]
    MissingCapability { effective: u32 },

    #[error("capget failed: {0}")]
    CapabilityQuery(#[source] Errno),
}

/// Query the capability sets of the calling thread
pub fn current_capabilities() -> Result<CapabilitySets, Errno> {
    let mut header = CapUserHeader {
        version: CAPABILITY_VERSION_3,
        pid: 0,
    };
    let mut data = [CapUserData::default(); 2];
    // SAFETY: header and data are valid for writes, and data has the
    // two elements that version 3 requires.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capget,
            &mut header as *mut CapUserHeader,
            data.as_mut_ptr(),
        )
    };
    Errno::result(rc)?;
    Ok(CapabilitySets {
        effective: data[0].effective,
        permitted: data[0].permitted,
        inheritable: data[0].inheritable,
    })
}

/// Succeed only if the caller may issue raw SCSI/ATA commands
pub fn check_access_capability() -> Result<(), PermissionError> {
    check_access_capability_inner(current_capabilities)
}

pub(crate) fn check_access_capability_inner(
    query: impl FnOnce() -> Result<CapabilitySets, Errno>,
) -> Result<(), PermissionError> {
    let caps = query().map_err(PermissionError::CapabilityQuery)?;
    if caps.allows_raw_io() {
        Ok(())
    } else {
        debug::println!("missing capability: effective {:#010x}", caps.effective);
        Err(PermissionError::MissingCapability {
            effective: caps.effective,
        })
    }
}
