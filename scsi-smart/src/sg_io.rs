//! SCSI transport over the Linux SCSI generic (`sg`) driver
//!
//! Every command is one `SG_IO` ioctl on the device node; see
//! `include/scsi/sg.h` and the Linux SCSI Generic HOWTO for the layout
//! of the request header.

use crate::debug;
use crate::device_handle::DeviceHandle;
use crate::scsi_transport::{
    CommandStatus, DataPhase, Error, ScsiTransport, SENSE_BUFFER_LEN,
};
use nix::errno::Errno;
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Per-command timeout unless overridden with [`SgIoTransport::with_timeout`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

const SG_IO: u32 = 0x2285;
const SG_INTERFACE_ID: i32 = b'S' as i32;

const SG_DXFER_NONE: i32 = -1;
const SG_DXFER_TO_DEV: i32 = -2;
const SG_DXFER_FROM_DEV: i32 = -3;
const SG_DXFER_TO_FROM_DEV: i32 = -4;

/// `info` bit: the command did not complete cleanly
const SG_INFO_CHECK: u32 = 0x1;

const MAX_CDB_LEN: usize = 16;

/// `struct sg_io_hdr`
#[repr(C)]
#[derive(Debug)]
struct SgIoHeader {
    interface_id: i32,
    dxfer_direction: i32,
    cmd_len: u8,
    mx_sb_len: u8,
    iovec_count: u16,
    dxfer_len: u32,
    dxferp: *mut libc::c_void,
    cmdp: *const u8,
    sbp: *mut u8,
    timeout: u32,
    flags: u32,
    pack_id: i32,
    usr_ptr: *mut libc::c_void,
    status: u8,
    masked_status: u8,
    msg_status: u8,
    sb_len_wr: u8,
    host_status: u16,
    driver_status: u16,
    resid: i32,
    duration: u32,
    info: u32,
}

mod ioctl {
    use super::{SgIoHeader, SG_IO};

    nix::ioctl_readwrite_bad!(sg_io, SG_IO, SgIoHeader);
}

/// A [`ScsiTransport`] issuing `SG_IO` on an open [`DeviceHandle`]
#[derive(Debug)]
pub struct SgIoTransport {
    handle: DeviceHandle,
    timeout: Duration,
}

impl SgIoTransport {
    pub fn new(handle: DeviceHandle) -> Self {
        Self::with_timeout(handle, DEFAULT_TIMEOUT)
    }

    /// Use `timeout` for every command instead of [`DEFAULT_TIMEOUT`]
    ///
    /// The kernel takes milliseconds in 32 bits; longer durations are
    /// clamped.
    pub fn with_timeout(handle: DeviceHandle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn into_handle(self) -> DeviceHandle {
        self.handle
    }

    fn timeout_ms(&self) -> u32 {
        u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX)
    }
}

impl ScsiTransport for SgIoTransport {
    type Error = Errno;

    fn command(
        &mut self,
        cmd: &[u8],
        data: DataPhase,
    ) -> Result<usize, Error<Errno>> {
        if cmd.is_empty() || cmd.len() > MAX_CDB_LEN {
            return Err(Error::ProtocolError);
        }

        let (direction, dxferp, dxfer_len): (i32, *mut libc::c_void, usize) =
            match data {
                DataPhase::In(buf) => {
                    (SG_DXFER_FROM_DEV, buf.as_mut_ptr().cast(), buf.len())
                }
                DataPhase::Out(buf) => (
                    SG_DXFER_TO_DEV,
                    buf.as_ptr().cast_mut().cast(),
                    buf.len(),
                ),
                DataPhase::InOut(buf) => {
                    (SG_DXFER_TO_FROM_DEV, buf.as_mut_ptr().cast(), buf.len())
                }
                DataPhase::None => (SG_DXFER_NONE, core::ptr::null_mut(), 0),
            };
        let dxfer_len =
            u32::try_from(dxfer_len).map_err(|_| Error::ProtocolError)?;

        let mut sense = [0u8; SENSE_BUFFER_LEN];
        let mut hdr = SgIoHeader {
            interface_id: SG_INTERFACE_ID,
            dxfer_direction: direction,
            cmd_len: cmd.len() as u8,
            mx_sb_len: SENSE_BUFFER_LEN as u8,
            iovec_count: 0,
            dxfer_len,
            dxferp,
            cmdp: cmd.as_ptr(),
            sbp: sense.as_mut_ptr(),
            timeout: self.timeout_ms(),
            flags: 0,
            pack_id: 0,
            usr_ptr: core::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };

        // SAFETY: cmd, the data buffer and sense are all borrowed for the
        // whole of this call, and their lengths are the ones given in hdr.
        // SG_IO is synchronous, so the kernel is done with them on return.
        unsafe { ioctl::sg_io(self.handle.as_raw_fd(), &mut hdr) }
            .map_err(Error::Transport)?;

        if hdr.info & SG_INFO_CHECK != 0 {
            let status = CommandStatus {
                scsi_status: hdr.status,
                host_status: hdr.host_status,
                driver_status: hdr.driver_status,
                sense,
                sense_len: hdr.sb_len_wr.min(SENSE_BUFFER_LEN as u8),
            };
            debug::println!(
                "SG_IO {:#04x} on {}: {}",
                cmd[0],
                self.handle.path().display(),
                status
            );
            return Err(Error::CommandFailed(status));
        }

        let resid = hdr.resid.max(0) as u32;
        Ok(dxfer_len.saturating_sub(resid) as usize)
    }
}
