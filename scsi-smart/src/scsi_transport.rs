use core::fmt;

/// Size of the sense buffer handed to the kernel with every command
pub const SENSE_BUFFER_LEN: usize = 32;

/// The data phase of a SCSI transaction: in, out, both, or none
///
/// Mirrors the four `dxfer_direction` values of the Linux SCSI generic
/// driver.
#[derive(Debug, PartialEq, Eq)]
pub enum DataPhase<'a> {
    /// The command involves data transfer from device to host
    In(&'a mut [u8]),
    /// The command involves data transfer from host to device
    Out(&'a [u8]),
    /// The buffer is sent to the device and then overwritten by the reply
    InOut(&'a mut [u8]),
    /// The command does not involve data transfer (the status response
    /// includes everything the host needs)
    None,
}

/// An abstract SCSI communications channel to a single device
///
/// Every call blocks until the device (or the kernel on its behalf)
/// has completed the command. A transport carries at most one command
/// at a time, which `&mut self` enforces: the command block, data
/// buffer and sense buffer of an in-flight command can never be
/// touched by anyone else.
pub trait ScsiTransport {
    /// The type of errors which can arise from the transport itself: for
    /// instance, a failed `ioctl` on the device node.
    type Error: PartialEq + Eq + fmt::Debug;

    /// Execute one SCSI command
    ///
    /// The command is a byte slice containing the raw command block
    /// as specified by SCSI standards: for instance, a "READ CAPACITY(10)"
    /// command would be a 10-byte slice containing the structure in
    /// s3.23.2 of the Seagate SCSI Commands Reference Manual.
    ///
    /// The "data" parameter encapsulates any input or output buffer for
    /// transferred data. On success, the number of bytes actually
    /// transferred is returned.
    ///
    /// Commands are never retried; a caller that wants a retry issues
    /// the command again.
    fn command(
        &mut self,
        cmd: &[u8],
        data: DataPhase,
    ) -> Result<usize, Error<Self::Error>>;
}

/// Completion status of a command which the device or driver failed
///
/// The three status fields are exactly those reported by the kernel;
/// they are kept verbatim for diagnostics.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// SCSI status byte (see T10 SAM status codes)
    pub scsi_status: u8,
    /// Errors from the host adapter
    pub host_status: u16,
    /// Errors from the software driver
    pub driver_status: u16,
    /// Sense data returned alongside the failure
    pub sense: [u8; SENSE_BUFFER_LEN],
    /// Number of valid bytes in `sense`
    pub sense_len: u8,
}

impl CommandStatus {
    /// A status with no sense data attached
    pub fn new(scsi_status: u8, host_status: u16, driver_status: u16) -> Self {
        Self {
            scsi_status,
            host_status,
            driver_status,
            sense: [0; SENSE_BUFFER_LEN],
            sense_len: 0,
        }
    }

    /// The valid portion of the sense buffer
    pub fn sense_data(&self) -> &[u8] {
        let len = (self.sense_len as usize).min(SENSE_BUFFER_LEN);
        &self.sense[..len]
    }

    /// Sense key, additional sense code and qualifier, if any
    ///
    /// Handles both fixed-format (0x70/0x71) and descriptor-format
    /// (0x72/0x73) sense data; see SPC-4 s4.5.
    pub fn sense_triple(&self) -> Option<(u8, u8, u8)> {
        let sense = self.sense_data();
        match *sense.first()? & 0x7F {
            0x70 | 0x71 => Some((
                *sense.get(2)? & 0xF,
                sense.get(12).copied().unwrap_or(0),
                sense.get(13).copied().unwrap_or(0),
            )),
            0x72 | 0x73 => Some((
                *sense.get(1)? & 0xF,
                sense.get(2).copied().unwrap_or(0),
                sense.get(3).copied().unwrap_or(0),
            )),
            _ => None,
        }
    }

    /// The device-side error described by the sense data, if recognised
    pub fn scsi_error(&self) -> Option<ScsiError> {
        let (key, asc, ascq) = self.sense_triple()?;
        ScsiError::from_sense(key, asc, ascq)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SCSI status: {:#04x}, host status: {:#04x}, driver status: {:#04x}",
            self.scsi_status, self.host_status, self.driver_status
        )?;
        if let Some(e) = self.scsi_error() {
            write!(f, " ({e})")?;
        }
        Ok(())
    }
}

/// Errors which can arise during a SCSI command
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error<T> {
    /// The device or driver reported failure
    #[error("{0}")]
    CommandFailed(CommandStatus),

    /// Fewer bytes came back than the response layout requires
    #[error("short response: expected {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// The device or transport seemed to deviate from the SCSI protocol
    #[error("malformed response")]
    ProtocolError,

    /// The `ScsiTransport` itself (as opposed to the device) reported an error.
    #[error("transport error: {0}")]
    Transport(T),
}

/// Errors which can be returned over SCSI protocol from the SCSI device
///
/// As opposed to errors detected on the host such as transport errors.
///
/// See Seagate SCSI commands reference s2.4.1.5, 2.4.1.6
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum ScsiError {
    BecomingReady,
    StartUnitRequired,
    ManualInterventionRequired,
    FormatInProgress,
    SelfTestInProgress,
    PowerCycleRequired,
    Overheat,
    EnclosureDegraded,
    WriteError,
    WriteReallocationFailed,
    UnrecoveredReadError,
    ReadRetriesExhausted,
    ReadErrorTooLong,
    ReadReallocationFailed,
    LogicalBlockNotFound,
    RecordNotFound,
    InvalidFieldInParameterList,
    ParameterNotSupported,
    ParameterValueInvalid,
    LogicalUnitSelfTestFailed,
    SelfTestFailed,

    PositioningError,
    ParameterListLengthError,
    MiscompareDuringVerify,
    /// The device does not implement this command
    InvalidCommandOperationCode,
    LogicalBlockAddressOutOfRange,
    /// Something is incorrect in the command block itself
    InvalidFieldInCDB,
    LogicalUnitNotSupported,

    NotReady,
    MediumError,
    HardwareError,
    IllegalRequest,
    /// Something has happened to this device that means it should be
    /// re-evaluted (e.g. media change)
    UnitAttention,
    /// A write was attempted to a read-only device (or similar)
    DataProtect,
    BlankCheck,
    VendorSpecific,
    CopyAborted,
    Aborted,
    VolumeOverflow,
    Miscompare,
}

impl ScsiError {
    /// Classify a sense key / ASC / ASCQ triple
    ///
    /// Most specific match wins; `None` for "no sense", "recovered
    /// error" and anything else not in the tables.
    pub fn from_sense(key: u8, asc: u8, ascq: u8) -> Option<Self> {
        const ERRORS3: &[(u8, u8, u8, ScsiError)] = &[
            (2, 4, 1, ScsiError::BecomingReady),
            (2, 4, 2, ScsiError::StartUnitRequired),
            (2, 4, 3, ScsiError::ManualInterventionRequired),
            (2, 4, 4, ScsiError::FormatInProgress),
            (2, 4, 9, ScsiError::SelfTestInProgress),
            (2, 4, 0x22, ScsiError::PowerCycleRequired),
            (1, 0x0B, 0x01, ScsiError::Overheat),
            (1, 0x0B, 0x02, ScsiError::EnclosureDegraded),
            (3, 0x0C, 0x00, ScsiError::WriteError),
            (3, 0x0C, 0x02, ScsiError::WriteReallocationFailed),
            (1, 0x11, 0x00, ScsiError::UnrecoveredReadError),
            (1, 0x11, 0x01, ScsiError::ReadRetriesExhausted),
            (1, 0x11, 0x02, ScsiError::ReadErrorTooLong),
            (3, 0x11, 0x04, ScsiError::ReadReallocationFailed),
            (3, 0x14, 0x00, ScsiError::LogicalBlockNotFound),
            (3, 0x14, 0x01, ScsiError::RecordNotFound),
            (5, 0x26, 0x00, ScsiError::InvalidFieldInParameterList),
            (5, 0x26, 0x01, ScsiError::ParameterNotSupported),
            (5, 0x26, 0x02, ScsiError::ParameterValueInvalid),
            (4, 0x3E, 0x03, ScsiError::LogicalUnitSelfTestFailed),
            (4, 0x42, 0x00, ScsiError::SelfTestFailed),
        ];
        const ERRORS2: &[(u8, u8, ScsiError)] = &[
            (3, 0x14, ScsiError::PositioningError),
            (5, 0x1A, ScsiError::ParameterListLengthError),
            (0xE, 0x1D, ScsiError::MiscompareDuringVerify),
            (5, 0x20, ScsiError::InvalidCommandOperationCode),
            (0xD, 0x21, ScsiError::LogicalBlockAddressOutOfRange),
            (5, 0x24, ScsiError::InvalidFieldInCDB),
            (5, 0x25, ScsiError::LogicalUnitNotSupported),
        ];
        const ERRORS1: &[(u8, ScsiError)] = &[
            (2, ScsiError::NotReady),
            (3, ScsiError::MediumError),
            (4, ScsiError::HardwareError),
            (5, ScsiError::IllegalRequest),
            (6, ScsiError::UnitAttention),
            (7, ScsiError::DataProtect),
            (8, ScsiError::BlankCheck),
            (9, ScsiError::VendorSpecific),
            (10, ScsiError::CopyAborted),
            (11, ScsiError::Aborted),
            (13, ScsiError::VolumeOverflow),
            (14, ScsiError::Miscompare),
        ];

        ERRORS3
            .iter()
            .find(|i| i.0 == key && i.1 == asc && i.2 == ascq)
            .map(|i| i.3)
            .or_else(|| {
                ERRORS2
                    .iter()
                    .find(|i| i.0 == key && i.1 == asc)
                    .map(|i| i.2)
            })
            .or_else(|| ERRORS1.iter().find(|i| i.0 == key).map(|i| i.1))
    }
}

impl fmt::Display for ScsiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
#[path = "tests/scsi_transport.rs"]
mod tests;
