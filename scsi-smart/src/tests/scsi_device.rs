use super::*;
use crate::scsi_transport::CommandStatus;
use mockall::mock;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mock transport error")]
pub struct MockTransportError;

pub type MockError = Error<MockTransportError>;

mock! {
    pub ScsiTransportInner {
        pub fn command_in(
            &mut self,
            cmd: &[u8],
            data: &mut [u8]
        ) -> Result<usize, MockError>;

        pub fn command_out(
            &mut self,
            cmd: &[u8],
            data: &[u8]
        ) -> Result<usize, MockError>;

        pub fn command_nodata(
            &mut self,
            cmd: &[u8],
        ) -> Result<usize, MockError>;
    }
}

pub struct MockScsiTransport {
    pub inner: MockScsiTransportInner,
}

impl MockScsiTransport {
    pub fn new() -> Self {
        Self {
            inner: MockScsiTransportInner::new(),
        }
    }
}

impl Debug for MockScsiTransport {
    fn fmt(&self, _: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        Ok(())
    }
}

impl ScsiTransport for MockScsiTransport {
    type Error = MockTransportError;

    fn command(
        &mut self,
        cmd: &[u8],
        data: DataPhase,
    ) -> Result<usize, MockError> {
        match data {
            DataPhase::In(data) | DataPhase::InOut(data) => {
                self.inner.command_in(cmd, data)
            }
            DataPhase::Out(data) => self.inner.command_out(cmd, data),
            DataPhase::None => self.inner.command_nodata(cmd),
        }
    }
}

pub struct Fixture {
    pub d: ScsiDevice<MockScsiTransport>,
}

pub fn do_test<
    SetupFn: FnMut(&mut MockScsiTransportInner),
    TestFn: FnMut(Fixture),
>(
    mut setup: SetupFn,
    mut test: TestFn,
) {
    let mut t = MockScsiTransport::new();

    setup(&mut t.inner);

    test(Fixture {
        d: ScsiDevice::new(t),
    });
}

/// CHECK CONDITION, ILLEGAL REQUEST / INVALID FIELD IN CDB
pub fn check_condition() -> CommandStatus {
    let mut status = CommandStatus::new(2, 0, 0);
    status.sense[0] = 0x70;
    status.sense[2] = 0x05;
    status.sense[12] = 0x24;
    status.sense_len = 18;
    status
}

#[rustfmt::skip]
pub fn command_ok_with<T: bytemuck::NoUninit + Send>(
    reply: T,
) -> impl FnMut(&[u8], &mut [u8]) -> Result<usize, MockError> + Send {
    move |_, d| {
        let size = core::mem::size_of::<T>();
        d[0..size].copy_from_slice(bytemuck::bytes_of(&reply));
        Ok(size)
    }
}

pub fn command_in_fails(_: &[u8], _: &mut [u8]) -> Result<usize, MockError> {
    Err(Error::CommandFailed(check_condition()))
}

/// A standard INQUIRY reply with the given identification fields
pub fn inquiry_reply(
    vendor: &[u8; 8],
    product: &[u8; 16],
    revision: &[u8; 4],
) -> [u8; INQUIRY_LEN] {
    let mut reply = [0u8; INQUIRY_LEN];
    reply[2] = 6;
    reply[4] = 31;
    reply[8..16].copy_from_slice(vendor);
    reply[16..32].copy_from_slice(product);
    reply[32..36].copy_from_slice(revision);
    reply
}

/// A MODE SENSE(6) reply: header, one block descriptor, Rigid Disk
/// Geometry page
pub fn rigid_disk_reply(rpm: u16) -> [u8; 34] {
    let mut reply = [0u8; 34];
    reply[0] = 33;
    reply[3] = 8;
    let page = &mut reply[12..];
    page[0] = RIGID_DISK_GEOMETRY_PAGE;
    page[1] = 0x16;
    page[20..22].copy_from_slice(&rpm.to_be_bytes());
    reply
}

#[test]
fn test_command_names() {
    assert_eq!(Command::Inquiry.opcode(), 0x12);
    assert_eq!(Command::ModeSense6.opcode(), 0x1a);
    assert_eq!(Command::ReadCapacity10.opcode(), 0x25);
    assert_eq!(Command::AtaPassThrough16.opcode(), 0x85);
    assert_eq!(Command::ModeSense6.to_string(), "MODE SENSE(6)");
    assert_eq!(
        Command::AtaPassThrough16.to_string(),
        "ATA PASS-THROUGH(16)"
    );
}

#[test]
fn test_inquiry() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, d| c[..] == [0x12, 0, 0, 0, 36, 0] && d.len() == 36)
                .returning(command_ok_with(inquiry_reply(
                    b"SEAGATE ",
                    b"ST4000NM0033-9ZM",
                    b"SN06",
                )));
        },
        |mut f| {
            let inq = f.d.inquiry().unwrap();
            assert_eq!(inq.peripheral_type(), PeripheralType::Disk);
            assert!(!inq.is_removable());
            assert_eq!(inq.version(), 6);
            assert_eq!(inq.vendor_id(), b"SEAGATE ");
            assert_eq!(inq.vendor(), "SEAGATE ");
            assert_eq!(inq.product_detail(), "ST4000NM0033-9ZM SN06");
        },
    );
}

#[test]
fn test_inquiry_fields_verbatim() {
    let reply = inquiry_reply(b"ATA     ", b"WDC WD40EFRX-68N", b"0A82");
    let inq = InquiryResponse::from_bytes::<()>(&reply).unwrap();
    assert_eq!(inq.as_bytes(), &reply[..]);
    assert_eq!(inq.product_id(), b"WDC WD40EFRX-68N");
    assert_eq!(inq.product_revision(), b"0A82");
}

#[test]
fn test_inquiry_peripheral_type() {
    let mut reply = inquiry_reply(b"HL-DT-ST", b"DVDRAM GH24NSD1 ", b"LG00");
    reply[0] = 0x05;
    reply[1] = 0x80;
    let inq = InquiryResponse::from_bytes::<()>(&reply).unwrap();
    assert_eq!(inq.peripheral_type(), PeripheralType::Optical);
    assert!(inq.is_removable());
}

#[test]
fn test_inquiry_from_short_bytes() {
    assert_eq!(
        InquiryResponse::from_bytes::<()>(&[0u8; 20]),
        Err(Error::ShortResponse {
            expected: 36,
            actual: 20
        })
    );
}

#[test]
fn test_inquiry_short() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x12)
                .returning(|_, _| Ok(5));
        },
        |mut f| {
            assert_eq!(
                f.d.inquiry(),
                Err(Error::ShortResponse {
                    expected: 36,
                    actual: 5
                })
            );
        },
    );
}

#[test]
fn test_inquiry_fails() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x12)
                .returning(command_in_fails);
        },
        |mut f| {
            let e = f.d.inquiry().unwrap_err();
            assert_eq!(e, Error::CommandFailed(check_condition()));
        },
    );
}

#[test]
fn test_mode_sense_rpm() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, d| {
                    c[..] == [0x1a, 0, 0x84, 0, 64, 0] && d.len() == 64
                })
                .returning(command_ok_with(rigid_disk_reply(7200)));
        },
        |mut f| {
            assert_eq!(f.d.rigid_disk_rpm(), Ok(7200));
        },
    );
}

#[test]
fn test_mode_sense_current_values() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[..] == [0x1a, 0, 0x08, 0, 64, 0])
                .returning(command_ok_with([0x13u8, 0, 0, 0]));
        },
        |mut f| {
            let reply = f.d.mode_sense_6(0x08, 0, PAGE_CONTROL_CURRENT).unwrap();
            assert_eq!(reply, [0x13, 0, 0, 0]);
        },
    );
}

#[test]
fn test_mode_sense_short() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x1a)
                .returning(|_, _| Ok(2));
        },
        |mut f| {
            assert_eq!(
                f.d.rigid_disk_rpm(),
                Err(Error::ShortResponse {
                    expected: 4,
                    actual: 2
                })
            );
        },
    );
}

#[test]
fn test_mode_sense_page_cut_short() {
    // Header and block descriptor, then only two bytes of the page
    let mut reply = [0u8; 14];
    reply[0] = 13;
    reply[3] = 8;
    reply[12] = RIGID_DISK_GEOMETRY_PAGE;
    reply[13] = 0x16;
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x1a)
                .returning(command_ok_with(reply));
        },
        |mut f| {
            assert_eq!(f.d.rigid_disk_rpm(), Err(Error::ProtocolError));
        },
    );
}

#[test]
fn test_mode_sense_trusts_mode_data_length() {
    // Device fills the whole buffer but claims only 14 bytes of data
    let mut reply = rigid_disk_reply(7200);
    reply[0] = 13;
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x1a)
                .returning(command_ok_with(reply));
        },
        |mut f| {
            let bytes = f
                .d
                .mode_sense_6(RIGID_DISK_GEOMETRY_PAGE, 0, PAGE_CONTROL_DEFAULT)
                .unwrap();
            assert_eq!(bytes.len(), 14);
            assert_eq!(f.d.rigid_disk_rpm(), Err(Error::ProtocolError));
        },
    );
}

#[test]
fn test_rigid_disk_rpm_without_block_descriptors() {
    let mut reply = [0u8; MODE_SENSE_LEN];
    reply[4] = 0x84; // PS bit set
    reply[4 + 20..4 + 22].copy_from_slice(&10_000_u16.to_be_bytes());
    assert_eq!(rigid_disk_rpm::<()>(&reply), Ok(10_000));
}

#[test]
fn test_rigid_disk_rpm_wrong_page() {
    let mut reply = rigid_disk_reply(5400);
    reply[12] = 0x08;
    assert_eq!(rigid_disk_rpm::<()>(&reply), Err(Error::ProtocolError));
}

#[test]
fn test_rigid_disk_rpm_truncated() {
    let reply = rigid_disk_reply(5400);
    assert_eq!(rigid_disk_rpm::<()>(&reply[..20]), Err(Error::ProtocolError));
}

#[test]
fn test_read_capacity_10() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, d| c[..] == [0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0] && d.len() == 8)
                .returning(command_ok_with(ReadCapacity10Reply {
                    lba: 1_u32.to_be_bytes(),
                    block_size: 512_u32.to_be_bytes(),
                }));
        },
        |mut f| {
            let capacity = f.d.read_capacity_10().unwrap();
            assert_eq!(
                capacity,
                Capacity {
                    last_lba: 1,
                    block_size: 512
                }
            );
            assert_eq!(capacity.bytes(), 1024);
        },
    );
}

#[test]
fn test_read_capacity_10_wrong_size() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x25)
                .returning(command_ok_with([0u8; 6]));
        },
        |mut f| {
            assert_eq!(
                f.d.read_capacity_10(),
                Err(Error::ShortResponse {
                    expected: 8,
                    actual: 6
                })
            );
        },
    );
}

#[test]
fn test_read_capacity_10_fails() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x25)
                .returning(command_in_fails);
        },
        |mut f| {
            let e = f.d.read_capacity_10().unwrap_err();
            let Error::CommandFailed(status) = e else {
                panic!("unexpected {e:?}");
            };
            assert_eq!(status.scsi_status, 2);
            assert_eq!(
                status.scsi_error(),
                Some(crate::scsi_transport::ScsiError::InvalidFieldInCDB)
            );
        },
    );
}

#[test]
fn test_read_capacity_16() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x9e && c[1] == 0x10 && c[13] >= 32)
                .returning(command_ok_with(ReadCapacity16Reply {
                    lba: 0x102030405060708_u64.to_be_bytes(),
                    block_size: 4096_u32.to_be_bytes(),
                    flags: [0; 2],
                    lowest_aligned_lba: [0; 2],
                    reserved: [0; 16],
                }));
        },
        |mut f| {
            let capacity = f.d.read_capacity_16().unwrap();
            assert_eq!(capacity.block_size, 4096);
            assert_eq!(capacity.last_lba, 0x0102030405060708);
        },
    );
}

#[test]
fn test_capacity_falls_back_to_16() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x25)
                .returning(command_ok_with(ReadCapacity10Reply {
                    lba: [0xFF; 4],
                    block_size: 512_u32.to_be_bytes(),
                }));
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x9e)
                .returning(command_ok_with(ReadCapacity16Reply {
                    lba: 0x1_D1C0_BEAF_u64.to_be_bytes(),
                    block_size: 512_u32.to_be_bytes(),
                    ..Default::default()
                }));
        },
        |mut f| {
            let capacity = f.d.capacity().unwrap();
            assert_eq!(capacity.last_lba, 0x1_D1C0_BEAF);
            assert_eq!(capacity.bytes(), 0x1_D1C0_BEB0 * 512);
        },
    );
}

#[test]
fn test_capacity_without_fallback() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x25)
                .returning(command_ok_with(ReadCapacity10Reply {
                    lba: 999_u32.to_be_bytes(),
                    block_size: 4096_u32.to_be_bytes(),
                }));
            t.expect_command_in().never().withf(|c, _| c[0] == 0x9e);
        },
        |mut f| {
            assert_eq!(f.d.capacity().unwrap().bytes(), 1000 * 4096);
        },
    );
}

#[test]
fn test_capacity_saturates() {
    let capacity = Capacity {
        last_lba: u64::MAX,
        block_size: 512,
    };
    assert_eq!(capacity.bytes(), u64::MAX);
}

#[test]
fn test_ata_identify() {
    let mut page = [0u8; 512];
    page[434..436].copy_from_slice(&7200_u16.to_le_bytes());
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, d| {
                    c[..]
                        == [
                            0x85, 0x08, 0x0e, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0,
                            0xEC, 0,
                        ]
                        && d.len() == 512
                })
                .returning(command_ok_with(page));
        },
        |mut f| {
            let identify = f.d.ata_identify().unwrap();
            assert_eq!(identify.rotation_rate(), 7200);
        },
    );
}

#[test]
fn test_ata_identify_short() {
    do_test(
        |t| {
            t.expect_command_in()
                .times(1)
                .withf(|c, _| c[0] == 0x85)
                .returning(|_, _| Ok(100));
        },
        |mut f| {
            assert_eq!(
                f.d.ata_identify(),
                Err(Error::ShortResponse {
                    expected: 512,
                    actual: 100
                })
            );
        },
    );
}

#[test]
fn test_into_transport() {
    let d = ScsiDevice::new(MockScsiTransport::new());
    let _t: MockScsiTransport = d.into_transport();
}
