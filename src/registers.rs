//! RISC-V Debug Module register layouts (see `SPEC_FULL.md` §6).
//!
//! Each DM register gets a `bitfield!`-backed newtype plus a [`DmRegister`]
//! impl naming its address, the same pairing the teacher uses for
//! `Dmcontrol`/`Dmstatus`/`Abstractcs`/etc.

use bitfield::bitfield;

/// A register reachable over the `dmi` bus, addressed by its low byte.
pub trait DmRegister: From<u32> + Into<u32> + Copy {
    /// Address of the register on the `dmi` bus.
    const ADDRESS: u32;
    /// Name used in log messages.
    const NAME: &'static str;
}

macro_rules! dm_register {
    ($i:ident, $addr:expr, $name:expr) => {
        impl DmRegister for $i {
            const ADDRESS: u32 = $addr;
            const NAME: &'static str = $name;
        }
    };
}

// --- JTAG IR register addresses (fixed by the debug spec) ---

/// `IDCODE` IR value.
pub const IR_IDCODE: u32 = 0x01;
/// `DTMCS` IR value.
pub const IR_DTMCS: u32 = 0x10;
/// `DMI` IR value.
pub const IR_DMI: u32 = 0x11;
/// `BYPASS` IR value.
pub const IR_BYPASS: u32 = 0x1F;

/// Width, in bits, of the `dtmcs` DR.
pub const DTMCS_WIDTH: u32 = 32;

bitfield! {
    /// The `dtmcs` register, read/written through `IR_DTMCS`.
    #[derive(Copy, Clone)]
    pub struct Dtmcs(u32);
    impl Debug;
    pub _, set_dmihardreset: 17;
    pub _, set_dmireset: 16;
    pub idle, _: 14, 12;
    pub dmistat, _: 11, 10;
    pub abits, _: 9, 4;
    pub version, _: 3, 0;
}

impl From<u32> for Dtmcs {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Dtmcs> for u32 {
    fn from(register: Dtmcs) -> Self {
        register.0
    }
}

/// Offset of the `address` field within a DMI scan payload, counted in bits
/// above the 2-bit `op` field (i.e. the width of `[data:32][op:2]`).
pub const DMI_ADDRESS_BIT_OFFSET: u32 = 34;
/// Mask isolating the 2-bit `op` field of a DMI scan response.
pub const DMI_OP_MASK: u128 = 0x3;

/// `op` field of a DMI scan request or response.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmiOp {
    /// No operation; used to read back a previously-requested value.
    Nop = 0,
    /// Read the register at `address`.
    Read = 1,
    /// Write `data` to the register at `address`.
    Write = 2,
}

/// Status reported in the `op` field of a DMI scan *response*.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmiStatus {
    /// The previous operation completed successfully.
    Success = 0,
    /// Reserved; must not occur.
    Reserved = 1,
    /// The previous operation failed. Fatal; the DMI must be reset.
    Failed = 2,
    /// The previous operation was still in progress ("busy"); replay it.
    Interrupted = 3,
}

impl DmiStatus {
    pub(crate) fn parse(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::Reserved,
            2 => Self::Failed,
            3 => Self::Interrupted,
            _ => unreachable!("op is a 2 bit field"),
        }
    }
}

bitfield! {
    /// `dmcontrol`, located at DMI address 0x10.
    #[derive(Copy, Clone)]
    pub struct Dmcontrol(u32);
    impl Debug;
    pub _, set_haltreq: 31;
    pub _, set_resumereq: 30;
    pub hartreset, set_hartreset: 29;
    pub _, set_ackhavereset: 28;
    pub hasel, set_hasel: 26;
    pub hartsello, set_hartsello: 25, 16;
    pub hartselhi, set_hartselhi: 15, 6;
    pub _, set_resethaltreq: 3;
    pub _, set_clrresethaltreq: 2;
    pub ndmreset, set_ndmreset: 1;
    pub dmactive, set_dmactive: 0;
}

impl Dmcontrol {
    /// The 20-bit `hartsel` value, combining `hartselhi`/`hartsello`.
    pub fn hartsel(&self) -> u32 {
        self.hartselhi() << 10 | self.hartsello()
    }

    /// Sets `hartsel`, splitting it across `hartselhi`/`hartsello`. Values
    /// above 20 bits are truncated.
    pub fn set_hartsel(&mut self, value: u32) {
        self.set_hartsello(value & 0x3ff);
        self.set_hartselhi((value >> 10) & 0x3ff);
    }
}

impl From<u32> for Dmcontrol {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Dmcontrol> for u32 {
    fn from(register: Dmcontrol) -> Self {
        register.0
    }
}
dm_register!(Dmcontrol, 0x10, "dmcontrol");

bitfield! {
    /// Read-only `dmstatus`, located at DMI address 0x11.
    #[derive(Copy, Clone)]
    pub struct Dmstatus(u32);
    impl Debug;
    pub impebreak, _: 22;
    pub allhavereset, _: 19;
    pub anyhavereset, _: 18;
    pub allresumeack, _: 17;
    pub anyresumeack, _: 16;
    pub allnonexistent, _: 15;
    pub anynonexistent, _: 14;
    pub allunavail, _: 13;
    pub anyunavail, _: 12;
    pub allrunning, _: 11;
    pub anyrunning, _: 10;
    pub allhalted, _: 9;
    pub anyhalted, _: 8;
    pub authenticated, _: 7;
    pub authbusy, _: 6;
    pub hasresethaltreq, _: 5;
    pub confstrptrvalid, _: 4;
    pub version, _: 3, 0;
}

impl From<u32> for Dmstatus {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Dmstatus> for u32 {
    fn from(register: Dmstatus) -> Self {
        register.0
    }
}
dm_register!(Dmstatus, 0x11, "dmstatus");

bitfield! {
    /// `hartinfo`, located at DMI address 0x12.
    #[derive(Copy, Clone)]
    pub struct Hartinfo(u32);
    impl Debug;
    pub nscratch, _: 23, 20;
    pub dataaccess, _: 16;
    pub datasize, _: 15, 12;
    pub dataaddr, _: 11, 0;
}

impl From<u32> for Hartinfo {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Hartinfo> for u32 {
    fn from(register: Hartinfo) -> Self {
        register.0
    }
}
dm_register!(Hartinfo, 0x12, "hartinfo");

bitfield! {
    /// Abstract Control and Status, located at DMI address 0x16.
    #[derive(Copy, Clone)]
    pub struct Abstractcs(u32);
    impl Debug;
    pub progbufsize, _: 28, 24;
    pub busy, _: 12;
    pub cmderr, set_cmderr: 10, 8;
    pub datacount, _: 3, 0;
}

impl From<u32> for Abstractcs {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Abstractcs> for u32 {
    fn from(register: Abstractcs) -> Self {
        register.0
    }
}
dm_register!(Abstractcs, 0x16, "abstractcs");

bitfield! {
    /// Abstract Command register, located at DMI address 0x17. Holds an
    /// `access register` command as laid out in §4.3.
    #[derive(Copy, Clone)]
    pub struct AccessRegisterCommand(u32);
    impl Debug;
    pub cmdtype, set_cmdtype: 31, 24;
    pub aarsize, set_aarsize: 22, 20;
    pub aarpostincrement, set_aarpostincrement: 19;
    pub postexec, set_postexec: 18;
    pub transfer, set_transfer: 17;
    pub write, set_write: 16;
    pub regno, set_regno: 15, 0;
}

impl From<u32> for AccessRegisterCommand {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<AccessRegisterCommand> for u32 {
    fn from(register: AccessRegisterCommand) -> Self {
        register.0
    }
}
dm_register!(AccessRegisterCommand, 0x17, "command");

bitfield! {
    /// Abstract Command Autoexec, located at DMI address 0x18.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Abstractauto(u32);
    impl Debug;
    pub autoexecprogbuf, set_autoexecprogbuf: 31, 16;
    pub autoexecdata, set_autoexecdata: 11, 0;
}

impl From<u32> for Abstractauto {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Abstractauto> for u32 {
    fn from(register: Abstractauto) -> Self {
        register.0
    }
}
dm_register!(Abstractauto, 0x18, "abstractauto");

/// Pattern written to `abstractauto.autoexecdata` while probing for `autoexecdata` support (§4.5).
pub const AUTOEXEC_PROBE_PATTERN: u32 = 0b1010_1010_1010;

/// First abstract-data register (`data0`), base of the `abstractdata` window at 0x04..0x0F.
pub const DATA0_ADDRESS: u32 = 0x04;
/// Number of abstract-data registers addressable in the window.
pub const DATA_WINDOW_LEN: u32 = 12;

/// Base of the program-buffer window at 0x20..0x2F.
pub const PROGBUF0_ADDRESS: u32 = 0x20;
/// Number of program-buffer words addressable in the window.
pub const PROGBUF_WINDOW_LEN: u32 = 16;

/// Registers named in the DM register map (§6) that are outside this
/// crate's scope (System Bus Access, authentication). Addresses are kept
/// here for completeness of the map; no helper performs reads/writes of
/// them, matching the `Non-goals` in `SPEC_FULL.md` §1.
pub mod out_of_scope {
    pub const HALTSUM1: u32 = 0x13;
    pub const HAWINDOWSEL: u32 = 0x14;
    pub const HAWINDOW: u32 = 0x15;
    pub const CONFSTRPTR0: u32 = 0x19;
    pub const CONFSTRPTR1: u32 = 0x1A;
    pub const CONFSTRPTR2: u32 = 0x1B;
    pub const CONFSTRPTR3: u32 = 0x1C;
    pub const NEXTDM: u32 = 0x1D;
    pub const AUTHDATA: u32 = 0x30;
    pub const HALTSUM2: u32 = 0x34;
    pub const HALTSUM3: u32 = 0x35;
    pub const SBCS: u32 = 0x38;
    pub const SBADDRESS0: u32 = 0x39;
    pub const SBADDRESS1: u32 = 0x3A;
    pub const SBADDRESS2: u32 = 0x3B;
    pub const SBADDRESS3: u32 = 0x37;
    pub const SBDATA0: u32 = 0x3C;
    pub const SBDATA1: u32 = 0x3D;
    pub const SBDATA2: u32 = 0x3E;
    pub const SBDATA3: u32 = 0x3F;
    pub const HALTSUM0: u32 = 0x40;
}

/// Register numbering for `access register` commands (§4.3).
///
/// CSRs occupy 0x0000..=0x0FFF, GPRs occupy 0x1000..=0x101F (x0..x31).
pub mod regno {
    /// `misa` CSR.
    pub const MISA: u16 = 0x0301;
    /// `mhartid` CSR.
    pub const MHARTID: u16 = 0x0F14;
    /// Highest valid CSR address (12-bit CSR address space, Zicsr).
    pub const MAX_CSR: u16 = 0x0FFF;
    /// Base `regno` of the GPR window; add the GPR index (0..=31).
    pub const GPR_BASE: u16 = 0x1000;

    /// `regno` for GPR `x{index}`.
    pub const fn gpr(index: u8) -> u16 {
        GPR_BASE + index as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtmcs_bitfield_matches_wire_layout() {
        // §8 scenario 1: dtmcs = 0x0000_7111 -> version 1, abits 0x11, dmistat 0, idle 7
        let dtmcs = Dtmcs(0x0000_7111);
        assert_eq!(dtmcs.version(), 1);
        assert_eq!(dtmcs.abits(), 0x11);
        assert_eq!(dtmcs.dmistat(), 0);
        assert_eq!(dtmcs.idle(), 7);
    }

    #[test]
    fn dmcontrol_hartsel_round_trips_across_20_bits() {
        let mut dmcontrol = Dmcontrol(0);
        dmcontrol.set_hartsel(0xABCDE);
        assert_eq!(dmcontrol.hartsel(), 0xABCDE);
    }

    #[test]
    fn dmi_status_parses_all_four_op_codes() {
        assert_eq!(DmiStatus::parse(0), DmiStatus::Success);
        assert_eq!(DmiStatus::parse(1), DmiStatus::Reserved);
        assert_eq!(DmiStatus::parse(2), DmiStatus::Failed);
        assert_eq!(DmiStatus::parse(3), DmiStatus::Interrupted);
    }

    #[test]
    fn access_register_command_packs_fields_into_spec_bit_positions() {
        let mut cmd = AccessRegisterCommand(0);
        cmd.set_transfer(true);
        cmd.set_write(true);
        cmd.set_aarsize(2);
        cmd.set_regno(regno::MHARTID as u32);
        let word: u32 = cmd.into();
        assert_eq!(word & 0x0001_0000, 0x0001_0000, "write bit");
        assert_eq!(word & 0x0002_0000, 0x0002_0000, "transfer bit");
        assert_eq!((word >> 20) & 0x7, 2, "aarsize");
        assert_eq!(word & 0xFFFF, regno::MHARTID as u32, "regno");
    }
}
