//! The TAP adapter contract (L0): the scan-chain primitive consumed, not
//! implemented, by this crate. A real implementation drives IR/DR shifts
//! and TMS sequencing against a physical JTAG probe; this crate only needs
//! the collapsed `write_register` shape the teacher's own `JTAGAccess`
//! trait exposes, plus the idle-cycle bookkeeping DMI relies on.

/// A scan-chain fault reported by the physical adapter.
#[derive(thiserror::Error, Debug)]
pub enum TapError {
    /// The adapter could not complete the requested scan (link error, probe unplugged, ...).
    #[error("JTAG scan failed: {0}")]
    ScanFailed(String),
    /// `nbits` did not fit the buffer the adapter was asked to shift.
    #[error("requested scan width {0} bits is not supported by this adapter")]
    UnsupportedWidth(u32),
}

/// Abstract scan-chain access to a single TAP device on the chain.
///
/// A `write_register` call is responsible for: switching the device's IR
/// to `address` if it is not already there, shifting `len` bits of `data`
/// through the DR, and then spending `idle_cycles()` cycles in
/// Run-Test/Idle before returning — exactly the contract the RISC-V DTM
/// layer needs from `IR_DTMCS`/`IR_DMI` access. A read is emulated, same as
/// the teacher does, by writing all-zero data and inspecting the captured
/// response.
pub trait TapAccess: Send {
    /// Write `len` bits of `data` to the DR of the register selected by `address`,
    /// switching the IR first if needed, and return the bits captured on the way out.
    fn write_register(&mut self, address: u32, data: &[u8], len: u32) -> Result<Vec<u8>, TapError>;

    /// Read `len` bits from the DR of the register selected by `address`.
    ///
    /// The default implementation emulates a read the way the teacher does:
    /// shifting all-zero data through the register and returning the capture.
    fn read_register(&mut self, address: u32, len: u32) -> Result<Vec<u8>, TapError> {
        let data = vec![0u8; (len as usize).div_ceil(8)];
        self.write_register(address, &data, len)
    }

    /// Configure the number of Run-Test/Idle cycles the adapter inserts after each scan.
    fn set_idle_cycles(&mut self, idle_cycles: u8);

    /// The currently configured idle-cycle count.
    fn idle_cycles(&self) -> u8;

    /// Assert the physical target reset line.
    fn target_reset_assert(&mut self) -> Result<(), TapError>;

    /// Deassert the physical target reset line.
    fn target_reset_deassert(&mut self) -> Result<(), TapError>;
}
