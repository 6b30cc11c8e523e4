//! L4: the Program Buffer trampoline (§4.4) — used for every CSR or memory
//! access an Abstract Command can't reach directly.
//!
//! Two scratch GPRs (`x8`, `x9`) carry operands in and results out; their
//! prior contents are backed up through an Abstract Command and restored
//! once the trampoline runs, so program-buffer use is invisible to the
//! caller's register file (the GPR-preservation invariant in §4.4).

use crate::assembly::{csrrs, csrrw, ebreak, lw, sw};
use crate::error::{DebugError, UsageError};
use crate::hart::GprBackup;
use crate::registers::PROGBUF0_ADDRESS;
use crate::tap::TapAccess;
use crate::target::DebugTransport;

/// Scratch GPR holding an address or the first operand.
const SCRATCH_A: u8 = 8;
/// Scratch GPR holding a value or the second operand.
const SCRATCH_B: u8 = 9;

impl<T: TapAccess> DebugTransport<T> {
    pub(crate) fn read_csr_progbuf(&mut self, csr: u16) -> Result<u32, DebugError> {
        let backup = self.backup_gprs(&[SCRATCH_A])?;
        self.upload_progbuf(&[csrrs(SCRATCH_A, csr, 0), ebreak()])?;
        self.exec_progbuf()?;
        let value = self.read_gpr_abstract(SCRATCH_A)?;
        self.restore_gprs(&[SCRATCH_A], &backup)?;
        Ok(value)
    }

    pub(crate) fn write_csr_progbuf(&mut self, csr: u16, value: u32) -> Result<(), DebugError> {
        let backup = self.backup_gprs(&[SCRATCH_A])?;
        self.write_gpr_abstract(SCRATCH_A, value)?;
        self.upload_progbuf(&[csrrw(0, csr, SCRATCH_A), ebreak()])?;
        self.exec_progbuf()?;
        self.restore_gprs(&[SCRATCH_A], &backup)?;
        Ok(())
    }

    pub(crate) fn read_mem32_progbuf(&mut self, address: u32) -> Result<u32, DebugError> {
        let backup = self.backup_gprs(&[SCRATCH_A, SCRATCH_B])?;
        self.write_gpr_abstract(SCRATCH_A, address)?;
        self.upload_progbuf(&[lw(SCRATCH_B, SCRATCH_A, 0), ebreak()])?;
        self.exec_progbuf()?;
        let value = self.read_gpr_abstract(SCRATCH_B)?;
        self.restore_gprs(&[SCRATCH_A, SCRATCH_B], &backup)?;
        Ok(value)
    }

    pub(crate) fn write_mem32_progbuf(&mut self, address: u32, value: u32) -> Result<(), DebugError> {
        let backup = self.backup_gprs(&[SCRATCH_A, SCRATCH_B])?;
        self.write_gpr_abstract(SCRATCH_A, address)?;
        self.write_gpr_abstract(SCRATCH_B, value)?;
        self.upload_progbuf(&[sw(SCRATCH_A, SCRATCH_B, 0), ebreak()])?;
        self.exec_progbuf()?;
        self.restore_gprs(&[SCRATCH_A, SCRATCH_B], &backup)?;
        Ok(())
    }

    /// Writes `words` to `progbuf0..`. Per §11, a 1-word buffer with
    /// `impebreak` set never needs its trailing `ebreak` uploaded — the
    /// hardware appends it implicitly, so a trailing `ebreak` is trimmed to
    /// make that single word fit.
    fn upload_progbuf(&mut self, words: &[u32]) -> Result<(), DebugError> {
        let mut program = words.to_vec();
        if self.progbuf_size == 1 && self.impebreak && program.last() == Some(&ebreak()) {
            program.pop();
        }
        if program.len() > self.progbuf_size as usize {
            return Err(
                UsageError::ProgramBufferTooLarge(program.len(), self.progbuf_size as usize).into(),
            );
        }
        for (offset, word) in program.iter().enumerate() {
            self.dmi_write(PROGBUF0_ADDRESS + offset as u32, *word)?;
        }
        Ok(())
    }

    /// Triggers execution of the uploaded program buffer: an Access
    /// Register command with `transfer=0`, `postexec=1` (§4.3).
    fn exec_progbuf(&mut self) -> Result<(), DebugError> {
        let mut command = crate::registers::AccessRegisterCommand::from(0);
        command.set_aarsize(0b010);
        command.set_postexec(true);
        self.run_abstract_command(command.into())
    }

    fn backup_gprs(&mut self, indices: &[u8]) -> Result<GprBackup, DebugError> {
        let mut backup = GprBackup::new();
        for &index in indices {
            let value = self.read_gpr_abstract(index)?;
            backup
                .push(value)
                .map_err(UsageError::BackupTooLarge)?;
        }
        Ok(backup)
    }

    fn restore_gprs(&mut self, indices: &[u8], backup: &GprBackup) -> Result<(), DebugError> {
        for (&index, &value) in indices.iter().zip(backup.iter()) {
            self.write_gpr_abstract(index, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::tests::mock_transport;

    #[test]
    fn mem_round_trip_preserves_scratch_gprs() {
        let mut transport = mock_transport();
        transport.write_gpr_abstract(8, 0x1111_1111).unwrap();
        transport.write_gpr_abstract(9, 0x2222_2222).unwrap();

        transport.write_mem32(0x8000_0000, 0xDEAD_BEEF).unwrap();
        let read_back = transport.read_mem32(0x8000_0000).unwrap();

        assert_eq!(read_back, 0xDEAD_BEEF);
        assert_eq!(transport.read_gpr_abstract(8).unwrap(), 0x1111_1111);
        assert_eq!(transport.read_gpr_abstract(9).unwrap(), 0x2222_2222);
    }

    #[test]
    fn program_longer_than_progbuf_is_rejected() {
        let mut transport = mock_transport();
        let program = vec![0u32; 64];
        let err = transport.upload_progbuf(&program).unwrap_err();
        assert!(matches!(
            err,
            DebugError::Usage(UsageError::ProgramBufferTooLarge(_, _))
        ));
    }
}
