//! L3: the Abstract Command engine (§4.3) — command submission, `busy`
//! polling, `cmderr` handling, and GPR/CSR access built on it.

use std::time::Instant;

use crate::error::{AbstractCommandError, DebugError, TransportError, UsageError};
use crate::registers::{regno, AccessRegisterCommand, Abstractcs, DmRegister, DATA0_ADDRESS};
use crate::target::DebugTransport;
use crate::tap::TapAccess;

/// `cmdtype` for an Access Register command (the only command type this crate issues).
const CMDTYPE_ACCESS_REGISTER: u32 = 0;

impl<T: TapAccess> DebugTransport<T> {
    /// Submits `command` to `abstractcs`'s paired command register and
    /// blocks until it is no longer `busy`, surfacing any `cmderr`.
    ///
    /// Per §4.3, `cmderr` is sticky: a nonzero value blocks all further
    /// abstract commands until explicitly cleared, so this always writes
    /// `cmderr = 0b111` (write-1-to-clear across the whole field) after
    /// observing a nonzero value.
    pub(crate) fn run_abstract_command(&mut self, command: u32) -> Result<(), DebugError> {
        self.dmi_write(AccessRegisterCommand::ADDRESS, command)?;
        self.wait_not_busy()
    }

    fn wait_not_busy(&mut self) -> Result<(), DebugError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let abstractcs = Abstractcs::from(self.dmi_read(Abstractcs::ADDRESS)?);
            if !abstractcs.busy() {
                let cmderr = abstractcs.cmderr() as u8;
                if cmderr == 0 {
                    return Ok(());
                }
                self.clear_cmderr()?;
                return match AbstractCommandError::parse(cmderr) {
                    Some(err) => Err(err.into()),
                    None => Err(TransportError::OperationFailed.into()),
                };
            }
            if Instant::now() > deadline {
                return Err(TransportError::Timeout.into());
            }
        }
    }

    fn clear_cmderr(&mut self) -> Result<(), DebugError> {
        let mut abstractcs = Abstractcs::from(0);
        abstractcs.set_cmderr(0b111);
        self.dmi_write(Abstractcs::ADDRESS, abstractcs.into())?;
        Ok(())
    }

    /// Reads GPR `x{index}` (0..=31) via an Abstract Command, `x0` always
    /// reading as zero without issuing any command.
    pub(crate) fn read_gpr_abstract(&mut self, index: u8) -> Result<u32, DebugError> {
        if index == 0 {
            return Ok(0);
        }
        self.access_register(regno::gpr(index), false)?;
        Ok(self.dmi_read(DATA0_ADDRESS)?)
    }

    /// Writes GPR `x{index}` (1..=31) via an Abstract Command. Writing `x0` is a no-op.
    pub(crate) fn write_gpr_abstract(&mut self, index: u8, value: u32) -> Result<(), DebugError> {
        if index == 0 {
            return Ok(());
        }
        self.dmi_write(DATA0_ADDRESS, value)?;
        self.access_register(regno::gpr(index), true)
    }

    /// Reads CSR `csr` via an Abstract Command.
    pub(crate) fn read_csr_abstract(&mut self, csr: u16) -> Result<u32, DebugError> {
        if csr > regno::MAX_CSR {
            return Err(UsageError::InvalidCsrAddress(csr).into());
        }
        self.access_register(csr, false)?;
        Ok(self.dmi_read(DATA0_ADDRESS)?)
    }

    /// Writes CSR `csr` via an Abstract Command.
    pub(crate) fn write_csr_abstract(&mut self, csr: u16, value: u32) -> Result<(), DebugError> {
        if csr > regno::MAX_CSR {
            return Err(UsageError::InvalidCsrAddress(csr).into());
        }
        self.dmi_write(DATA0_ADDRESS, value)?;
        self.access_register(csr, true)
    }

    fn access_register(&mut self, regno: u16, write: bool) -> Result<(), DebugError> {
        let mut command = AccessRegisterCommand::from(0);
        command.set_cmdtype(CMDTYPE_ACCESS_REGISTER);
        command.set_aarsize(0b010); // 32-bit access
        command.set_transfer(true);
        command.set_write(write);
        command.set_regno(regno as u32);
        self.run_abstract_command(command.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::tests::mock_transport;

    #[test]
    fn reading_x0_never_issues_a_command() {
        let mut transport = mock_transport();
        assert_eq!(transport.read_gpr_abstract(0).unwrap(), 0);
    }

    #[test]
    fn cmderr_is_cleared_after_being_observed() {
        let mut transport = mock_transport();
        transport.tap_mut().queue_cmderr(AbstractCommandError::NotSupported);
        let err = transport.read_csr_abstract(regno::MHARTID).unwrap_err();
        assert!(matches!(
            err,
            DebugError::AbstractCommand(AbstractCommandError::NotSupported)
        ));
        // abstractcs.cmderr was cleared, so the next command runs clean.
        assert!(transport.read_csr_abstract(regno::MHARTID).is_ok());
    }
}
