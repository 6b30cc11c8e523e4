//! L4: capability negotiation and hart discovery (§4.5, §4.6).
//!
//! Negotiation runs once, right after the DTM comes up: it validates the
//! debug module version, captures `abstractcs.datacount`/`progbufsize`,
//! probes whether `autoexecdata` is actually wired up (some implementations
//! advertise the feature bit but don't honor it), and then walks `hartsel`
//! looking for harts.

use crate::error::{DebugError, TransportError};
use crate::hart::Hart;
use crate::registers::{
    Abstractauto, Abstractcs, Dmcontrol, Dmstatus, Hartinfo, AUTOEXEC_PROBE_PATTERN,
};
use crate::target::DebugTransport;
use crate::tap::TapAccess;
use crate::{DmVersion, MAX_HARTS};

/// How a CSR is read or written once capabilities are known.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CsrStrategy {
    /// Directly through an Abstract Command (`regno` in the CSR window).
    Abstract,
    /// Through a Program Buffer trampoline (`csrrw`/`csrrs` + `ebreak`).
    ProgramBuffer,
}

/// How a memory word is read or written once capabilities are known.
///
/// System Bus Access is out of scope (§1 Non-goals), so memory access
/// always goes through the Program Buffer in this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum MemStrategy {
    /// Through a Program Buffer trampoline (`lw`/`sw` + `ebreak`).
    ProgramBuffer,
}

impl<T: TapAccess> DebugTransport<T> {
    /// Runs the bring-up sequence from §4.5: activates the debug module,
    /// validates its version, captures the Abstract Command/Program Buffer
    /// capabilities, and discovers harts.
    pub(crate) fn negotiate(&mut self) -> Result<(), DebugError> {
        self.activate_dm()?;
        self.capture_version()?;
        self.capture_abstract_capabilities()?;
        self.probe_autoexecdata()?;
        self.discover_harts()?;
        Ok(())
    }

    fn activate_dm(&mut self) -> Result<(), DebugError> {
        let mut dmcontrol = Dmcontrol::from(0);
        dmcontrol.set_dmactive(true);
        self.dmi_write(dmcontrol_address(), dmcontrol.into())?;
        Ok(())
    }

    fn capture_version(&mut self) -> Result<(), DebugError> {
        let raw = self.dmi_read(dmstatus_address())?;
        let dmstatus = Dmstatus::from(raw);
        let version = DmVersion::from(dmstatus.version() as u8);
        if version != DmVersion::V0_13 {
            return Err(TransportError::UnsupportedDmVersion(version).into());
        }
        if !dmstatus.authenticated() {
            return Err(TransportError::NotAuthenticated.into());
        }
        self.dm_version = version;
        self.impebreak = dmstatus.impebreak();
        Ok(())
    }

    fn capture_abstract_capabilities(&mut self) -> Result<(), DebugError> {
        let raw = self.dmi_read(abstractcs_address())?;
        let abstractcs = Abstractcs::from(raw);

        let abstract_data_count = abstractcs.datacount() as u8;
        if !(1..=12).contains(&abstract_data_count) {
            return Err(TransportError::InvalidAbstractDataCount(abstract_data_count).into());
        }

        let progbuf_size = abstractcs.progbufsize() as u8;
        if progbuf_size > 16 {
            return Err(TransportError::InvalidProgramBufferSize(progbuf_size).into());
        }
        if progbuf_size == 1 && !self.impebreak {
            return Err(TransportError::MissingImplicitEbreak.into());
        }

        self.abstract_data_count = abstract_data_count;
        self.progbuf_size = progbuf_size;
        Ok(())
    }

    /// Writes the probe pattern to `abstractauto.autoexecdata`, reads it
    /// back, and records whether the bits the hardware actually implements
    /// (masked by `abstract_data_count`) round-tripped. Some debug modules
    /// advertise support they don't honor; this is cheaper to detect now
    /// than to discover mid-batch later.
    fn probe_autoexecdata(&mut self) -> Result<(), DebugError> {
        let mask = (1u32 << self.abstract_data_count) - 1;
        let mut written = Abstractauto::from(0);
        written.set_autoexecdata(AUTOEXEC_PROBE_PATTERN & mask);
        self.dmi_write(abstractauto_address(), written.into())?;

        let read_back = Abstractauto::from(self.dmi_read(abstractauto_address())?);
        self.autoexecdata_supported = read_back.autoexecdata() == (AUTOEXEC_PROBE_PATTERN & mask);

        // Leave autoexec disabled; callers opt in per-batch.
        self.dmi_write(abstractauto_address(), 0)?;
        Ok(())
    }

    /// Walks `hartsel` from 0, stopping at the first index `dmstatus`
    /// reports as nonexistent. Index 0 is always probed even on debug
    /// modules that report it transiently unavailable during reset,
    /// since a single-hart target with a slow-to-settle `dmstatus` would
    /// otherwise discover zero harts.
    fn discover_harts(&mut self) -> Result<(), DebugError> {
        let mut harts = Vec::new();
        for index in 0..MAX_HARTS as u32 {
            self.select_hart_raw(index)?;
            let dmstatus = Dmstatus::from(self.dmi_read(dmstatus_address())?);
            if dmstatus.anynonexistent() && index != 0 {
                break;
            }
            let hartinfo = Hartinfo::from(self.dmi_read(hartinfo_address())?);
            harts.push(Hart::new(index, hartinfo.nscratch() as u8));
        }
        self.harts = harts;
        if !self.harts.is_empty() {
            self.select_hart_raw(0)?;
            self.current_hart = Some(0);
        }
        Ok(())
    }

    /// Selects `index` by writing `dmcontrol.hartsel`, without checking it
    /// against discovered harts (used during discovery itself).
    pub(crate) fn select_hart_raw(&mut self, index: u32) -> Result<(), DebugError> {
        let mut dmcontrol = Dmcontrol::from(0);
        dmcontrol.set_dmactive(true);
        dmcontrol.set_hartsel(index);
        self.dmi_write(dmcontrol_address(), dmcontrol.into())?;
        Ok(())
    }

    /// The strategy to attempt first for CSR access. Abstract access is
    /// always tried first; callers fall back to the Program Buffer on
    /// `cmderr == NotSupported` (§4.3), since there is no advance capability
    /// bit that predicts which CSRs an abstract command can reach.
    pub(crate) fn csr_strategy(&self, _csr: u16) -> CsrStrategy {
        CsrStrategy::Abstract
    }

    /// Memory access always goes through the Program Buffer (§1 Non-goals: no System Bus Access).
    pub(crate) fn mem_strategy(&self) -> MemStrategy {
        MemStrategy::ProgramBuffer
    }
}

fn dmcontrol_address() -> u32 {
    <Dmcontrol as crate::registers::DmRegister>::ADDRESS
}

fn dmstatus_address() -> u32 {
    <Dmstatus as crate::registers::DmRegister>::ADDRESS
}

fn abstractcs_address() -> u32 {
    <Abstractcs as crate::registers::DmRegister>::ADDRESS
}

fn abstractauto_address() -> u32 {
    <Abstractauto as crate::registers::DmRegister>::ADDRESS
}

fn hartinfo_address() -> u32 {
    <Hartinfo as crate::registers::DmRegister>::ADDRESS
}

#[cfg(test)]
mod tests {
    use crate::mock::MockTap;
    use crate::target::DebugTransport;
    use crate::{DebugError, TransportError};

    #[test]
    fn negotiate_rejects_an_unauthenticated_debug_module() {
        let mut tap = MockTap::new(1);
        tap.deauthenticate();
        let err = DebugTransport::new(tap).unwrap_err();
        assert!(matches!(
            err,
            DebugError::Transport(TransportError::NotAuthenticated)
        ));
    }
}
