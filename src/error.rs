//! Error taxonomy for the debug engine (see `SPEC_FULL.md` §7).
//!
//! Three leaf error types mirror the taxonomy directly, unified by one
//! top-level [`DebugError`] with `#[from]` conversions — the same shape
//! the teacher uses for `RiscvError`/`DebugProbeError`.

use crate::tap::TapError;
use crate::{DmVersion, DtmVersion};

/// A TAP/DMI-level fault. Fatal for the current session: the handle stays
/// alive, but every further operation will fail until the caller re-inits.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The DMI reported `op=failed` (2), a fatal status per the spec.
    #[error("DMI operation reported op=failed")]
    OperationFailed,
    /// `dmstatus.authenticated` was clear; the debug module requires authentication this crate does not implement.
    #[error("debug module is not authenticated")]
    NotAuthenticated,
    /// `dtmcs.version` named a transport version other than 0.13.
    #[error("debug transport module version {0:?} is not supported, only 0.13 is")]
    UnsupportedDtmVersion(DtmVersion),
    /// `dmstatus.version` named a debug module version other than 0.13.
    #[error("debug module version {0:?} is not supported, only 0.13 is")]
    UnsupportedDmVersion(DmVersion),
    /// `abstractcs.datacount` was outside the 1..12 range the spec requires.
    #[error("abstract_data_count {0} is outside the required 1..12 range")]
    InvalidAbstractDataCount(u8),
    /// `abstractcs.progbufsize` was outside the 0..16 range the spec requires.
    #[error("progbuf_size {0} is outside the required 0..16 range")]
    InvalidProgramBufferSize(u8),
    /// `progbuf_size == 1` but `dmstatus.impebreak` was clear.
    #[error("progbuf_size is 1 but impebreak is not set, which the spec requires")]
    MissingImplicitEbreak,
    /// A busy-poll loop (abstract command, interrupted-DMI retry) exceeded its configured bound.
    #[error("operation timed out")]
    Timeout,
    /// The scan-chain adapter itself reported a fault.
    #[error(transparent)]
    Tap(#[from] TapError),
}

/// Positive `cmderr` codes surfaced from the Abstract Command engine.
///
/// Recoverable at the session level: the engine always clears `cmderr`
/// before returning one of these, so the next command can run normally.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AbstractCommandError {
    /// `cmderr == 2`: the requested command is not supported by this debug module.
    #[error("command is not supported by this debug module")]
    NotSupported,
    /// `cmderr == 3`: an exception occurred executing the command (e.g. in the program buffer).
    #[error("an exception occurred while executing the command")]
    Exception,
    /// `cmderr == 4`: the hart was not in the halt/resume state the command required.
    #[error("the hart was not in the required halt/resume state")]
    HaltResume,
    /// `cmderr == 5`: a bus error occurred.
    #[error("a bus error occurred while executing the command")]
    Bus,
    /// `cmderr == 7`: the command failed for an unspecified reason.
    #[error("command failed for an unspecified reason")]
    Other,
}

impl AbstractCommandError {
    /// Parses the 3-bit `cmderr` field. `0` (none) and `1` (busy, retried
    /// internally by the caller) are not represented here.
    pub(crate) fn parse(cmderr: u8) -> Option<Self> {
        match cmderr {
            2 => Some(Self::NotSupported),
            3 => Some(Self::Exception),
            4 => Some(Self::HaltResume),
            5 => Some(Self::Bus),
            7 => Some(Self::Other),
            _ => None,
        }
    }
}

/// Caller-visible precondition violations — bad arguments, not hardware faults.
#[derive(thiserror::Error, Debug)]
pub enum UsageError {
    /// The program would not fit in the negotiated program buffer.
    #[error("program of {0} words does not fit the {1}-word program buffer")]
    ProgramBufferTooLarge(usize, usize),
    /// `max(in_len, out_len)` exceeded the 31 scratch GPRs (x1..x31) available.
    #[error("backup length {0} exceeds the 31 available scratch GPRs")]
    BackupTooLarge(usize),
    /// `set_debug_version` was asked for anything but 0.13.
    #[error("debug spec version {0:?} is not supported, only 0.13 is")]
    UnsupportedDebugVersion(DmVersion),
    /// `select_hart` was given an index with no matching discovered hart.
    #[error("hart index {0} was not discovered on this DMI")]
    UnknownHart(u32),
    /// A CSR address exceeded the 12-bit CSR address space (`RISCV_MAX_CSR_ADDR`).
    #[error("csr address {0:#x} exceeds the 12-bit CSR address space")]
    InvalidCsrAddress(u16),
}

/// Top-level error returned by every public operation on [`crate::DebugTransport`].
#[derive(thiserror::Error, Debug)]
pub enum DebugError {
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// See [`AbstractCommandError`].
    #[error("abstract command error: {0}")]
    AbstractCommand(AbstractCommandError),
    /// See [`UsageError`].
    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl From<AbstractCommandError> for DebugError {
    fn from(err: AbstractCommandError) -> Self {
        Self::AbstractCommand(err)
    }
}
