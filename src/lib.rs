//! Host-side driver for the RISC-V External Debug Support specification (v0.13).
//!
//! This crate implements the layered stack a debug probe uses to talk to a
//! RISC-V Debug Module over JTAG: scan-chain access to the Debug Transport
//! Module (DTM), the Debug Module Interface (DMI) read/write protocol with
//! its `op=interrupted` retry handshake, Abstract Command submission, and
//! the Program Buffer trampoline used when the Abstract Command engine
//! cannot express an access directly (most CSR and memory accesses).
//!
//! The layers, leaves first:
//!
//! - [`tap`] — the scan-chain primitive the physical JTAG driver provides. Consumed, not implemented here.
//! - [`dtm`] — `dtmcs` access, `dmireset`/`dmihardreset`, version/abits/idle capture.
//! - [`dmi`] is implemented as methods on [`DebugTransport`] in this crate root; see [`DebugTransport::dmi_read`].
//! - [`abstract_cmd`] — Abstract Command submission, GPR/CSR access via `data0`.
//! - [`progbuf`] — program buffer upload/execute and the CSR/memory templates built on it.
//! - [`capability`] — capability negotiation and hart discovery.
//! - [`target`] — the public facade ([`DebugTargetHandle`]) and reference-counted ownership.
//!
//! With the `testing` feature enabled, [`mock`] provides an in-memory
//! Debug Module for exercising the stack without a physical JTAG adapter.

mod abstract_cmd;
mod assembly;
mod capability;
mod dmi;
mod dtm;
mod error;
mod hart;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
mod progbuf;
mod registers;
mod tap;
mod target;

pub use error::{AbstractCommandError, DebugError, UsageError, TransportError};
pub use hart::Hart;
pub use tap::{TapAccess, TapError};
pub use target::{DebugTargetHandle, DebugTransport};

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, DebugError>;

/// Version of the RISC-V debug transport (read from `dtmcs.version`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DtmVersion {
    /// Debug spec 0.11. Rejected by this crate.
    V0_11,
    /// Debug spec 0.13. The only version this crate supports.
    V0_13,
    /// `version` field read as 15 ("unknown"), or any other out-of-band value.
    Unknown(u8),
}

impl From<u8> for DtmVersion {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::V0_11,
            1 => Self::V0_13,
            other => Self::Unknown(other),
        }
    }
}

/// Version of the RISC-V Debug Module (read from `dmstatus.version`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmVersion {
    /// No debug module present.
    NoModule,
    /// Debug spec 0.11. Rejected by this crate.
    V0_11,
    /// Debug spec 0.13. The only version this crate supports.
    V0_13,
    /// Present, but non-conforming.
    NonConforming,
    /// Any other encoding.
    Unknown(u8),
}

impl From<u8> for DmVersion {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::NoModule,
            1 => Self::V0_11,
            2 => Self::V0_13,
            15 => Self::NonConforming,
            other => Self::Unknown(other),
        }
    }
}

/// Maximum number of harts this crate will discover on a single DMI.
pub const MAX_HARTS: usize = 8;

/// Default spin bound for busy-poll loops (abstract-command `busy`, DMI interrupted-retry).
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
