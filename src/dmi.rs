//! L2: the `dmi` read/write protocol (§3.2) — pipelined scans with the
//! `op=interrupted` retry handshake, layered on [`crate::dtm::Dtm`].

use std::time::Instant;

use tracing::error;

use crate::error::TransportError;
use crate::registers::DmiStatus;
use crate::target::DebugTransport;
use crate::tap::TapAccess;

/// `op` value for a `nop` scan (§3.2): replays the previous scan's result
/// without starting a new operation.
const OP_NOP: u8 = 0;
/// `op` value for a `read` scan.
const OP_READ: u8 = 1;
/// `op` value for a `write` scan.
const OP_WRITE: u8 = 2;

impl<T: TapAccess> DebugTransport<T> {
    /// Reads the `dmi` register at `address`, retrying while the DTM
    /// reports `op=interrupted` (busy), up to `self.timeout`.
    ///
    /// Per §3.2, a `dmi` scan's response data belongs to the *previous*
    /// scan. A read therefore requires two scans: one that starts the
    /// read, and a follow-up `nop` that captures its result. On
    /// `op=interrupted` the caller must re-issue a `nop` (not a fresh
    /// `read`) until the result comes back, then retry from the top.
    pub fn dmi_read(&mut self, address: u32) -> Result<u32, TransportError> {
        self.dmi_exchange(address, 0, OP_READ)
    }

    /// Writes `data` to the `dmi` register at `address`, applying the same
    /// interrupted-retry handshake as [`Self::dmi_read`].
    pub fn dmi_write(&mut self, address: u32, data: u32) -> Result<(), TransportError> {
        self.dmi_exchange(address, data, OP_WRITE)?;
        Ok(())
    }

    /// Core pipelined exchange: issue `op` at `address`/`data`, then a
    /// trailing `nop` to collect the result, retrying the whole pair while
    /// the DTM is busy.
    ///
    /// On `op=interrupted` this follows §4.2's retry protocol exactly: a
    /// soft `dmireset` (which drops the in-flight access), then a replay of
    /// `last_dmi` — the payload most recently *accepted* with no-error — to
    /// re-drive the pipeline, one more idle cycle to give the target extra
    /// settling time, and then the original operation is retried from the
    /// top of the loop. `last_dmi` is only updated on success, and holds
    /// exactly the bits shifted in (§8/§9), not the value read back.
    fn dmi_exchange(&mut self, address: u32, data: u32, op: u8) -> Result<u32, TransportError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            self.dtm.dmi_scan(address, data, op)?;
            let result = self.dtm.dmi_scan(0, 0, OP_NOP)?;

            match result.status {
                DmiStatus::Success => {
                    self.last_dmi = Some((address, data, op));
                    return Ok(result.data);
                }
                DmiStatus::Failed => {
                    error!(last_dmi = ?self.last_dmi, "dmi op=failed, DM needs a reset");
                    return Err(TransportError::OperationFailed);
                }
                DmiStatus::Reserved => return Err(TransportError::OperationFailed),
                DmiStatus::Interrupted => {
                    if Instant::now() > deadline {
                        return Err(TransportError::Timeout);
                    }
                    self.dtm.dmi_reset()?;
                    self.dtm.bump_idle_cycles();
                    if let Some((last_address, last_data, last_op)) = self.last_dmi {
                        self.dtm.dmi_scan(last_address, last_data, last_op)?;
                    }
                    continue;
                }
            }
        }
    }
}
