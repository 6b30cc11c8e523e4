//! A hand-rolled [`TapAccess`] implementation that emulates just enough of
//! a Debug Module (`dmcontrol`/`dmstatus`/`abstractcs`/`data0..`/`progbuf0..`)
//! to exercise the engine end to end, without a physical JTAG adapter.
//!
//! Gated behind the `testing` feature so it can be reused from both the
//! inline `#[cfg(test)]` modules and the `tests/` integration suite,
//! without shipping it in ordinary builds of this crate.

use std::collections::HashMap;

use crate::error::AbstractCommandError;
use crate::registers::{
    regno, AccessRegisterCommand, Abstractauto, Abstractcs, DmRegister, Dmcontrol, Dmstatus,
    Dtmcs, Hartinfo, DATA0_ADDRESS, DATA_WINDOW_LEN, IR_DMI, IR_DTMCS, PROGBUF0_ADDRESS,
    PROGBUF_WINDOW_LEN,
};
use crate::tap::{TapAccess, TapError};

const ABITS: u32 = 7;

/// One discovered hart, as far as the mock is concerned: just enough state
/// to answer `dmstatus`/`hartinfo` truthfully for the currently selected index.
#[derive(Clone, Copy)]
pub struct MockHart {
    pub nscratch: u32,
}

/// An in-memory Debug Module, addressable the same way real `dmi` scans are.
pub struct MockTap {
    dtmcs: Dtmcs,
    registers: HashMap<u32, u32>,
    harts: Vec<MockHart>,
    selected_hart: u32,
    pending: Option<(u32, u32)>, // (data, status) captured by the *next* scan
    queued_cmderr: Option<AbstractCommandError>,
    idle_cycles: u8,
    stall_remaining: u32,
    deferred: Option<(bool, u32, u32)>, // (is_write, address, data)
    progbuf_size: u32,
    gprs: [u32; 32],
    csrs: HashMap<u16, u32>,
    memory: HashMap<u32, u32>,
}

impl MockTap {
    /// A mock presenting `hart_count` harts, all with `nscratch = 0`, a
    /// 2-word `abstractcs.datacount`, and an 8-word program buffer.
    pub fn new(hart_count: u32) -> Self {
        Self::with_capabilities(hart_count, 2, 8)
    }

    /// A mock with explicit `abstract_data_count`/`progbuf_size`.
    pub fn with_capabilities(hart_count: u32, abstract_data_count: u32, progbuf_size: u32) -> Self {
        let mut registers = HashMap::new();

        let mut abstractcs_raw: u32 = 0;
        abstractcs_raw |= abstract_data_count & 0xF; // datacount, bits 3:0
        abstractcs_raw |= (progbuf_size & 0x1F) << 24;
        registers.insert(Abstractcs::ADDRESS, abstractcs_raw);

        let mut dmstatus_raw: u32 = 0;
        dmstatus_raw |= 2; // version = 0.13
        dmstatus_raw |= 1 << 22; // impebreak
        dmstatus_raw |= 1 << 7; // authenticated
        registers.insert(Dmstatus::ADDRESS, dmstatus_raw);

        registers.insert(Dmcontrol::ADDRESS, 0);
        registers.insert(Hartinfo::ADDRESS, 0);
        registers.insert(Abstractauto::ADDRESS, 0);

        let harts = (0..hart_count).map(|_| MockHart { nscratch: 0 }).collect();

        Self {
            dtmcs: Dtmcs::from(1 | (ABITS << 4)),
            registers,
            harts,
            selected_hart: 0,
            pending: None,
            queued_cmderr: None,
            idle_cycles: 0,
            stall_remaining: 0,
            deferred: None,
            progbuf_size,
            gprs: [0; 32],
            csrs: HashMap::new(),
            memory: HashMap::new(),
        }
    }

    /// Forces the next `dmi` operation to report `op=interrupted` `retries`
    /// times before completing, exercising the retry handshake in
    /// `crate::dmi`.
    pub fn stall_next_dmi(&mut self, retries: u32) {
        self.stall_remaining = retries;
    }

    /// Forces the next abstract command this mock processes to report `cmderr`.
    pub fn queue_cmderr(&mut self, err: AbstractCommandError) {
        self.queued_cmderr = Some(err);
    }

    /// Clears `dmstatus.authenticated`, simulating a debug module that
    /// requires authentication this crate does not implement.
    pub fn deauthenticate(&mut self) {
        let raw = self.registers.entry(Dmstatus::ADDRESS).or_insert(0);
        *raw &= !(1 << 7);
    }

    fn read_word(&self, address: u32) -> u32 {
        if (DATA0_ADDRESS..DATA0_ADDRESS + DATA_WINDOW_LEN).contains(&address)
            || (PROGBUF0_ADDRESS..PROGBUF0_ADDRESS + PROGBUF_WINDOW_LEN).contains(&address)
        {
            return *self.registers.get(&address).unwrap_or(&0);
        }
        match address {
            addr if addr == Dmstatus::ADDRESS => {
                let mut raw = *self.registers.get(&addr).unwrap_or(&0);
                let nonexistent = self.selected_hart as usize >= self.harts.len();
                if nonexistent {
                    raw |= 1 << 14; // anynonexistent
                    raw |= 1 << 15; // allnonexistent
                } else {
                    raw &= !(1 << 14);
                    raw &= !(1 << 15);
                }
                raw
            }
            addr if addr == Hartinfo::ADDRESS => {
                let nscratch = self
                    .harts
                    .get(self.selected_hart as usize)
                    .map(|h| h.nscratch)
                    .unwrap_or(0);
                nscratch << 20
            }
            other => *self.registers.get(&other).unwrap_or(&0),
        }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        if address == Dmcontrol::ADDRESS {
            let dmcontrol = Dmcontrol::from(value);
            self.selected_hart = dmcontrol.hartsel();
        }
        if address == AccessRegisterCommand::ADDRESS {
            self.run_abstract_command(value);
            return;
        }
        self.registers.insert(address, value);
    }

    fn run_abstract_command(&mut self, command: u32) {
        let mut abstractcs = Abstractcs::from(*self.registers.get(&Abstractcs::ADDRESS).unwrap_or(&0));
        if let Some(err) = self.queued_cmderr.take() {
            let code = match err {
                AbstractCommandError::NotSupported => 2,
                AbstractCommandError::Exception => 3,
                AbstractCommandError::HaltResume => 4,
                AbstractCommandError::Bus => 5,
                AbstractCommandError::Other => 7,
            };
            abstractcs.set_cmderr(code);
            self.registers.insert(Abstractcs::ADDRESS, abstractcs.into());
            return;
        }

        let access = AccessRegisterCommand::from(command);
        if access.transfer() {
            let register = access.regno() as u16;
            if access.write() {
                let value = *self.registers.get(&DATA0_ADDRESS).unwrap_or(&0);
                self.write_sim_register(register, value);
            } else {
                let value = self.read_sim_register(register);
                self.registers.insert(DATA0_ADDRESS, value);
            }
        }
        if access.postexec() {
            self.execute_progbuf();
        }

        abstractcs.set_cmderr(0);
        self.registers.insert(Abstractcs::ADDRESS, abstractcs.into());
    }

    fn read_sim_register(&self, register: u16) -> u32 {
        if register >= regno::GPR_BASE {
            let index = (register - regno::GPR_BASE) as usize;
            return *self.gprs.get(index).unwrap_or(&0);
        }
        *self.csrs.get(&register).unwrap_or(&0)
    }

    fn write_sim_register(&mut self, register: u16, value: u32) {
        if register >= regno::GPR_BASE {
            let index = (register - regno::GPR_BASE) as usize;
            if index != 0 {
                if let Some(slot) = self.gprs.get_mut(index) {
                    *slot = value;
                }
            }
            return;
        }
        self.csrs.insert(register, value);
    }

    /// Interprets the uploaded program buffer (`addi`/`csrrw`/`csrrs`/`lw`/`sw`/`ebreak`)
    /// against the simulated GPR/CSR/memory state, stopping at `ebreak` or
    /// the end of the negotiated buffer (whichever comes first).
    fn execute_progbuf(&mut self) {
        for offset in 0..self.progbuf_size {
            let word = *self
                .registers
                .get(&(PROGBUF0_ADDRESS + offset))
                .unwrap_or(&0);
            if word == crate::assembly::ebreak() {
                break;
            }
            self.execute_instruction(word);
        }
    }

    fn execute_instruction(&mut self, word: u32) {
        let opcode = word & 0x7F;
        let rd = ((word >> 7) & 0x1F) as usize;
        let funct3 = (word >> 12) & 0x7;
        let rs1 = ((word >> 15) & 0x1F) as usize;
        let imm_i = sign_extend_12((word >> 20) & 0xFFF);

        match opcode {
            0b0010011 if funct3 == 0b000 => {
                // addi
                let value = (self.gpr(rs1) as i32).wrapping_add(imm_i) as u32;
                self.set_gpr(rd, value);
            }
            0b0000011 if funct3 == 0b010 => {
                // lw
                let address = (self.gpr(rs1) as i32).wrapping_add(imm_i) as u32;
                let value = *self.memory.get(&address).unwrap_or(&0);
                self.set_gpr(rd, value);
            }
            0b0100011 if funct3 == 0b010 => {
                // sw
                let rs2 = ((word >> 20) & 0x1F) as usize;
                let imm_lo = (word >> 7) & 0x1F;
                let imm_hi = (word >> 25) & 0x7F;
                let imm = sign_extend_12(imm_lo | (imm_hi << 5));
                let address = (self.gpr(rs1) as i32).wrapping_add(imm) as u32;
                self.memory.insert(address, self.gpr(rs2));
            }
            0b1110011 if funct3 == 0b001 => {
                // csrrw
                let csr = ((word >> 20) & 0xFFF) as u16;
                let old = self.read_sim_register(csr);
                self.csrs.insert(csr, self.gpr(rs1));
                self.set_gpr(rd, old);
            }
            0b1110011 if funct3 == 0b010 => {
                // csrrs
                let csr = ((word >> 20) & 0xFFF) as u16;
                let old = self.read_sim_register(csr);
                if rs1 != 0 {
                    self.csrs.insert(csr, old | self.gpr(rs1));
                }
                self.set_gpr(rd, old);
            }
            _ => {}
        }
    }

    fn gpr(&self, index: usize) -> u32 {
        if index == 0 {
            0
        } else {
            self.gprs[index]
        }
    }

    fn set_gpr(&mut self, index: usize, value: u32) {
        if index != 0 {
            self.gprs[index] = value;
        }
    }
}

fn sign_extend_12(value: u32) -> i32 {
    ((value << 20) as i32) >> 20
}

impl TapAccess for MockTap {
    fn write_register(&mut self, address: u32, data: &[u8], len: u32) -> Result<Vec<u8>, TapError> {
        if address == IR_DTMCS {
            if !data.is_empty() {
                let word = u32::from_le_bytes(pad4(data));
                let incoming = Dtmcs::from(word);
                if incoming.dmihardreset() {
                    self.pending = None;
                    self.deferred = None;
                    self.stall_remaining = 0;
                }
            }
            let word: u32 = self.dtmcs.into();
            return Ok(word.to_le_bytes().to_vec());
        }

        if address == IR_DMI {
            let byte_len = (len as usize).div_ceil(8);
            let mut payload: u128 = 0;
            for (index, byte) in data.iter().enumerate() {
                payload |= (*byte as u128) << (8 * index);
            }
            let op = (payload & 0x3) as u8;
            let scan_data = ((payload >> 2) & 0xFFFF_FFFF) as u32;
            let scan_address = (payload >> 34) as u32;

            let (prev_data, prev_status) = self.pending.take().unwrap_or((0, 0));

            match op {
                1 | 2 if self.stall_remaining > 0 => {
                    self.deferred = Some((op == 2, scan_address, scan_data));
                    self.stall_remaining -= 1;
                    self.pending = Some((0, 3)); // interrupted
                }
                1 => {
                    let value = self.read_word(scan_address);
                    self.pending = Some((value, 0));
                }
                2 => {
                    self.write_word(scan_address, scan_data);
                    self.pending = Some((0, 0));
                }
                _ if self.deferred.is_some() => {
                    if self.stall_remaining > 0 {
                        self.stall_remaining -= 1;
                        self.pending = Some((0, 3));
                    } else {
                        let (is_write, address, data) = self.deferred.take().unwrap();
                        let value = if is_write {
                            self.write_word(address, data);
                            0
                        } else {
                            self.read_word(address)
                        };
                        self.pending = Some((value, 0));
                    }
                }
                _ => {
                    self.pending = Some((prev_data, prev_status));
                }
            }

            let response: u128 = ((prev_data as u128) << 2) | prev_status as u128;
            let mut bytes = vec![0u8; byte_len];
            for (index, byte) in bytes.iter_mut().enumerate() {
                *byte = ((response >> (8 * index)) & 0xFF) as u8;
            }
            return Ok(bytes);
        }

        Err(TapError::UnsupportedWidth(len))
    }

    fn set_idle_cycles(&mut self, idle_cycles: u8) {
        self.idle_cycles = idle_cycles;
    }

    fn idle_cycles(&self) -> u8 {
        self.idle_cycles
    }

    fn target_reset_assert(&mut self) -> Result<(), TapError> {
        Ok(())
    }

    fn target_reset_deassert(&mut self) -> Result<(), TapError> {
        Ok(())
    }
}

fn pad4(bytes: &[u8]) -> [u8; 4] {
    let mut buf = [0u8; 4];
    let len = bytes.len().min(4);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}
