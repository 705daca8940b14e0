// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel table and allocator.

use tock_registers::interfaces::{Readable, Writeable};

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::regs::{Regs, HCINTMSK};

/// DATA PID programmed into `HCTSIZ.DPID`. `MdataOrSetup` covers both the
/// Control Setup stage and isochronous MDATA: the hardware field is the
/// same two bits either way.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PacketId {
    Data0 = 0,
    Data2 = 1,
    Data1 = 2,
    MdataOrSetup = 3,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ChannelState {
    Free,
    Working,
}

/// One hardware channel's bookkeeping. Exactly one of these exists per
/// channel index, for the lifetime of the controller instance.
#[derive(Copy, Clone)]
pub struct ChannelRecord {
    pub state: ChannelState,
    pub packet: Packet,
    /// Bytes transferred so far: for IN, bytes written into the caller's
    /// buffer; for OUT, only meaningful as the final XFRC transfer count.
    pub data_index: u16,
    /// Reserved for escalating repeated TXERR on a channel; incremented
    /// nowhere yet.
    pub error_count: u8,
}

impl ChannelRecord {
    #[cfg(test)]
    pub(crate) fn new_for_test() -> Self {
        Self::new()
    }

    const fn new() -> Self {
        // Placeholder packet; overwritten by `acquire` callers before use.
        Self {
            state: ChannelState::Free,
            packet: Packet {
                data: core::ptr::null_mut(),
                datalen: 0,
                device_address: 0,
                endpoint_number: 0,
                endpoint_max_packet: 0,
                endpoint_type: crate::packet::EndpointType::Control,
                control_phase: crate::packet::ControlPhase::Setup,
                speed: crate::packet::Speed::Full,
                toggle: core::ptr::null_mut(),
                callback: |_, _| {},
                callback_arg: core::ptr::null_mut(),
            },
            data_index: 0,
            error_count: 0,
        }
    }
}

/// Fixed-size channel table, one per controller instance. `N` is 8 for a
/// Full-Speed instance and 12 for High-Speed.
pub struct ChannelTable<const N: usize> {
    pub channels: [ChannelRecord; N],
}

impl<const N: usize> ChannelTable<N> {
    pub const fn new() -> Self {
        Self {
            channels: [ChannelRecord::new(); N],
        }
    }

    /// Scans channels in index order for the first whose allocation state
    /// is Free *and* whose hardware enable bit is clear, and claims it.
    /// Unmasks the channel's interrupts, clears stale flags, and sets the
    /// controller's aggregate channel-interrupt mask bit. Returns
    /// `Err(Error::ChannelExhausted)` if every channel is busy.
    pub fn acquire(&mut self, regs: Regs) -> Result<u8> {
        for i in 0..N {
            let ch = i as u8;
            if self.channels[i].state == ChannelState::Free && !regs.hcchar(ch).is_set(crate::regs::HCCHAR::CHENA) {
                self.channels[i].state = ChannelState::Working;
                self.channels[i].error_count = 0;

                regs.hcint(ch).set(0xFFFF_FFFF);
                regs.hcintmsk(ch).write(
                    HCINTMSK::ACKM::SET
                        + HCINTMSK::NAKM::SET
                        + HCINTMSK::TXERRM::SET
                        + HCINTMSK::XFRCM::SET
                        + HCINTMSK::DTERRM::SET
                        + HCINTMSK::BBERRM::SET
                        + HCINTMSK::CHHM::SET
                        + HCINTMSK::STALLM::SET
                        + HCINTMSK::FRMORM::SET,
                );
                regs.haintmsk().modify(crate::regs::HAINTMSK::HAINTM.val(
                    regs.haintmsk().read(crate::regs::HAINTMSK::HAINTM) | (1 << ch),
                ));

                return Ok(ch);
            }
        }
        Err(Error::ChannelExhausted)
    }

    /// Disable-then-free sequence. If the channel's hardware enable bit is
    /// set, requests a disable and clears its interrupt flags, leaving the
    /// allocation state Working until the hardware later reports CHH (see
    /// [`crate::engine`]); otherwise frees it immediately. The packet and
    /// callback are deliberately left intact so the upper stack may
    /// resubmit on the same logical endpoint from within its callback.
    pub fn release(&mut self, regs: Regs, ch: u8) {
        if regs.hcchar(ch).is_set(crate::regs::HCCHAR::CHENA) {
            regs.hcchar(ch).modify(crate::regs::HCCHAR::CHDIS::SET);
            regs.hcint(ch).set(0xFFFF_FFFF);
        } else {
            self.channels[ch as usize].state = ChannelState::Free;
        }
    }

    /// Reinitializes every channel: clears interrupt flags, masks all
    /// per-channel interrupt sources, disables the hardware if enabled,
    /// and marks the record Free. Called on controller bring-up and on
    /// every connect/disconnect transition.
    pub fn reset_all(&mut self, regs: Regs) {
        for i in 0..N {
            let ch = i as u8;
            regs.hcint(ch).set(0xFFFF_FFFF);
            regs.hcintmsk(ch).set(0);
            if regs.hcchar(ch).is_set(crate::regs::HCCHAR::CHENA) {
                regs.hcchar(ch).modify(crate::regs::HCCHAR::CHDIS::SET);
            }
            self.channels[i].state = ChannelState::Free;
        }
        regs.haintmsk().write(crate::regs::HAINTMSK::HAINTM.val((1u32 << N) - 1));
    }
}

impl<const N: usize> Default for ChannelTable<N> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::test_mmio::FakeMmio;
    use super::*;

    #[test]
    fn acquire_scans_in_index_order_and_skips_enabled_channels() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<4> = ChannelTable::new();

        // Channel 0 looks free in software but hardware enable is still set
        // (as if a previous release is still draining) -- must be skipped.
        regs.hcchar(0).modify(crate::regs::HCCHAR::CHENA::SET);

        let acquired = table.acquire(regs).unwrap();
        assert_eq!(acquired, 1);
        assert_eq!(table.channels[1].state, ChannelState::Working);
    }

    #[test]
    fn acquire_returns_channel_exhausted_when_all_channels_working() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<2> = ChannelTable::new();
        table.channels[0].state = ChannelState::Working;
        table.channels[1].state = ChannelState::Working;
        assert_eq!(table.acquire(regs), Err(Error::ChannelExhausted));
    }

    #[test]
    fn release_defers_free_until_hardware_disabled() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<2> = ChannelTable::new();
        table.channels[0].state = ChannelState::Working;
        regs.hcchar(0).modify(crate::regs::HCCHAR::CHENA::SET);

        table.release(regs, 0);
        // Hardware was enabled: state stays Working, disable was requested.
        assert_eq!(table.channels[0].state, ChannelState::Working);
        assert!(regs.hcchar(0).is_set(crate::regs::HCCHAR::CHDIS));
    }

    #[test]
    fn release_frees_immediately_when_hardware_already_disabled() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<2> = ChannelTable::new();
        table.channels[0].state = ChannelState::Working;

        table.release(regs, 0);
        assert_eq!(table.channels[0].state, ChannelState::Free);
    }
}
