// SPDX-License-Identifier: GPL-3.0-or-later

//! Receive FIFO drain and transmit FIFO fill.

use tock_registers::interfaces::{Readable, Writeable};

use crate::channel::{ChannelRecord, ChannelTable};
use crate::packet::EndpointType;
use crate::regs::{Regs, GRXSTSP, HCCHAR};

#[inline]
pub(crate) fn div_round_up(v: u32, denom: u32) -> u32 {
    (v + denom - 1) / denom
}

/// Result of popping one RX status word, for the caller to act on.
pub enum RxEvent {
    /// `len` bytes of IN data were copied into the channel's buffer.
    DataReceived { channel: u8, len: u16 },
    /// No FIFO action required (IN-complete, toggle error, channel halted).
    Other { channel: u8 },
}

/// Pops one entry from the shared RX status FIFO and, for an IN-data
/// entry, drains the corresponding number of bytes out of the owning
/// channel's buffer (`record.packet.data[record.data_index..]`), padding
/// the final partial word with a byte-wise copy. Advances `data_index`. If
/// more data is still expected and the chunk just received was a full max
/// packet, re-enables the channel to request the next transaction.
///
/// Must be called once per RXFLVL interrupt observation; the hardware
/// requires the status word to be popped regardless of whether any FIFO
/// bytes need draining. The channel named by the popped status word is
/// resolved against `table` here, since the caller has no way to know
/// which channel it is before popping.
pub fn drain_one<const N: usize>(regs: Regs, table: &mut ChannelTable<N>) -> RxEvent {
    let rxstsp = regs.grxstsp();
    let status = rxstsp.extract();
    let channel = status.read(GRXSTSP::CHNUM) as u8;
    let len = status.read(GRXSTSP::BCNT) as u16;

    if channel as usize >= N {
        return RxEvent::Other { channel };
    }
    let record = &mut table.channels[channel as usize];

    match status.read_as_enum(GRXSTSP::PKTSTS) {
        Some(GRXSTSP::PKTSTS::Value::InDataRx) => {
            if len > 0 {
                read_from_fifo(regs, channel, record, len);

                if record.data_index < record.packet.datalen
                    && len == record.packet.endpoint_max_packet
                {
                    regs.hcchar(channel).modify(HCCHAR::CHENA::SET);
                }
            }
            RxEvent::DataReceived { channel, len }
        }
        _ => RxEvent::Other { channel },
    }
}

fn read_from_fifo(regs: Regs, channel: u8, record: &mut ChannelRecord, len: u16) {
    // Safety: the caller guarantees `record.packet.data` has at least
    // `datalen` bytes and `data_index + len <= datalen` (the hardware is
    // programmed to request a multiple of max-packet-size bytes, so this
    // holds barring a misbehaving device).
    let dst = unsafe { record.packet.data.add(record.data_index as usize) };
    let fifo = regs.fifo(channel);

    let full_words = (len / 4) as usize;
    for i in 0..full_words {
        let word = fifo.get();
        unsafe {
            core::ptr::write_unaligned(dst.add(i * 4) as *mut u32, word);
        }
    }

    let remainder = (len % 4) as usize;
    if remainder > 0 {
        let word = fifo.get();
        let bytes = word.to_le_bytes();
        for i in 0..remainder {
            unsafe {
                *dst.add(full_words * 4 + i) = bytes[i];
            }
        }
    }

    record.data_index += len;
}

/// Pushes `datalen` bytes from the packet buffer into the channel's
/// transmit FIFO window, 32 bits at a time. The trailing word, if
/// `datalen` isn't a multiple of 4, is zero-padded in the high bytes
/// rather than read past the end of the buffer.
///
/// There is one FIFO push register per channel regardless of endpoint
/// type: the hardware routes a channel's writes into its non-periodic or
/// periodic TX FIFO based on the `EPTYP` already programmed into that
/// channel's `HCCHAR` (by `configure_channel`, before `fill` runs), not on
/// the address software writes to.
pub fn fill(regs: Regs, channel: u8, data: *const u8, datalen: u16) {
    let fifo = regs.fifo(channel);

    let words = div_round_up(datalen as u32, 4) as usize;
    for i in 0..words {
        let mut word = 0u32;
        for b in 0..4 {
            let idx = i * 4 + b;
            if idx < datalen as usize {
                let byte = unsafe { *data.add(idx) };
                word |= (byte as u32) << (b * 8);
            }
        }
        fifo.set(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_mmio::FakeMmio;
    use crate::channel::ChannelTable;
    use crate::packet::{ControlPhase, Packet, Speed};

    fn blank_packet(data: *mut u8, datalen: u16, max: u16) -> Packet {
        Packet {
            data,
            datalen,
            device_address: 1,
            endpoint_number: 1,
            endpoint_max_packet: max,
            endpoint_type: EndpointType::Bulk,
            control_phase: ControlPhase::Data,
            speed: Speed::Full,
            toggle: core::ptr::null_mut(),
            callback: |_, _| {},
            callback_arg: core::ptr::null_mut(),
        }
    }

    // The fake FIFO window is a single memory cell, not a real queue: each
    // `set` overwrites the one before it. These tests stick to payloads
    // that only ever need a single FIFO word per pop/push so the fake
    // stays faithful to what `drain_one`/`fill` actually do with it.

    #[test]
    fn drain_copies_a_single_full_word() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<4> = ChannelTable::new();

        regs.grxstsp().write(
            GRXSTSP::CHNUM.val(2) + GRXSTSP::BCNT.val(4) + GRXSTSP::PKTSTS::InDataRx,
        );
        regs.fifo(2).set(0x44332211);

        let mut buf = [0u8; 8];
        table.channels[2].packet = blank_packet(buf.as_mut_ptr(), 4, 64);

        let ev = drain_one(regs, &mut table);
        match ev {
            RxEvent::DataReceived { channel, len } => {
                assert_eq!(channel, 2);
                assert_eq!(len, 4);
            }
            _ => panic!("expected DataReceived"),
        }
        assert_eq!(&buf[0..4], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(table.channels[2].data_index, 4);
    }

    #[test]
    fn drain_copies_a_trailing_partial_word() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<1> = ChannelTable::new();

        regs.grxstsp().write(
            GRXSTSP::CHNUM.val(0) + GRXSTSP::BCNT.val(3) + GRXSTSP::PKTSTS::InDataRx,
        );
        regs.fifo(0).set(0x00_33_22_11);

        let mut buf = [0u8; 4];
        table.channels[0].packet = blank_packet(buf.as_mut_ptr(), 3, 64);

        drain_one(regs, &mut table);
        assert_eq!(&buf[0..3], &[0x11, 0x22, 0x33]);
        assert_eq!(table.channels[0].data_index, 3);
    }

    #[test]
    fn drain_re_enables_channel_when_more_data_expected() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<1> = ChannelTable::new();

        regs.grxstsp().write(
            GRXSTSP::CHNUM.val(0) + GRXSTSP::BCNT.val(4) + GRXSTSP::PKTSTS::InDataRx,
        );
        regs.fifo(0).set(0);

        let mut buf = [0u8; 8];
        table.channels[0].packet = blank_packet(buf.as_mut_ptr(), 8, 4);

        drain_one(regs, &mut table);
        assert!(regs.hcchar(0).is_set(crate::regs::HCCHAR::CHENA));
    }

    #[test]
    fn drain_does_not_re_enable_on_final_short_packet() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let mut table: ChannelTable<1> = ChannelTable::new();

        regs.grxstsp().write(
            GRXSTSP::CHNUM.val(0) + GRXSTSP::BCNT.val(3) + GRXSTSP::PKTSTS::InDataRx,
        );
        regs.fifo(0).set(0x00_33_22_11);

        let mut buf = [0u8; 8];
        table.channels[0].packet = blank_packet(buf.as_mut_ptr(), 8, 64);

        drain_one(regs, &mut table);
        assert!(!regs.hcchar(0).is_set(crate::regs::HCCHAR::CHENA));
    }

    #[test]
    fn fill_pushes_rounded_up_word_count() {
        let mut mmio = FakeMmio::new();
        let regs = mmio.regs();
        let data = [1u8, 2, 3, 4, 5];
        fill(regs, 0, data.as_ptr(), 5);
        // ceil(5/4) == 2 words pushed; the fake cell holds only the last
        // one written, which carries byte index 4 in its low byte.
        assert_eq!(regs.fifo(0).get(), 0x0000_0005);
    }
}
