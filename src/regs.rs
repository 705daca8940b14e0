// SPDX-License-Identifier: GPL-3.0-or-later

//! Typed accessors over the OTG host-controller register block.
//!
//! Layout follows the vendor reference manual: a global register bank at
//! offset 0, a host-mode bank at [`HOST_BASE`], a per-channel bank array
//! starting at [`CHANNEL_BASE`] with [`CHANNEL_STRIDE`] bytes between
//! channels, and per-channel FIFO data windows starting at [`FIFO_BASE`]
//! with [`FIFO_STRIDE`] bytes between channels. Every accessor here takes
//! the controller's base address explicitly rather than closing over a
//! global, so a caller can point it at a test double instead of real MMIO
//! (see the `tests` module in `channel.rs` and `engine.rs`).
//!
//! All reads and writes go through `tock_registers`, which wraps
//! `read_volatile`/`write_volatile` and forbids reordering them with
//! respect to program order.

use tock_registers::registers::ReadWrite;
use tock_registers::register_bitfields;

register_bitfields![u32,
    pub GAHBCFG [
        GINT OFFSET(0) NUMBITS(1) [],
    ],
    pub GUSBCFG [
        PHYSEL OFFSET(6) NUMBITS(1) [],
        FHMOD OFFSET(29) NUMBITS(1) [],
    ],
    pub GRSTCTL [
        CSRST OFFSET(0) NUMBITS(1) [],
        RXFFLSH OFFSET(4) NUMBITS(1) [],
        TXFFLSH OFFSET(5) NUMBITS(1) [],
        TXFNUM OFFSET(6) NUMBITS(5) [
            All = 0x10
        ],
        AHBIDL OFFSET(31) NUMBITS(1) [],
    ],
    pub GINTSTS [
        CMOD OFFSET(0) NUMBITS(1) [],
        MMIS OFFSET(1) NUMBITS(1) [],
        SOF OFFSET(3) NUMBITS(1) [],
        RXFLVL OFFSET(4) NUMBITS(1) [],
        IPXFR OFFSET(21) NUMBITS(1) [],
        HPRTINT OFFSET(24) NUMBITS(1) [],
        HCINT OFFSET(25) NUMBITS(1) [],
        DISCINT OFFSET(29) NUMBITS(1) [],
    ],
    pub GINTMSK [
        MMISM OFFSET(1) NUMBITS(1) [],
        RXFLVLM OFFSET(4) NUMBITS(1) [],
        IPXFRM OFFSET(21) NUMBITS(1) [],
        PRTIM OFFSET(24) NUMBITS(1) [],
        HCIM OFFSET(25) NUMBITS(1) [],
        DISCINTM OFFSET(29) NUMBITS(1) [],
    ],
    pub GOTGINT [
        HNGDET OFFSET(17) NUMBITS(1) [],
    ],
    pub GRXSTSP [
        CHNUM OFFSET(0) NUMBITS(4) [],
        BCNT OFFSET(4) NUMBITS(11) [],
        DPID OFFSET(15) NUMBITS(2) [],
        PKTSTS OFFSET(17) NUMBITS(4) [
            InDataRx = 2,
            InComplete = 3,
            DataToggleError = 5,
            ChannelHalted = 7
        ],
    ],
    pub GRXFSIZ [
        RXFD OFFSET(0) NUMBITS(16) [],
    ],
    pub HNPTXFSIZ [
        NPTXFSTADDR OFFSET(0) NUMBITS(16) [],
        NPTXFINEPS OFFSET(16) NUMBITS(16) [],
    ],
    pub HPTXFSIZ [
        PTXSA OFFSET(0) NUMBITS(16) [],
        PTXFD OFFSET(16) NUMBITS(16) [],
    ],
    pub GNPTXSTS [
        NPTXFSAV OFFSET(0) NUMBITS(16) [],
    ],
    pub GCCFG [
        PWRDWN OFFSET(16) NUMBITS(1) [],
    ],
    pub HCFG [
        FSLSPCS OFFSET(0) NUMBITS(2) [
            Hs30Or60Mhz = 0,
            Fs48Mhz = 1,
            Ls6Mhz = 2
        ],
        FSLSS OFFSET(2) NUMBITS(1) [],
    ],
    pub HFIR [
        FRIVL OFFSET(0) NUMBITS(16) [],
    ],
    pub HAINT [
        HAINT OFFSET(0) NUMBITS(16) [],
    ],
    pub HAINTMSK [
        HAINTM OFFSET(0) NUMBITS(16) [],
    ],
    pub HPRT [
        PCSTS OFFSET(0) NUMBITS(1) [],
        PCDET OFFSET(1) NUMBITS(1) [],
        PENA OFFSET(2) NUMBITS(1) [],
        PENCHNG OFFSET(3) NUMBITS(1) [],
        POCA OFFSET(4) NUMBITS(1) [],
        POCCHNG OFFSET(5) NUMBITS(1) [],
        PRST OFFSET(8) NUMBITS(1) [],
        PPWR OFFSET(12) NUMBITS(1) [],
        PSPD OFFSET(17) NUMBITS(2) [
            High = 0,
            Full = 1,
            Low = 2
        ],
    ],
    pub HCCHAR [
        MPSIZ OFFSET(0) NUMBITS(11) [],
        EPNUM OFFSET(11) NUMBITS(4) [],
        EPDIR OFFSET(15) NUMBITS(1) [],
        LSDEV OFFSET(17) NUMBITS(1) [],
        EPTYP OFFSET(18) NUMBITS(2) [
            Control = 0,
            Isoc = 1,
            Bulk = 2,
            Intr = 3
        ],
        MCNT OFFSET(20) NUMBITS(2) [],
        DAD OFFSET(22) NUMBITS(7) [],
        ODDFRM OFFSET(29) NUMBITS(1) [],
        CHDIS OFFSET(30) NUMBITS(1) [],
        CHENA OFFSET(31) NUMBITS(1) [],
    ],
    pub HCINT [
        XFRC OFFSET(0) NUMBITS(1) [],
        CHH OFFSET(1) NUMBITS(1) [],
        STALL OFFSET(3) NUMBITS(1) [],
        NAK OFFSET(4) NUMBITS(1) [],
        ACK OFFSET(5) NUMBITS(1) [],
        TXERR OFFSET(7) NUMBITS(1) [],
        BBERR OFFSET(8) NUMBITS(1) [],
        FRMOR OFFSET(9) NUMBITS(1) [],
        DTERR OFFSET(10) NUMBITS(1) [],
    ],
    pub HCINTMSK [
        XFRCM OFFSET(0) NUMBITS(1) [],
        CHHM OFFSET(1) NUMBITS(1) [],
        STALLM OFFSET(3) NUMBITS(1) [],
        NAKM OFFSET(4) NUMBITS(1) [],
        ACKM OFFSET(5) NUMBITS(1) [],
        TXERRM OFFSET(7) NUMBITS(1) [],
        BBERRM OFFSET(8) NUMBITS(1) [],
        FRMORM OFFSET(9) NUMBITS(1) [],
        DTERRM OFFSET(10) NUMBITS(1) [],
    ],
    pub HCTSIZ [
        XFRSIZ OFFSET(0) NUMBITS(19) [],
        PKTCNT OFFSET(19) NUMBITS(10) [],
        DPID OFFSET(29) NUMBITS(2) [
            Data0 = 0,
            Data2 = 1,
            Data1 = 2,
            // MDATA for isochronous, SETUP for control.
            MdataOrSetup = 3
        ],
    ],
    pub PCGCCTL [
        STPPCLK OFFSET(0) NUMBITS(1) [],
    ],
];

/// Offset, from the controller base, of the host-mode register bank.
pub const HOST_BASE: usize = 0x400;
/// Offset, from the controller base, of channel 0's register bank.
pub const CHANNEL_BASE: usize = 0x500;
/// Byte stride between successive channels' register banks.
pub const CHANNEL_STRIDE: usize = 0x20;
/// Offset, from the controller base, of channel 0's FIFO data window.
pub const FIFO_BASE: usize = 0x1000;
/// Byte stride between successive channels' FIFO windows.
pub const FIFO_STRIDE: usize = 0x1000;

const GOTGCTL: usize = 0x000;
const GOTGINT: usize = 0x004;
const GAHBCFG: usize = 0x008;
const GUSBCFG: usize = 0x00C;
const GRSTCTL: usize = 0x010;
const GINTSTS: usize = 0x014;
const GINTMSK: usize = 0x018;
const GRXSTSP: usize = 0x020;
const GRXFSIZ: usize = 0x024;
const HNPTXFSIZ: usize = 0x028;
const GNPTXSTS: usize = 0x02C;
const GCCFG: usize = 0x038;
const HPTXFSIZ: usize = 0x100;

const HCFG: usize = HOST_BASE;
const HFIR: usize = HOST_BASE + 0x04;
const HAINT: usize = HOST_BASE + 0x14;
const HAINTMSK: usize = HOST_BASE + 0x18;
const HPRT: usize = HOST_BASE + 0x40;
const PCGCCTL: usize = 0xE00;

const HCCHAR: usize = 0x00;
const HCINT: usize = 0x08;
const HCINTMSK: usize = 0x0C;
const HCTSIZ: usize = 0x10;

#[inline(always)]
unsafe fn reg<R: tock_registers::RegisterLongName>(addr: usize) -> &'static ReadWrite<u32, R> {
    &*(addr as *const ReadWrite<u32, R>)
}

/// A view over one controller instance's register block, rooted at `base`.
///
/// `base` is the only state this type carries; every method recomputes the
/// target address from it. Constructing one is unsafe because nothing
/// guarantees `base` points at real (or test-double) OTG registers.
#[derive(Clone, Copy)]
pub struct Regs {
    base: usize,
}

impl Regs {
    /// # Safety
    /// `base` must remain valid for the lifetime of all use of the
    /// returned `Regs`, and no other live `Regs` may alias channel or FIFO
    /// state mutably in a way that breaks the single-owner assumptions of
    /// [`crate::channel`]'s allocator.
    #[inline]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    pub fn gotgctl(&self) -> &'static ReadWrite<u32> {
        unsafe { &*((self.base + GOTGCTL) as *const ReadWrite<u32>) }
    }
    #[inline]
    pub fn gotgint(&self) -> &'static ReadWrite<u32, GOTGINT::Register> {
        unsafe { reg(self.base + GOTGINT) }
    }
    #[inline]
    pub fn gahbcfg(&self) -> &'static ReadWrite<u32, GAHBCFG::Register> {
        unsafe { reg(self.base + GAHBCFG) }
    }
    #[inline]
    pub fn gusbcfg(&self) -> &'static ReadWrite<u32, GUSBCFG::Register> {
        unsafe { reg(self.base + GUSBCFG) }
    }
    #[inline]
    pub fn grstctl(&self) -> &'static ReadWrite<u32, GRSTCTL::Register> {
        unsafe { reg(self.base + GRSTCTL) }
    }
    #[inline]
    pub fn gintsts(&self) -> &'static ReadWrite<u32, GINTSTS::Register> {
        unsafe { reg(self.base + GINTSTS) }
    }
    #[inline]
    pub fn gintmsk(&self) -> &'static ReadWrite<u32, GINTMSK::Register> {
        unsafe { reg(self.base + GINTMSK) }
    }
    #[inline]
    pub fn grxstsp(&self) -> &'static ReadWrite<u32, GRXSTSP::Register> {
        unsafe { reg(self.base + GRXSTSP) }
    }
    #[inline]
    pub fn grxfsiz(&self) -> &'static ReadWrite<u32, GRXFSIZ::Register> {
        unsafe { reg(self.base + GRXFSIZ) }
    }
    #[inline]
    pub fn hnptxfsiz(&self) -> &'static ReadWrite<u32, HNPTXFSIZ::Register> {
        unsafe { reg(self.base + HNPTXFSIZ) }
    }
    #[inline]
    pub fn gnptxsts(&self) -> &'static ReadWrite<u32, GNPTXSTS::Register> {
        unsafe { reg(self.base + GNPTXSTS) }
    }
    #[inline]
    pub fn gccfg(&self) -> &'static ReadWrite<u32, GCCFG::Register> {
        unsafe { reg(self.base + GCCFG) }
    }
    #[inline]
    pub fn hptxfsiz(&self) -> &'static ReadWrite<u32, HPTXFSIZ::Register> {
        unsafe { reg(self.base + HPTXFSIZ) }
    }
    #[inline]
    pub fn hcfg(&self) -> &'static ReadWrite<u32, HCFG::Register> {
        unsafe { reg(self.base + HCFG) }
    }
    #[inline]
    pub fn hfir(&self) -> &'static ReadWrite<u32, HFIR::Register> {
        unsafe { reg(self.base + HFIR) }
    }
    #[inline]
    pub fn haint(&self) -> &'static ReadWrite<u32, HAINT::Register> {
        unsafe { reg(self.base + HAINT) }
    }
    #[inline]
    pub fn haintmsk(&self) -> &'static ReadWrite<u32, HAINTMSK::Register> {
        unsafe { reg(self.base + HAINTMSK) }
    }
    #[inline]
    pub fn hprt(&self) -> &'static ReadWrite<u32, HPRT::Register> {
        unsafe { reg(self.base + HPRT) }
    }
    #[inline]
    pub fn pcgcctl(&self) -> &'static ReadWrite<u32, PCGCCTL::Register> {
        unsafe { reg(self.base + PCGCCTL) }
    }

    #[inline]
    fn channel_base(&self, ch: u8) -> usize {
        self.base + CHANNEL_BASE + ch as usize * CHANNEL_STRIDE
    }

    #[inline]
    pub fn hcchar(&self, ch: u8) -> &'static ReadWrite<u32, HCCHAR::Register> {
        unsafe { reg(self.channel_base(ch) + HCCHAR) }
    }
    #[inline]
    pub fn hcint(&self, ch: u8) -> &'static ReadWrite<u32, HCINT::Register> {
        unsafe { reg(self.channel_base(ch) + HCINT) }
    }
    #[inline]
    pub fn hcintmsk(&self, ch: u8) -> &'static ReadWrite<u32, HCINTMSK::Register> {
        unsafe { reg(self.channel_base(ch) + HCINTMSK) }
    }
    #[inline]
    pub fn hctsiz(&self, ch: u8) -> &'static ReadWrite<u32, HCTSIZ::Register> {
        unsafe { reg(self.channel_base(ch) + HCTSIZ) }
    }

    /// Raw FIFO data window for `ch`. Reads pop a word from the shared RX
    /// FIFO (valid only for the channel named by the last `GRXSTSP` pop);
    /// writes push a word into whichever TX FIFO the channel is wired to.
    #[inline]
    pub fn fifo(&self, ch: u8) -> &'static ReadWrite<u32> {
        unsafe { &*((self.base + FIFO_BASE + ch as usize * FIFO_STRIDE) as *const ReadWrite<u32>) }
    }
}
