/*
    pic.rs
    Implement the 8259 PIC (Programmable Interrupt Controller)

*/

use crate::bus::IoDevice;

pub const PIC_COMMAND_PORT: u16 = 0x20;
pub const PIC_DATA_PORT: u16    = 0x21;

const ICW1_SINGLE_MODE: u8      = 0b0000_0010; // Bit is set if PIC is operating in single mode (only supported configuration)
const ICW1_IS_ICW1: u8          = 0b0001_0000; // Bit determines if input is ICW1

const OCW2_NONSPECIFIC_EOI: u8  = 0b0010_0000;
const OCW3_MASK: u8             = 0b1001_1000;
const OCW3_SIGNATURE: u8        = 0b0000_1000;
const OCW3_RR_COMMAND: u8       = 0b0000_0011;

// Slots 1-4 of the ICW array are live; slot 0 is never written.
const ICW_COUNT: usize = 5;

#[derive(Copy, Clone)]
pub enum ReadSelect {
    ISR,
    IRR
}

pub struct Pic {
    imr: u8,                 // Interrupt Mask Register
    isr: u8,                 // In-Service Register
    irr: u8,                 // Interrupt Request Register
    icw: [u8; ICW_COUNT],    // Initialization Command Words as programmed
    icw_step: usize,         // Next ICW slot expected on the data port (5 = sequence done)
    read_select: ReadSelect, // Register returned by a command port read
    keyboard_wait_ack: bool, // Keyboard raised IRQ1 and has not seen an EOI yet
    makeup_ticks: u32,       // Timer ticks owed to the guest while IRQ0 was in service
}

impl IoDevice for Pic {
    fn read_u8(&mut self, port: u16) -> u8 {
        match port {
            PIC_COMMAND_PORT => {
                self.handle_command_register_read()
            },
            PIC_DATA_PORT => {
                self.handle_data_register_read()
            },
            _ => unreachable!("PIC: Bad port #")
        }
    }
    fn write_u8(&mut self, port: u16, data: u8) {
        match port {
            PIC_COMMAND_PORT => {
                self.handle_command_register_write(data);
            },
            PIC_DATA_PORT => {
                self.handle_data_register_write(data);
            },
            _ => unreachable!("PIC: Bad port #")
        }
    }

    fn port_list(&self) -> Vec<u16> {
        vec![PIC_COMMAND_PORT, PIC_DATA_PORT]
    }
}

impl Pic {
    pub fn new() -> Self {
        Self {
            imr: 0,
            isr: 0,
            irr: 0,
            icw: [0; ICW_COUNT],
            icw_step: ICW_COUNT,
            read_select: ReadSelect::IRR,
            keyboard_wait_ack: false,
            makeup_ticks: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Pic::new();
    }

    pub fn handle_command_register_write(&mut self, byte: u8) {
        if byte & ICW1_IS_ICW1 != 0 {
            // Begin initialization sequence: IMR is cleared and ICW2 is expected next
            log::debug!("PIC: Read ICW1: {:02X}", byte);
            self.imr = 0;
            self.icw[1] = byte;
            self.icw_step = 2;
            return;
        }
        if (byte & OCW3_MASK) == OCW3_SIGNATURE {
            // OCW3: select the register returned by command port reads
            match byte & OCW3_RR_COMMAND {
                0b10 => self.read_select = ReadSelect::IRR,
                0b11 => self.read_select = ReadSelect::ISR,
                _ => {}
            }
        }
        if byte & OCW2_NONSPECIFIC_EOI != 0 {
            self.eoi();
        }
    }

    /// Perform a non-specific EOI: retire the highest-priority (lowest-numbered)
    /// bit in the ISR. Retiring IRQ0 while timer ticks are owed immediately
    /// re-raises IRQ0 and drains one owed tick, so a slow guest still observes
    /// every timer interrupt.
    pub fn eoi(&mut self) {
        self.keyboard_wait_ack = false;
        for i in 0..8 {
            let bit = 0x01 << i;
            if self.isr & bit != 0 {
                self.isr &= !bit;
                if i == 0 && self.makeup_ticks > 0 {
                    self.makeup_ticks -= 1;
                    self.irr |= 0x01;
                }
                return;
            }
        }
    }

    pub fn handle_data_register_write(&mut self, byte: u8) {
        if self.icw_step == 3 && (self.icw[1] & ICW1_SINGLE_MODE != 0) {
            // Single mode: no slaves, so ICW3 is skipped
            self.icw_step = 4;
        }
        if self.icw_step < ICW_COUNT {
            log::debug!("PIC: Read ICW{}: {:02X}", self.icw_step, byte);
            self.icw[self.icw_step] = byte;
            self.icw_step += 1;
            return;
        }
        // Out of the initialization sequence this is just a new IMR value
        log::trace!("PIC: Set IMR to: {:02X}", byte);
        self.imr = byte;
    }

    pub fn handle_command_register_read(&mut self) -> u8 {
        match self.read_select {
            ReadSelect::ISR => self.isr,
            ReadSelect::IRR => self.irr,
        }
    }

    pub fn handle_data_register_read(&mut self) -> u8 {
        self.imr
    }

    /// Called by a device to request interrupt service. Simulates the IR line
    /// going high.
    pub fn request_interrupt(&mut self, interrupt: u8) {
        if interrupt > 7 {
            log::error!("PIC: Received interrupt out of range: {}", interrupt);
            return;
        }
        self.irr |= 0x01 << interrupt;
        if interrupt == 1 {
            self.keyboard_wait_ack = true;
        }
    }

    /// Account for a timer tick the guest missed because IRQ0 was still in
    /// service; it will be replayed by the next EOI that retires IRQ0.
    pub fn add_makeup_tick(&mut self) {
        self.makeup_ticks += 1;
    }

    pub fn keyboard_waiting_ack(&self) -> bool {
        self.keyboard_wait_ack
    }

    /// Does any unmasked request await service? Cheap check for the emulation
    /// loop so it only commits to an interrupt acknowledge when one exists.
    pub fn query_interrupt_line(&self) -> bool {
        self.irr & !self.imr != 0
    }

    /// The PIC's response to an interrupt acknowledge: the highest-priority
    /// pending unmasked IRQ moves from the IRR to the ISR and its vector
    /// (ICW2 base + IRQ number) is returned. The emulation loop must only call
    /// this when the CPU's IF flag is set.
    pub fn next_interrupt(&mut self) -> Option<u8> {
        let pending = self.irr & !self.imr;
        for i in 0..8 {
            let bit = 0x01 << i;
            if pending & bit != 0 {
                self.irr &= !bit;
                self.isr |= bit;
                return Some(self.icw[2].wrapping_add(i));
            }
        }
        None
    }
}
