/*
    machine.rs
    The owning aggregate of the virtual computer, and the emulation loop.

    The machine holds the CPU and the bus (which in turn owns memory, the
    PIC, the video adapter and the disk service). run() executes a batch of
    instructions; between instructions it injects pending unmasked PIC
    interrupts when IF allows, services the trap flag, and advances the
    video timing model. The host presenter samples framebuffer bytes
    between batches; the only cross-thread input channels are IRQ raising
    and keyboard scancode submission.
*/

use crate::bus::BusInterface;
use crate::config::VideoType;
use crate::cpu::{Cpu, Flag};
use crate::disk::DiskError;
use crate::rom::{self, RomError};

// Rough device-time advance per executed instruction
const CYCLES_PER_INSTRUCTION: u32 = 4;
// Device time advanced while the CPU sits in HLT with nothing pending
const HALT_IDLE_CYCLES: u32 = 64;

const KEYBOARD_DATA_PORT: u16 = 0x60;
const KEYBOARD_IRQ: u8 = 1;

pub struct Machine {
    cpu: Cpu,
    bus: BusInterface,
    running: bool,
    hard_reset_pending: bool,
    error_str: Option<String>,
}

impl Machine {
    pub fn new(video_type: VideoType) -> Machine {
        Machine {
            cpu: Cpu::new(),
            bus: BusInterface::new(video_type),
            running: true,
            hard_reset_pending: false,
            error_str: None,
        }
    }

    pub fn bus(&self) -> &BusInterface {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BusInterface {
        &mut self.bus
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn get_error_str(&self) -> Option<&str> {
        self.error_str.as_deref()
    }

    // ---- host surface -----------------------------------------------------

    pub fn load_bios(&mut self, path: &str) -> Result<usize, RomError> {
        rom::load_bios(&mut self.bus, path)
    }

    pub fn load_rom(&mut self, path: &str, address: usize) -> Result<usize, RomError> {
        rom::load_rom(&mut self.bus, path, address)
    }

    pub fn insert_disk(&mut self, drive_num: u8, path: &str) -> Result<(), DiskError> {
        self.bus.disks_mut().insert(drive_num, path)
    }

    pub fn eject_disk(&mut self, drive_num: u8) {
        self.bus.disks_mut().eject(drive_num);
    }

    pub fn set_boot_drive(&mut self, drive_num: u8) {
        self.bus.disks_mut().set_boot_drive(drive_num);
    }

    /// Load the boot sector (or enter ROM BASIC) and point CS:IP at it.
    pub fn boot(&mut self) {
        let mut disks = self.bus.disks_take().expect("disk service checked out");
        disks.boot(&mut self.cpu, &mut self.bus);
        self.bus.disks_put(disks);
    }

    /// Submit a keyboard scancode: it becomes readable at port 0x60 and
    /// raises IRQ1. Key releases are scancodes with the high bit set.
    pub fn key_event(&mut self, scancode: u8) {
        self.bus.set_port_shadow(KEYBOARD_DATA_PORT, scancode);
        self.bus.pic_mut().request_interrupt(KEYBOARD_IRQ);
    }

    /// Request a hard reset; honored at the next batch boundary.
    pub fn request_reset(&mut self) {
        self.hard_reset_pending = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.clear_ram();
        self.bus.reset_devices();
        self.error_str = None;
        self.running = true;
    }

    // ---- emulation loop ---------------------------------------------------

    /// Execute up to `instructions` instructions. Returns the number
    /// actually executed; the count stops short on CPU error or when the
    /// CPU halts with no interrupt in sight.
    pub fn run(&mut self, instructions: u32) -> u64 {
        if self.hard_reset_pending {
            self.hard_reset_pending = false;
            self.reset();
        }

        let mut executed: u64 = 0;
        for _ in 0..instructions {
            if !self.running {
                break;
            }

            // Inject the highest-priority unmasked PIC request when the CPU
            // is accepting interrupts. This also lifts a HLT.
            if self.cpu.interrupts_enabled() && self.bus.pic_mut().query_interrupt_line() {
                if let Some(vector) = self.bus.pic_mut().next_interrupt() {
                    self.cpu.hardware_interrupt(&mut self.bus, vector);
                }
            }

            if self.cpu.halted() {
                // HLT: let device time pass until an interrupt arrives. If
                // interrupts are off this machine can only be revived from
                // outside, so yield the batch.
                self.bus.video_mut().run(HALT_IDLE_CYCLES);
                break;
            }

            match self.cpu.step(&mut self.bus) {
                Ok(()) => {
                    executed += 1;
                }
                Err(e) => {
                    log::error!("CPU error: {}", e);
                    self.error_str = Some(format!("{}", e));
                    self.running = false;
                    break;
                }
            }

            self.bus.video_mut().run(CYCLES_PER_INSTRUCTION);

            // Single-step trap fires after the instruction that set TF
            if self.cpu.get_flag(Flag::Trap) {
                self.cpu.do_interrupt(&mut self.bus, 1);
            }
        }

        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{Flag, Register8, Register16};

    /// Assemble a program into RAM at 0000:0100 and point CS:IP at it.
    fn machine_with_program(program: &[u8]) -> Machine {
        let mut machine = Machine::new(VideoType::VGA);
        machine.bus_mut().copy_from(program, 0x100, false).unwrap();
        machine.cpu_mut().set_register16(Register16::CS, 0x0000);
        machine.cpu_mut().set_register16(Register16::IP, 0x0100);
        machine
    }

    #[test]
    fn mov_mov_hlt() {
        // MOV AX, 0x1234; MOV BX, AX; HLT
        let mut machine = machine_with_program(&[0xB8, 0x34, 0x12, 0x89, 0xC3, 0xF4]);

        machine.run(100);

        assert_eq!(machine.cpu().get_register16(Register16::AX), 0x1234);
        assert_eq!(machine.cpu().get_register16(Register16::BX), 0x1234);
        assert!(machine.cpu().halted());
    }

    #[test]
    fn out_to_pic_masks_interrupts() {
        // MOV AL, 0x5A; OUT 0x21, AL; HLT
        let mut machine = machine_with_program(&[0xB0, 0x5A, 0xE6, 0x21, 0xF4]);

        machine.run(100);

        assert_eq!(machine.bus_mut().io_read_u8(0x21), 0x5A);
        // IRQ1 is masked by 0x5A and must not surface
        machine.bus_mut().pic_mut().request_interrupt(1);
        assert_eq!(machine.bus_mut().pic_mut().next_interrupt(), None);
        // IRQ2 is not masked
        machine.bus_mut().pic_mut().request_interrupt(2);
        assert!(machine.bus_mut().pic_mut().next_interrupt().is_some());
    }

    #[test]
    fn vga_programming_via_ports_and_aperture() {
        // Program write mode 0 and all-planes map mask through the ports,
        // then store 0xFF through the aperture:
        //   MOV DX, 0x3CE; MOV AL, 0x05; OUT DX, AL   (GC index 5)
        //   MOV DX, 0x3CF; MOV AL, 0x00; OUT DX, AL   (write mode 0)
        //   MOV DX, 0x3C4; MOV AL, 0x02; OUT DX, AL   (SEQ index 2)
        //   MOV DX, 0x3C5; MOV AL, 0x0F; OUT DX, AL   (all planes)
        //   MOV AX, 0xA000; MOV ES, AX
        //   MOV BYTE ES:[0], 0xFF
        //   HLT
        let mut machine = machine_with_program(&[
            0xBA, 0xCE, 0x03, 0xB0, 0x05, 0xEE,
            0xBA, 0xCF, 0x03, 0xB0, 0x00, 0xEE,
            0xBA, 0xC4, 0x03, 0xB0, 0x02, 0xEE,
            0xBA, 0xC5, 0x03, 0xB0, 0x0F, 0xEE,
            0xB8, 0x00, 0xA0, 0x8E, 0xC0,
            0x26, 0xC6, 0x06, 0x00, 0x00, 0xFF,
            0xF4,
        ]);

        machine.run(100);
        assert!(machine.cpu().halted());

        for plane in 0..4 {
            assert_eq!(machine.bus().video().plane_slice(plane)[0], 0xFF);
        }
    }

    #[test]
    fn int10_sets_mode_13h() {
        // MOV AX, 0x0013; INT 0x10; HLT
        let mut machine = machine_with_program(&[0xB8, 0x13, 0x00, 0xCD, 0x10, 0xF4]);

        machine.run(100);

        let video = machine.bus().video();
        assert_eq!(video.mode(), 0x13);
        assert_eq!(video.resolution(), (320, 200));
        assert_eq!(video.buffer_base(), 0xA0000);
    }

    #[test]
    fn hardware_interrupt_lifts_hlt() {
        // STI; HLT; (handler at 0x0200: MOV AX, 0xBEEF; HLT)
        let mut machine = machine_with_program(&[0xFB, 0xF4]);

        // IVT entry for vector 8 -> 0000:0200
        machine.bus_mut().write_u16(8 * 4, 0x0200);
        machine.bus_mut().write_u16(8 * 4 + 2, 0x0000);
        machine
            .bus_mut()
            .copy_from(&[0xB8, 0xEF, 0xBE, 0xF4], 0x200, false)
            .unwrap();

        // Program the PIC: vector base 8, nothing masked
        machine.bus_mut().io_write_u8(0x20, 0x13);
        machine.bus_mut().io_write_u8(0x21, 0x08);
        machine.bus_mut().io_write_u8(0x21, 0x01);

        machine.run(10);
        assert!(machine.cpu().halted());

        machine.bus_mut().pic_mut().request_interrupt(0);
        machine.run(10);

        assert_eq!(machine.cpu().get_register16(Register16::AX), 0xBEEF);
    }

    #[test]
    fn software_interrupt_vectors_through_ivt() {
        // INT 0x21 with a vectored handler that sets BX and IRETs
        let mut machine = machine_with_program(&[0xCD, 0x21, 0xF4]);

        machine.bus_mut().write_u16(0x21 * 4, 0x0300);
        machine.bus_mut().write_u16(0x21 * 4 + 2, 0x0000);
        // MOV BX, 0x55AA; IRET
        machine
            .bus_mut()
            .copy_from(&[0xBB, 0xAA, 0x55, 0xCF], 0x300, false)
            .unwrap();
        machine.cpu_mut().set_register16(Register16::SP, 0x1000);

        machine.run(10);

        assert_eq!(machine.cpu().get_register16(Register16::BX), 0x55AA);
        assert!(machine.cpu().halted());
    }

    #[test]
    fn rep_movsb_copies_a_block() {
        // Source 0000:0400 -> dest 0000:0500, 16 bytes
        //   MOV SI, 0x0400; MOV DI, 0x0500; MOV CX, 16; CLD; REP MOVSB; HLT
        let mut machine = machine_with_program(&[
            0xBE, 0x00, 0x04, 0xBF, 0x00, 0x05, 0xB9, 0x10, 0x00, 0xFC, 0xF3, 0xA4, 0xF4,
        ]);
        for i in 0..16u8 {
            machine.bus_mut().write_u8(0x400 + i as u32, 0xA0 | i);
        }

        machine.run(100);

        for i in 0..16u8 {
            assert_eq!(machine.bus_mut().read_u8(0x500 + i as u32), 0xA0 | i);
        }
        assert_eq!(machine.cpu().get_register16(Register16::CX), 0);
        assert_eq!(machine.cpu().get_register16(Register16::SI), 0x0410);
    }

    #[test]
    fn flags_after_arithmetic_loop() {
        // XOR AX, AX; MOV CX, 5; loop: INC AX; LOOP loop; HLT
        let mut machine =
            machine_with_program(&[0x31, 0xC0, 0xB9, 0x05, 0x00, 0x40, 0xE2, 0xFD, 0xF4]);

        machine.run(100);

        assert_eq!(machine.cpu().get_register16(Register16::AX), 5);
        assert_eq!(machine.cpu().get_register16(Register16::CX), 0);
        assert!(machine.cpu().halted());
    }

    #[test]
    fn cpu_error_stops_the_machine() {
        // 0xC8 (ENTER) does not exist on the 8086
        let mut machine = machine_with_program(&[0xC8, 0x00, 0x00, 0x00]);

        machine.run(10);

        assert!(!machine.running());
        assert!(machine.get_error_str().is_some());
    }

    #[test]
    fn key_event_reaches_port_and_pic() {
        let mut machine = machine_with_program(&[0xF4]);

        machine.key_event(0x1C);
        assert_eq!(machine.bus_mut().io_read_u8(0x60), 0x1C);
        assert!(machine.bus_mut().pic_mut().keyboard_waiting_ack());
    }

    #[test]
    fn reset_restores_power_on_state() {
        let mut machine = machine_with_program(&[0xB8, 0x34, 0x12, 0xF4]);

        machine.run(10);
        assert_eq!(machine.cpu().get_register16(Register16::AX), 0x1234);

        machine.request_reset();
        machine.run(0);

        assert_eq!(machine.cpu().get_register16(Register16::CS), 0xFFFF);
        assert_eq!(machine.cpu().get_register16(Register16::IP), 0x0000);
        assert_eq!(machine.cpu().get_register16(Register16::AX), 0x0000);
        // The program was cleared with RAM
        assert_eq!(machine.bus_mut().read_u8(0x100), 0x00);
    }

    #[test]
    fn trap_flag_single_steps() {
        // Set TF via the stack: PUSHF; POP AX; OR AX, 0x0100; PUSH AX; POPF;
        // then two NOPs. The int 1 handler counts invocations in 0x0700.
        let mut machine = machine_with_program(&[
            0x9C, 0x58, 0x0D, 0x00, 0x01, 0x50, 0x9D, 0x90, 0x90, 0xF4,
        ]);
        machine.cpu_mut().set_register16(Register16::SP, 0x1000);

        machine.bus_mut().write_u16(1 * 4, 0x0600);
        machine.bus_mut().write_u16(1 * 4 + 2, 0x0000);
        // Handler: INC BYTE [0x0700]; IRET
        machine
            .bus_mut()
            .copy_from(&[0xFE, 0x06, 0x00, 0x07, 0xCF], 0x600, false)
            .unwrap();

        machine.run(100);

        // Every instruction after POPF traps, the two NOPs included
        assert!(machine.bus_mut().read_u8(0x700) >= 2);
    }

    #[test]
    fn int10_ah0f_reports_mode() {
        // MOV AX, 0x0003; INT 0x10; MOV AH, 0x0F; INT 0x10; HLT
        let mut machine = machine_with_program(&[
            0xB8, 0x03, 0x00, 0xCD, 0x10, 0xB4, 0x0F, 0xCD, 0x10, 0xF4,
        ]);

        machine.run(100);

        assert_eq!(machine.cpu().get_register8(Register8::AL), 0x03);
        assert_eq!(machine.cpu().get_register8(Register8::AH), 80);
        assert_eq!(machine.cpu().get_register8(Register8::BH), 0);
    }

    #[test]
    fn int13_without_media_sets_carry() {
        // MOV AH, 0x02; MOV DL, 0x00; INT 0x13; HLT
        let mut machine = machine_with_program(&[0xB4, 0x02, 0xB2, 0x00, 0xCD, 0x13, 0xF4]);

        machine.run(100);

        assert!(machine.cpu().get_flag(Flag::Carry));
    }
}
