//! The port cycle predicted at M1 time must match the one the CPU performs.
//!
//! A bus that starts I/O early only sees the opcode, the byte after it and
//! the register file at fetch. These tests run programs through a bus that
//! makes that prediction at every fetch and checks it against the cycle
//! that actually follows.

use emu_core::{Bus, Cpu, RegisterView};
use zilog_z80::{IoAccess, Z80, io_group};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    In(u16),
    Out(u16, u8),
}

struct PredictingBus {
    memory: Vec<u8>,
    predicted: Option<Cycle>,
    observed: Vec<(Option<Cycle>, Cycle)>,
}

impl PredictingBus {
    fn new(program: &[u8]) -> Self {
        let mut memory = vec![0; 0x10000];
        memory[..program.len()].copy_from_slice(program);
        Self {
            memory,
            predicted: None,
            observed: Vec::new(),
        }
    }

    fn record(&mut self, actual: Cycle) {
        let predicted = self.predicted.take();
        self.observed.push((predicted, actual));
    }
}

impl Bus for PredictingBus {
    fn fetch_opcode(&mut self, address: u16, regs: &RegisterView) -> u8 {
        let opcode = self.memory[address as usize];
        let next = self.memory[address.wrapping_add(1) as usize];
        self.predicted = if io_group::is_candidate(opcode) {
            io_group::decode(opcode, next, regs).map(|access| match access {
                IoAccess::In { port } | IoAccess::BlockIn { port, .. } => Cycle::In(port),
                IoAccess::Out { port, value } => Cycle::Out(port, value),
                IoAccess::BlockOut { port, src, .. } => {
                    Cycle::Out(port, self.memory[src as usize])
                }
            })
        } else {
            None
        };
        opcode
    }

    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    fn io_read(&mut self, port: u16) -> u8 {
        self.record(Cycle::In(port));
        (port as u8) ^ 0x5A
    }

    fn io_write(&mut self, port: u16, value: u8) {
        self.record(Cycle::Out(port, value));
    }
}

fn run(program: &[u8], steps: usize) -> PredictingBus {
    let mut bus = PredictingBus::new(program);
    let mut cpu = Z80::new();
    for _ in 0..steps {
        cpu.step(&mut bus);
    }
    bus
}

fn assert_all_predicted(bus: &PredictingBus, expected_cycles: usize) {
    assert_eq!(bus.observed.len(), expected_cycles);
    for (predicted, actual) in &bus.observed {
        assert_eq!(predicted.as_ref(), Some(actual));
    }
}

#[test]
fn immediate_and_register_ports() {
    // LD A,0x12 ; OUT (0xE4),A ; IN A,(0xEA) ; LD BC,0x34E1 ; LD E,0x77
    // OUT (C),E ; IN H,(C) ; OUT (C),0
    let bus = run(
        &[
            0x3E, 0x12, 0xD3, 0xE4, 0xDB, 0xEA, 0x01, 0xE1, 0x34, 0x1E, 0x77, 0xED, 0x59, 0xED,
            0x60, 0xED, 0x71,
        ],
        8,
    );
    assert_all_predicted(&bus, 5);
    assert_eq!(bus.observed[0].1, Cycle::Out(0x12E4, 0x12));
    assert_eq!(bus.observed[4].1, Cycle::Out(0x34E1, 0));
}

#[test]
fn every_block_iteration_is_predicted() {
    // LD HL,0x8000 ; LD BC,0x04F0 ; OTIR ; LD HL,0x9000 ; LD B,3 ; INDR
    let mut program = vec![
        0x21, 0x00, 0x80, 0x01, 0xF0, 0x04, 0xED, 0xB3, 0x21, 0x00, 0x90, 0x06, 0x03, 0xED,
        0xBA,
    ];
    program.resize(0x8000, 0);
    program.extend_from_slice(&[0x10, 0x20, 0x30, 0x40]);
    let bus = run(&program, 2 + 4 + 2 + 3);
    assert_all_predicted(&bus, 7);
    assert_eq!(bus.observed[0].1, Cycle::Out(0x03F0, 0x10));
    assert_eq!(bus.observed[3].1, Cycle::Out(0x00F0, 0x40));
    assert_eq!(bus.observed[4].1, Cycle::In(0x03F0));
    assert_eq!(bus.memory[0x8FFE], 0xF0 ^ 0x5A);
}

#[test]
fn non_io_instructions_predict_nothing() {
    // LD A,0xDB ; LD (0xD3ED),A
    let bus = run(&[0x3E, 0xDB, 0x32, 0xED, 0xD3], 2);
    assert!(bus.observed.is_empty());
    assert!(bus.predicted.is_none());
}

#[test]
fn prefixed_bytes_are_not_instruction_starts() {
    // SET 2,E ; SET 3,E ; SET 5,L ; LD IX,0xD3DB ; DD-prefixed OUT (0xFE),A
    let bus = run(
        &[0xCB, 0xD3, 0xCB, 0xDB, 0xCB, 0xED, 0xDD, 0x21, 0xDB, 0xD3, 0xDD, 0xD3, 0xFE],
        5,
    );
    assert_eq!(bus.observed, vec![(None, Cycle::Out(0x00FE, 0))]);
}
