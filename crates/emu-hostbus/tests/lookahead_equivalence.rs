//! Issuing port transactions at fetch time must not change what the host
//! sees. Random I/O programs run twice, lookahead on and off, and the
//! command streams, memories and registers must match.

use cpld_link::SimLink;
use emu_core::Cpu;
use emu_hostbus::{CountingWaiter, Machine, PageKind, StoreKind};
use proptest::prelude::*;

/// Virtual RAM below 8000, host RAM above.
fn machine(lookahead: bool, program: &[u8]) -> Machine<SimLink> {
    let mut link = SimLink::new();
    for port in 0..=0xFFFFu16 {
        link.set_port_input(port, (port as u8) ^ (port >> 8) as u8 ^ 0x5A);
    }
    let mut machine = Machine::new(link);
    let engine = machine.engine_mut();
    engine
        .governor_mut()
        .set_waiter(Box::new(CountingWaiter::new()));
    engine.set_lookahead(lookahead);
    engine.modes_mut().derive("split", |mode| {
        mode.set_range(0x0000..=0x7FFF, PageKind::VirtualRam, 0);
    });
    engine.load_image(StoreKind::Ram, 0, program).unwrap();
    machine
}

fn run(machine: &mut Machine<SimLink>) {
    for _ in 0..256 {
        if machine.cpu().is_halted() {
            return;
        }
        machine.step();
    }
}

/// Register operand for `IN r,(C)` / `OUT (C),r`, skipping the (HL) slot.
fn register() -> impl Strategy<Value = u8> {
    prop::sample::select(vec![0u8, 1, 2, 3, 4, 5, 7])
}

/// Prefixed forms whose second opcode byte looks like an I/O instruction.
fn prefixed() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // SET 2,E ; SET 3,E ; SET 5,L
        prop::sample::select(vec![0xD3u8, 0xDB, 0xED]).prop_map(|op| vec![0xCB, op]),
        // IX/IY-prefixed IN A,(n) and OUT (n),A
        (
            prop::sample::select(vec![0xDDu8, 0xFD]),
            prop::sample::select(vec![0xD3u8, 0xDB]),
            any::<u8>(),
        )
            .prop_map(|(prefix, op, n)| vec![prefix, op, n]),
        // LD IX,0xD3DB ; LD A,0xD3 under a prefix
        Just(vec![0xDD, 0x21, 0xDB, 0xD3]),
        Just(vec![0xFD, 0x3E, 0xD3]),
        // SBC HL,BC ; ADC HL,DE
        Just(vec![0xED, 0x42]),
        Just(vec![0xED, 0x5A]),
    ]
}

fn instruction() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        any::<u8>().prop_map(|n| vec![0xDB, n]),
        any::<u8>().prop_map(|n| vec![0xD3, n]),
        any::<u8>().prop_map(|n| vec![0x3E, n]),
        any::<u16>().prop_map(|nn| {
            let [lo, hi] = nn.to_le_bytes();
            vec![0x01, lo, hi]
        }),
        // HL into virtual or host RAM.
        prop::bool::ANY.prop_map(|virtual_ram| if virtual_ram {
            vec![0x21, 0x00, 0x40]
        } else {
            vec![0x21, 0x00, 0x90]
        }),
        register().prop_map(|r| vec![0xED, 0x40 | (r << 3)]),
        register().prop_map(|r| vec![0xED, 0x41 | (r << 3)]),
        // INI, IND, OUTI, OUTD
        prop::sample::select(vec![0xA2u8, 0xAA, 0xA3, 0xAB]).prop_map(|op| vec![0xED, op]),
        Just(vec![0x3A, 0x00, 0x90]),
        Just(vec![0x32, 0x01, 0x90]),
        Just(vec![0x04]),
        Just(vec![0x00]),
        prefixed(),
    ]
}

fn program() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(instruction(), 1..40).prop_map(|parts| {
        let mut program: Vec<u8> = parts.concat();
        program.push(0x76);
        program
    })
}

proptest! {
    #[test]
    fn lookahead_is_invisible_to_the_host(program in program()) {
        let mut eager = machine(true, &program);
        let mut plain = machine(false, &program);
        run(&mut eager);
        run(&mut plain);

        prop_assert!(eager.cpu().is_halted());
        prop_assert_eq!(eager.engine().pending(), None);
        prop_assert_eq!(
            eager.engine().codec().link().commands(),
            plain.engine().codec().link().commands()
        );
        prop_assert_eq!(eager.cpu().registers(), plain.cpu().registers());
        prop_assert!(eager.engine().store().ram() == plain.engine().store().ram());
        prop_assert!(
            eager.engine().codec().link().memory() == plain.engine().codec().link().memory()
        );
    }
}

#[test]
fn lookahead_issues_before_the_operand_cycle() {
    // IN A,(0xFE) ; HALT
    let mut eager = machine(true, &[0xDB, 0xFE, 0x76]);
    // One M1 fetch: the read is already on its way.
    let regs = eager.cpu().registers().view();
    let opcode = emu_core::Bus::fetch_opcode(eager.engine_mut(), 0x0000, &regs);
    assert_eq!(opcode, 0xDB);
    assert!(eager.engine().pending().is_some());
    assert_eq!(
        eager.engine().codec().outstanding(),
        Some(cpld_link::Command::ReadPort { port: 0xFE })
    );
}
