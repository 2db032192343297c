//! Control-plane run-state handshake with a live dispatch thread.

use std::thread;
use std::time::{Duration, Instant};

use cpld_link::SimLink;
use emu_core::Value;
use emu_hostbus::{Host, HostError, MemoryProfile, ModelId, RunState, StoreKind};

fn host() -> Host<SimLink> {
    let mut link = SimLink::new();
    link.set_logging(false);
    let host = Host::new(link).unwrap();
    // Fastest pacing keeps virtual fetches from spinning long.
    assert_eq!(host.set_speed_multiplier(128), 128);
    host
}

fn wait_for(host: &Host<SimLink>, state: RunState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while host.run_state() != state {
        assert!(Instant::now() < deadline, "stuck in {}", host.run_state());
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn starts_stopped_and_runs_on_request() {
    let host = host();
    assert_eq!(host.run_state(), RunState::Stopped);
    host.start();
    wait_for(&host, RunState::Running);
    host.stop();
    assert_eq!(host.run_state(), RunState::Stopped);
    // The CPU moved through host memory (all NOPs).
    let Some(Value::U64(count)) = host.query("cpu.instructions") else {
        panic!("no instruction count");
    };
    assert!(count > 0);
}

#[test]
fn configuration_requires_a_stopped_machine() {
    let host = host();
    host.start();
    wait_for(&host, RunState::Running);

    assert!(matches!(
        host.select_model(ModelId::Mz700, MemoryProfile::Virtual),
        Err(HostError::NotStopped(_))
    ));
    assert!(matches!(
        host.load_image(StoreKind::Rom, 0, &[0x00]),
        Err(HostError::NotStopped(_))
    ));
    assert!(matches!(host.set_pc(0x1200), Err(HostError::NotStopped(_))));

    host.stop();
    host.select_model(ModelId::Mz700, MemoryProfile::Virtual).unwrap();
    host.load_image(StoreKind::Rom, 0, &[0x00]).unwrap();
    host.set_pc(0x1200).unwrap();
    assert_eq!(host.query("cpu.pc"), Some(Value::U16(0x1200)));
}

#[test]
fn pause_and_resume() {
    let host = host();
    host.start();
    wait_for(&host, RunState::Running);
    host.pause();
    assert_eq!(host.run_state(), RunState::Paused);
    let before = host.query("cpu.instructions");
    thread::sleep(Duration::from_millis(10));
    assert_eq!(host.query("cpu.instructions"), before);
    host.resume();
    wait_for(&host, RunState::Running);
    host.stop();
}

#[test]
fn resume_only_leaves_pause() {
    let host = host();
    host.resume();
    assert_eq!(host.run_state(), RunState::Stopped);
}

#[test]
fn reset_restores_the_prior_run_state() {
    let host = host();
    host.reset_machine();
    assert_eq!(host.run_state(), RunState::Stopped);

    host.start();
    wait_for(&host, RunState::Running);
    host.reset_machine();
    wait_for(&host, RunState::Running);
    host.stop();
}

#[test]
fn deselect_checks_the_model() {
    let host = host();
    assert!(matches!(
        host.deselect_model(ModelId::Pcw),
        Err(HostError::NoModel)
    ));
    host.select_model(ModelId::Mz1500, MemoryProfile::Virtual).unwrap();
    assert!(matches!(
        host.deselect_model(ModelId::Mz700),
        Err(HostError::ModelNotSelected(ModelId::Mz700))
    ));
    host.deselect_model(ModelId::Mz1500).unwrap();
    assert_eq!(host.query("model"), Some(Value::from("none")));
}
