//! Gateway behaviour against the simulated bus

use d3net_core::core::codec::{
    CapabilityBlock, ErrorBlock, FanSpeed, HoldingBlock, Mode, RegisterBlock, RegisterKind, StatusBlock,
};
use d3net_core::core::gateway::{Clock, Gateway, GatewayConfig, GatewayError, ManualClock, PollSummary};
use d3net_core::core::simulator::{BusOp, Fault, SimulatedBus};
use d3net_core::core::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;

type TestGateway = Gateway<SimulatedBus, Arc<ManualClock>>;

fn gateway(bus: SimulatedBus) -> (TestGateway, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(100_000));
    let gw = Gateway::with_clock(bus, Arc::clone(&clock), 1, GatewayConfig::default());
    (gw, clock)
}

fn discovered_demo() -> (TestGateway, Arc<ManualClock>) {
    let (mut gw, clock) = gateway(SimulatedBus::demo());
    assert_eq!(gw.discover_units().unwrap(), 4);
    gw.bus_mut().clear_ops();
    (gw, clock)
}

#[test]
fn test_discovery_finds_connected_units() {
    let mut bus = SimulatedBus::new();
    bus.add_unit(5, &CapabilityBlock::default(), &StatusBlock::default());
    let (mut gw, _) = gateway(bus);

    assert_eq!(gw.discover_units().unwrap(), 1);
    let unit = gw.unit(5).unwrap();
    assert!(unit.is_present());
    assert_eq!(unit.id(), "1-05");
    assert_eq!(gw.present_units().count(), 1);

    let reads: Vec<u16> = gw
        .bus()
        .ops()
        .iter()
        .map(|op| match op {
            BusOp::Read { address, .. } | BusOp::Write { address, .. } => *address,
        })
        .collect();
    assert_eq!(reads, vec![0, 1015, 2030]);
}

#[test]
fn test_unit_in_error_is_never_present() {
    let mut bus = SimulatedBus::new();
    bus.add_unit(6, &CapabilityBlock::default(), &StatusBlock::default());
    bus.add_unit(7, &CapabilityBlock::default(), &StatusBlock::default());
    bus.set_unit_error(6, true);
    let (mut gw, _) = gateway(bus);

    assert_eq!(gw.discover_units().unwrap(), 1);
    assert!(!gw.unit(6).unwrap().is_present());
    assert!(gw.unit(7).unwrap().is_present());
}

#[test]
fn test_failed_unit_read_skips_only_that_unit() {
    let mut bus = SimulatedBus::demo();
    bus.fail_reads(RegisterKind::Input, CapabilityBlock::address(5), Fault::Timeout);
    bus.fail_reads(RegisterKind::Input, StatusBlock::address(17), Fault::Crc);
    let (mut gw, _) = gateway(bus);

    assert_eq!(gw.discover_units().unwrap(), 2);
    assert!(gw.unit(0).unwrap().is_present());
    assert!(!gw.unit(5).unwrap().is_present());
    assert!(!gw.unit(17).unwrap().is_present());
}

#[test]
fn test_system_status_failure_fails_discovery() {
    let mut bus = SimulatedBus::demo();
    bus.fail_reads(RegisterKind::Input, 0, Fault::Timeout);
    let (mut gw, _) = gateway(bus);

    let err = gw.discover_units().unwrap_err();
    assert!(matches!(err, GatewayError::Bus(TransportError::Timeout { .. })));
    assert_eq!(gw.discovered_count(), 0);
}

#[test]
fn test_rediscovery_resets_slots() {
    let (mut gw, _) = discovered_demo();
    gw.bus_mut().set_unit_error(1, true);

    assert_eq!(gw.discover_units().unwrap(), 3);
    assert!(!gw.unit(1).unwrap().is_present());
    assert!(matches!(gw.set_power(1, true), Err(GatewayError::UnitNotPresent(1))));
}

#[test]
fn test_setpoint_command_reads_baseline_then_writes() {
    let (mut gw, _) = discovered_demo();

    gw.set_setpoint(5, 24.0).unwrap();

    let ops = gw.bus().ops().to_vec();
    assert_eq!(ops.len(), 3);
    assert_eq!(
        ops[0],
        BusOp::Read {
            kind: RegisterKind::Holding,
            address: 2015,
            count: 3
        }
    );
    assert!(ops[1].is_write());
    assert!(ops[2].is_write());

    let holding: HoldingBlock = gw.bus().block(5);
    assert!((holding.setpoint() - 24.0).abs() < f32::EPSILON);
    assert!(holding.power());
    assert_eq!(holding.mode(), Some(Mode::Auto));
    assert!(holding.fan_control());

    let unit = gw.unit(5).unwrap();
    assert!(!unit.holding().is_dirty());
    assert!((unit.status().setpoint() - 24.0).abs() < f32::EPSILON);
}

#[test]
fn test_second_command_reuses_fresh_holding() {
    let (mut gw, clock) = discovered_demo();
    gw.set_setpoint(5, 24.0).unwrap();
    gw.bus_mut().clear_ops();

    clock.advance(Duration::from_secs(5));
    gw.set_fan_speed(5, FanSpeed::High).unwrap();

    let writes = gw.bus().writes();
    assert_eq!(gw.bus().ops().len(), 1);
    assert_eq!(writes.len(), 1);
    let status: StatusBlock = gw.bus().block(5);
    assert_eq!(status.fan_speed(), Some(FanSpeed::High));
}

#[test]
fn test_unchanged_command_writes_nothing_new() {
    let (mut gw, clock) = discovered_demo();
    gw.set_setpoint(5, 24.0).unwrap();
    gw.bus_mut().clear_ops();

    clock.advance(Duration::from_secs(1));
    gw.set_setpoint(5, 24.0).unwrap();
    assert!(gw.bus().ops().is_empty());
}

#[test]
fn test_filter_reset_pulses() {
    let (mut gw, clock) = discovered_demo();
    gw.set_power(0, true).unwrap();
    gw.bus_mut().clear_ops();

    clock.advance(Duration::from_secs(2));
    gw.filter_reset(0).unwrap();

    let writes = gw.bus().writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, 2000);
    assert_eq!(writes[0].1[1] & 0x00F0, 0x00F0);
    assert_eq!(writes[1].1[1] & 0x00F0, 0);
    assert!(!gw.unit(0).unwrap().holding().filter_reset());
}

#[test]
fn test_mode_command_switches_unit_on() {
    let (mut gw, _) = discovered_demo();
    assert!(!gw.unit(1).unwrap().status().power());

    gw.set_mode(1, Mode::Cool).unwrap();

    let status: StatusBlock = gw.bus().block(1);
    assert!(status.power());
    assert_eq!(status.mode(), Some(Mode::Cool));
    assert!(gw.unit(1).unwrap().status().power());
}

#[test]
fn test_failed_write_keeps_edit_pending() {
    let (mut gw, clock) = discovered_demo();
    gw.set_setpoint(5, 24.0).unwrap();
    gw.bus_mut().fail_writes(HoldingBlock::address(5), Fault::Timeout);

    clock.advance(Duration::from_secs(1));
    let err = gw.set_setpoint(5, 25.0).unwrap_err();
    assert!(matches!(err, GatewayError::Bus(TransportError::Timeout { .. })));
    assert!(gw.unit(5).unwrap().holding().is_dirty());

    gw.bus_mut().clear_faults();
    clock.advance(Duration::from_secs(1));
    gw.set_setpoint(5, 25.0).unwrap();
    assert!(!gw.unit(5).unwrap().holding().is_dirty());
    let status: StatusBlock = gw.bus().block(5);
    assert!((status.setpoint() - 25.0).abs() < f32::EPSILON);
}

#[test]
fn test_poll_skips_recently_written_units() {
    let (mut gw, clock) = discovered_demo();
    gw.set_setpoint(5, 24.0).unwrap();

    clock.advance(Duration::from_secs(10));
    assert_eq!(
        gw.poll_status(),
        PollSummary {
            polled: 3,
            skipped: 1,
            failed: 0
        }
    );

    clock.advance(Duration::from_secs(26));
    assert_eq!(
        gw.poll_status(),
        PollSummary {
            polled: 4,
            skipped: 0,
            failed: 0
        }
    );
}

#[test]
fn test_poll_picks_up_device_changes_and_failures() {
    let (mut gw, _) = discovered_demo();
    gw.bus_mut().set_room_temperature(17, 18.5);
    gw.bus_mut().fail_reads(RegisterKind::Input, StatusBlock::address(0), Fault::Framing);

    let summary = gw.poll_status();
    assert_eq!(summary.polled, 3);
    assert_eq!(summary.failed, 1);
    assert!((gw.unit(17).unwrap().status().room_temperature() - 18.5).abs() < f32::EPSILON);
    assert!(gw.unit(0).unwrap().is_present());
}

#[test]
fn test_error_reads_are_cached() {
    let (mut gw, clock) = discovered_demo();
    gw.bus_mut().set_error(1, &ErrorBlock::from_words([0x3455, 0x2301]));

    let block = *gw.read_error(1).unwrap();
    assert_eq!(block.code(), "U4");
    assert_eq!(block.subcode(), 1);
    assert!(block.error());
    assert!(block.alarm());
    assert!(!block.warning());
    assert_eq!(block.unit_number(), 2);

    clock.advance(Duration::from_secs(5));
    gw.read_error(1).unwrap();
    assert_eq!(gw.bus().ops().len(), 1);

    clock.advance(Duration::from_secs(6));
    gw.read_error(1).unwrap();
    assert_eq!(gw.bus().ops().len(), 2);
    assert_eq!(
        gw.bus().ops()[1],
        BusOp::Read {
            kind: RegisterKind::Input,
            address: 3602,
            count: 2
        }
    );
    assert!(gw.unit(1).unwrap().last_error_read().is_some());
}

#[test]
fn test_failed_error_read_is_not_cached() {
    let (mut gw, _) = discovered_demo();
    gw.bus_mut().set_error(5, &ErrorBlock::from_words([0x3455, 0x2301]));
    gw.bus_mut().fail_reads(RegisterKind::Input, ErrorBlock::address(5), Fault::Crc);

    let err = gw.read_error(5).unwrap_err();
    assert!(matches!(err, GatewayError::Bus(TransportError::CrcMismatch { .. })));
    assert!(gw.unit(5).unwrap().last_error_read().is_none());

    // same instant: the next call goes to the bus again
    gw.bus_mut().clear_faults();
    gw.bus_mut().clear_ops();
    assert_eq!(gw.read_error(5).unwrap().code(), "U4");
    assert_eq!(
        gw.bus().ops(),
        &[BusOp::Read {
            kind: RegisterKind::Input,
            address: 3610,
            count: 2
        }]
    );
    assert!(gw.unit(5).unwrap().last_error_read().is_some());
}

#[test]
fn test_operations_are_throttled() {
    let (mut gw, clock) = gateway(SimulatedBus::demo());
    let start = clock.now_ms();
    gw.discover_units().unwrap();

    // one system read plus two reads per unit, each after the first spaced 25 ms
    let ops = gw.bus().ops().len() as u64;
    assert_eq!(ops, 9);
    assert_eq!(clock.now_ms() - start, (ops - 1) * 25);
}
