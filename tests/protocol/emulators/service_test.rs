mod helpers {
    include!("../../helpers/mod.rs");
}
use helpers::{MockCanBus, MockPower, MockTimer};

use ecu_emu::infra::codec::traits::FrameRecord;
use ecu_emu::protocol::emulators::dde::DdeEmulator;
use ecu_emu::protocol::emulators::egs::{EgsEmulator, EGS_SUPPLY_VOLTAGE};
use ecu_emu::protocol::emulators::service::{CommandChannel, EmulatorService, FrameChannel};
use ecu_emu::protocol::emulators::{Anomaly, Emulator, EmulatorPair, FrameDisposition};
use ecu_emu::protocol::messages::{
    DdeCoolant, DdePidRequest, EgsGear, EgsPidRequest, EgsPidResponse, Lights,
};
use ecu_emu::protocol::transport::traits::{can_bus::CanBus, power::PowerControl};
use embassy_sync::channel::Channel;
use static_cell::StaticCell;

static COMMANDS: StaticCell<CommandChannel<4>> = StaticCell::new();
static FRAMES: StaticCell<FrameChannel<4>> = StaticCell::new();

#[tokio::test]
async fn test_runner_serves_emulators_and_broadcasts() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let commands: &'static CommandChannel<4> = COMMANDS.init(Channel::new());
    let frames: &'static FrameChannel<4> = FRAMES.init(Channel::new());

    let mut power = MockPower::default();
    power.set_power(true, true).await.expect("power failed");
    assert!(power.main && power.accessory);

    let emulators = EmulatorPair::new(DdeEmulator::default(), EgsEmulator::default());
    let service = EmulatorService::new(emulators, dut_bus, MockTimer, Some(commands), Some(frames));
    let parts = service.into_parts();
    let handle = parts.handle.expect("Handle not available");
    let mut unhandled = parts.frames.expect("Frame receiver not available");

    let runner_future = parts.runner.drive();
    tokio::pin!(runner_future);

    tokio::select! {
        result = &mut runner_future => panic!("Runner stopped: {:?}", result),
        _ = async {
            handle
                .send_record(&DdeCoolant { coolant_temp: 0x5a })
                .await
                .expect("encode failed");
            handle
                .send_record(&Lights::new(true, true, false))
                .await
                .expect("encode failed");

            let coolant = host_bus.recv().await.expect("bus closed");
            assert_eq!(DdeCoolant::decode(&coolant), Ok(DdeCoolant { coolant_temp: 0x5a }));
            let lights = host_bus.recv().await.expect("bus closed");
            assert_eq!(lights.id.raw(), 0x21a);
            assert_eq!(lights.payload(), &[0x84, 0x00, 0xf7]);

            let request = EgsPidRequest {
                pid: EGS_SUPPLY_VOLTAGE,
            }
            .encode()
            .expect("encode failed");
            host_bus.send(&request).await.expect("send failed");
            let reply = host_bus.recv().await.expect("bus closed");
            assert_eq!(
                EgsPidResponse::decode(&reply),
                Ok(EgsPidResponse { pid: EGS_SUPPLY_VOLTAGE, value: 0x8a })
            );

            let gear = EgsGear { selected_gear: 0x78 }.encode().expect("encode failed");
            host_bus.send(&gear).await.expect("send failed");
            let forwarded = unhandled.recv().await;
            assert_eq!(forwarded.id.raw(), 0x1d2);
            assert_eq!(forwarded.payload(), gear.payload());
        } => {}
    }

    power.set_power(false, false).await.expect("power failed");
    assert!(!power.main && !power.accessory);
}

#[tokio::test]
async fn test_pair_sums_anomalies() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;
    let mut emulators = EmulatorPair::new(DdeEmulator::default(), EgsEmulator::default());

    let unknown_egs = EgsPidRequest { pid: 0x77 }.encode().expect("encode failed");
    let unknown_dde = DdePidRequest { pid: 0xbeef }.encode().expect("encode failed");
    host_bus.send(&unknown_egs).await.expect("send failed");
    host_bus.send(&unknown_dde).await.expect("send failed");

    for expected in [FrameDisposition::Consumed, FrameDisposition::Replied] {
        let frame = dut_bus.recv().await.expect("bus closed");
        let disposition = emulators
            .on_frame(&mut dut_bus, &mut timer, &frame)
            .await
            .expect("emulator failed");
        assert_eq!(disposition, expected);
    }

    assert_eq!(emulators.first.anomalies().count(), 1);
    assert_eq!(emulators.second.anomalies().count(), 1);
    assert_eq!(emulators.anomalies().count(), 2);
    assert_eq!(emulators.anomalies().last(), Some(Anomaly::UnknownPid { pid: 0xbeef }));

    // Only the DDE answers an unknown parameter.
    let reply = host_bus.recv().await.expect("bus closed");
    assert_eq!(reply.id.raw(), 0x612);
    assert!(host_bus.try_recv().is_none());
}

#[tokio::test]
async fn test_runner_without_channels() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let service = EmulatorService::<_, _, _, 1, 1>::new(
        EgsEmulator::default(),
        dut_bus,
        MockTimer,
        None,
        None,
    );
    let parts = service.into_parts();
    assert!(parts.handle.is_none());
    assert!(parts.frames.is_none());
    assert_eq!(parts.runner.emulator().anomalies().count(), 0);

    let runner_future = parts.runner.drive();
    tokio::pin!(runner_future);

    tokio::select! {
        result = &mut runner_future => panic!("Runner stopped: {:?}", result),
        _ = async {
            // Unhandled frames are dropped silently.
            let gear = EgsGear { selected_gear: 0x50 }.encode().expect("encode failed");
            host_bus.send(&gear).await.expect("send failed");

            let request = EgsPidRequest {
                pid: EGS_SUPPLY_VOLTAGE,
            }
            .encode()
            .expect("encode failed");
            host_bus.send(&request).await.expect("send failed");
            let reply = host_bus.recv().await.expect("bus closed");
            assert_eq!(reply.payload()[4], 0x8a);
        } => {}
    }
}
