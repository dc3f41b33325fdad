mod helpers {
    include!("../../helpers/mod.rs");
}
use helpers::{MockCanBus, MockTimer};

use ecu_emu::infra::codec::traits::FrameRecord;
use ecu_emu::protocol::diagnostic::exchange::DiagnosticClient;
use ecu_emu::protocol::emulators::egs::{
    EgsEmulator, EGS_ACTUAL_GEAR, EGS_OIL_TEMPERATURE, EGS_SUPPLY_VOLTAGE,
};
use ecu_emu::protocol::emulators::{Anomaly, Emulator, FrameDisposition};
use ecu_emu::protocol::messages::{DdePidRequest, EgsPidRequest, EgsPidResponse};
use ecu_emu::protocol::transport::traits::{can_bus::CanBus, record_sender::RecordSender};

#[tokio::test]
async fn test_default_table_answers_bench_reads() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = EgsEmulator::default();
    let mut dut_timer = MockTimer;
    let mut timer = MockTimer;

    for (pid, expected) in [(EGS_SUPPLY_VOLTAGE, 0x8a), (EGS_OIL_TEMPERATURE, 0x50)] {
        host_bus
            .send_record(&EgsPidRequest { pid })
            .await
            .expect("send failed");

        let frame = dut_bus.recv().await.expect("bus closed");
        let disposition = emulator
            .on_frame(&mut dut_bus, &mut dut_timer, &frame)
            .await
            .expect("emulator failed");
        assert_eq!(disposition, FrameDisposition::Replied);

        let reply: EgsPidResponse = DiagnosticClient::new(&mut host_bus, &mut timer)
            .expect_record(500)
            .await
            .expect("no reply");
        assert_eq!(reply, EgsPidResponse { pid, value: expected });
    }
}

#[tokio::test]
async fn test_updated_gear_is_served() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = EgsEmulator::default();
    let mut timer = MockTimer;

    assert!(emulator.set(EGS_ACTUAL_GEAR, 3));
    assert!(!emulator.set(0x77, 1));

    let request = EgsPidRequest { pid: EGS_ACTUAL_GEAR }.encode().expect("encode failed");
    host_bus.send(&request).await.expect("send failed");
    let frame = dut_bus.recv().await.expect("bus closed");
    emulator
        .on_frame(&mut dut_bus, &mut timer, &frame)
        .await
        .expect("emulator failed");

    let reply = host_bus.recv().await.expect("bus closed");
    assert_eq!(reply.id.raw(), 0x618);
    assert_eq!(reply.payload(), &[0xf1, 0x03, 0x61, 0x0a, 0x03, 0x00, 0x00, 0x00]);
}

#[tokio::test]
async fn test_unknown_pid_and_foreign_frames() {
    let (mut dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = EgsEmulator::default();
    let mut timer = MockTimer;

    let unknown = EgsPidRequest { pid: 0x77 }.encode().expect("encode failed");
    let foreign = DdePidRequest { pid: 0x0385 }.encode().expect("encode failed");
    host_bus.send(&unknown).await.expect("send failed");
    host_bus.send(&foreign).await.expect("send failed");

    let frame = dut_bus.recv().await.expect("bus closed");
    assert_eq!(
        emulator.on_frame(&mut dut_bus, &mut timer, &frame).await.expect("emulator failed"),
        FrameDisposition::Consumed
    );
    let frame = dut_bus.recv().await.expect("bus closed");
    assert_eq!(
        emulator.on_frame(&mut dut_bus, &mut timer, &frame).await.expect("emulator failed"),
        FrameDisposition::Ignored
    );

    assert!(host_bus.try_recv().is_none());
    assert_eq!(emulator.anomalies().count(), 1);
    assert_eq!(emulator.anomalies().last(), Some(Anomaly::UnknownPid { pid: 0x77 }));
}
