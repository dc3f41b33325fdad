mod helpers {
    include!("../../helpers/mod.rs");
}
use helpers::{MockCanBus, MockTimer};

use ecu_emu::infra::codec::traits::FrameRecord;
use ecu_emu::protocol::diagnostic::exchange::DiagnosticClient;
use ecu_emu::protocol::diagnostic::{DDE_ID, TESTER_ID};
use ecu_emu::protocol::emulators::dde::{
    DdeEmulator, DdeState, PidEntry, PidTable, DDE_SETUP_PAYLOAD,
};
use ecu_emu::protocol::emulators::{Anomaly, Emulator};
use ecu_emu::protocol::messages::{DdePidRequest, DdePidResponse};
use ecu_emu::protocol::transport::can_frame::CanFrame;
use ecu_emu::protocol::transport::iso_tp::framer::{FramerEvent, TpConfig, TpFramer};
use ecu_emu::protocol::transport::iso_tp::{FlowStatus, TpAddressing, TpFrame};
use ecu_emu::protocol::transport::traits::can_bus::CanBus;

const SETUP_REPLY: [u8; 14] = [
    0x6c, 0x10, 0x1a, 0x64, 0x00, 0x00, 0x2c, 0x34, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

async fn serve<E: Emulator>(emulator: &mut E, mut bus: MockCanBus) {
    let mut timer = MockTimer;
    while let Ok(frame) = bus.recv().await {
        emulator
            .on_frame(&mut bus, &mut timer, &frame)
            .await
            .expect("emulator failed");
    }
}

fn tester_frame(frame: TpFrame<'_>) -> CanFrame {
    frame.to_can_frame(TpAddressing::Addressed, TESTER_ID, DDE_ID)
}

/// Send `payload` with a tester-side framer and reassemble the DDE's answer.
async fn exchange(host_bus: &mut MockCanBus, payload: &[u8]) -> Vec<u8> {
    let mut timer = MockTimer;
    let mut tester = TpFramer::<1>::new(TpConfig::new(TESTER_ID));
    tester
        .transmit(host_bus, &mut timer, DDE_ID, payload)
        .await
        .expect("transmit failed");

    loop {
        let frame = host_bus.recv().await.expect("bus closed");
        match tester
            .on_frame(host_bus, &mut timer, &frame)
            .await
            .expect("reassembly failed")
        {
            FramerEvent::Payload(reply) => {
                assert_eq!(reply.sender, DDE_ID);
                return reply.as_slice().to_vec();
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn test_setup_frames_on_the_wire() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let first = tester_frame(TpFrame::First {
                total_len: DDE_SETUP_PAYLOAD.len(),
                data: &DDE_SETUP_PAYLOAD[..5],
            });
            assert_eq!(first.payload(), &[0x12, 0x10, 0x0e, 0x2c, 0x10, 0x03, 0x85, 0x04]);
            host_bus.send(&first).await.expect("send failed");

            let flow = host_bus.recv().await.expect("bus closed");
            assert_eq!(flow.id.raw(), 0x612);
            assert_eq!(flow.payload(), &[0xf1, 0x30, 0x00, 0x01]);

            for (index, chunk) in DDE_SETUP_PAYLOAD[5..].chunks(6).enumerate() {
                let frame = tester_frame(TpFrame::Consecutive {
                    sequence: index as u8 + 1,
                    data: chunk,
                });
                host_bus.send(&frame).await.expect("send failed");
            }

            let reply_first = host_bus.recv().await.expect("bus closed");
            assert_eq!(
                reply_first.payload(),
                &[0xf1, 0x10, 0x0e, 0x6c, 0x10, 0x1a, 0x64, 0x00]
            );

            let go = tester_frame(TpFrame::FlowControl {
                status: FlowStatus::Continue,
                block_size: 0,
                separation_time: 0,
            });
            host_bus.send(&go).await.expect("send failed");

            let second = host_bus.recv().await.expect("bus closed");
            let third = host_bus.recv().await.expect("bus closed");
            assert_eq!(second.payload(), &[0xf1, 0x21, 0x00, 0x2c, 0x34, 0x00, 0x00, 0x00]);
            assert_eq!(third.payload(), &[0xf1, 0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        } => {}
    }

    assert_eq!(emulator.state(), DdeState::Configured);
    assert_eq!(
        emulator.configured_pids(),
        &[0x0385, 0x041b, 0x076f, 0x066d, 0x0a8d, 0x1006]
    );
    assert_eq!(emulator.anomalies().count(), 0);
}

#[tokio::test]
async fn test_resume_repeats_configured_values() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            assert_eq!(exchange(&mut host_bus, &DDE_SETUP_PAYLOAD).await, SETUP_REPLY);
            assert_eq!(exchange(&mut host_bus, &[0x2c, 0x10]).await, SETUP_REPLY);
        } => {}
    }

    assert!(emulator.is_configured());
    assert_eq!(emulator.anomalies().count(), 0);
}

#[tokio::test]
async fn test_second_setup_keeps_configuration() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            exchange(&mut host_bus, &DDE_SETUP_PAYLOAD).await;
            let reply = exchange(&mut host_bus, &[0x2c, 0x10, 0x03, 0x85, 0x07, 0x6f]).await;
            assert_eq!(reply, [0x6c, 0x10, 0x1a, 0x64, 0x2c, 0x34]);
        } => {}
    }

    assert!(emulator.is_configured());
    assert_eq!(emulator.configured_pids().len(), 6);
    assert_eq!(emulator.anomalies().last(), Some(Anomaly::AlreadyConfigured));
}

#[tokio::test]
async fn test_unexpected_setup_leaves_dde_unconfigured() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let reply = exchange(&mut host_bus, &[0x2c, 0x10, 0x01, 0x2c, 0x0f, 0xd2]).await;
            assert_eq!(reply, [0x6c, 0x10, 0x79, 0xac, 0x0b, 0x2a]);
        } => {}
    }

    assert_eq!(emulator.state(), DdeState::Unconfigured);
    assert_eq!(emulator.anomalies().last(), Some(Anomaly::UnexpectedSetup));
}

#[tokio::test]
async fn test_single_pid_read_uses_dedicated_frame() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut table = PidTable::from_entries(&[
        PidEntry::new(0x0385, 2, 0x1a64),
        PidEntry::new(0x0e86, 1, 0x2f),
    ]);
    assert!(table.set(0x0385, 0x1b00));
    let mut emulator = DdeEmulator::new(table);
    let mut timer = MockTimer;

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let request = DdePidRequest { pid: 0x0385 }.encode().expect("encode failed");
            host_bus.send(&request).await.expect("send failed");
            let wide: DdePidResponse = DiagnosticClient::new(&mut host_bus, &mut timer)
                .expect_record(500)
                .await
                .expect("no reply");
            assert_eq!(wide.width(), 2);
            assert_eq!(wide.pid_value(), 0x1b00);

            let request = DdePidRequest { pid: 0x0e86 }.encode().expect("encode failed");
            host_bus.send(&request).await.expect("send failed");
            let narrow: DdePidResponse = DiagnosticClient::new(&mut host_bus, &mut timer)
                .expect_record(500)
                .await
                .expect("no reply");
            assert_eq!(narrow.width(), 1);
            assert_eq!(narrow.pid_value(), 0x2f);
        } => {}
    }

    assert_eq!(emulator.state(), DdeState::Unconfigured);
}

/// Replies seen on the tester side within 100 ms of sending `request`.
async fn replies_to(host_bus: &mut MockCanBus, request: &CanFrame) -> Vec<CanFrame> {
    host_bus.send(request).await.expect("send failed");
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    let mut replies = Vec::new();
    while let Some(frame) = host_bus.try_recv() {
        replies.push(frame);
    }
    replies
}

#[tokio::test]
async fn test_malformed_requests_get_one_negative_reply() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            // Wrong service, then a parameter list cut in half.
            for request in [&[0x21, 0x01][..], &[0x2c, 0x10, 0x01][..]] {
                let frame = tester_frame(TpFrame::Single { data: request });
                let replies = replies_to(&mut host_bus, &frame).await;
                assert_eq!(replies.len(), 1);
                assert_eq!(replies[0].id.raw(), 0x612);
                assert_eq!(
                    replies[0].payload(),
                    &[0xf1, 0x03, 0x7f, 0x2c, 0x12, 0x00, 0x00, 0x00]
                );
            }
        } => {}
    }

    assert_eq!(emulator.state(), DdeState::Unconfigured);
    assert_eq!(emulator.anomalies().count(), 2);
    assert_eq!(emulator.anomalies().last(), Some(Anomaly::MalformedRequest));
}

#[tokio::test]
async fn test_unknown_single_pid_reads_as_zero() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let request = DdePidRequest { pid: 0xbeef }.encode().expect("encode failed");
            let replies = replies_to(&mut host_bus, &request).await;
            assert_eq!(replies.len(), 1);

            let reply = DdePidResponse::decode(&replies[0]).expect("not a PID reply");
            assert_eq!(reply.width(), 2);
            assert_eq!(reply.pid_value(), 0);
        } => {}
    }

    assert_eq!(emulator.anomalies().last(), Some(Anomaly::UnknownPid { pid: 0xbeef }));
}

#[tokio::test]
async fn test_unknown_pid_in_list_keeps_reply_positional() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = DdeEmulator::default();

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let reply = exchange(&mut host_bus, &[0x2c, 0x10, 0xbe, 0xef, 0x01, 0x2c]).await;
            assert_eq!(reply, vec![0x6c, 0x10, 0x00, 0x00, 0x79, 0xac]);

            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            assert!(host_bus.try_recv().is_none());
        } => {}
    }

    assert_eq!(emulator.anomalies().count(), 2);
}
