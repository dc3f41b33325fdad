mod helpers {
    include!("../../../helpers/mod.rs");
}
use helpers::{MockCanBus, MockTimer};

use ecu_emu::error::{ExchangeStage, FramerError, ModuleError};
use ecu_emu::protocol::transport::can_frame::CanFrame;
use ecu_emu::protocol::transport::iso_tp::framer::{FramerEvent, TpConfig, TpFramer};
use ecu_emu::protocol::transport::iso_tp::{FlowStatus, TpAddressing, TpFrame, TpPdu};
use ecu_emu::protocol::transport::traits::can_bus::CanBus;
use tokio::time::{sleep, Duration, Instant};

const TESTER: u8 = 0xf1;
const MODULE: u8 = 0x12;

fn flow(status: FlowStatus, block_size: u8) -> CanFrame {
    TpFrame::FlowControl {
        status,
        block_size,
        separation_time: 0,
    }
    .to_can_frame(TpAddressing::Addressed, MODULE, TESTER)
}

fn sequence_of(frame: &CanFrame) -> u8 {
    match TpPdu::parse(TpAddressing::Addressed, frame).expect("not a segmentation frame").frame {
        TpFrame::Consecutive { sequence, .. } => sequence,
        other => panic!("Expected a consecutive frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_long_payload_between_framers() {
    let (mut module_bus, mut tester_bus) = MockCanBus::create_pair();
    let payload: Vec<u8> = (0..100u8).collect();

    let mut module = TpFramer::<2>::new(TpConfig::new(MODULE));
    let mut module_timer = MockTimer;
    let receive = async {
        loop {
            let frame = module_bus.recv().await.expect("bus closed");
            if let FramerEvent::Payload(reply) = module
                .on_frame(&mut module_bus, &mut module_timer, &frame)
                .await
                .expect("reassembly failed")
            {
                return reply;
            }
        }
    };

    let mut tester = TpFramer::<1>::new(TpConfig::new(TESTER));
    let mut timer = MockTimer;
    let transmit = tester.transmit(&mut tester_bus, &mut timer, MODULE, &payload);

    let (received, sent) = tokio::join!(receive, transmit);
    sent.expect("transmit failed");
    assert_eq!(received.sender, TESTER);
    assert_eq!(received.as_slice(), payload.as_slice());
}

#[tokio::test]
async fn test_block_size_paces_consecutive_frames() {
    let (mut module_bus, mut tester_bus) = MockCanBus::create_pair();
    let payload = [0xa5u8; 30];
    let mut tester = TpFramer::<1>::new(TpConfig::new(TESTER));
    let mut timer = MockTimer;

    let peer = async {
        let first = module_bus.recv().await.expect("bus closed");
        assert_eq!(&first.payload()[..3], &[MODULE, 0x10, 30]);

        module_bus.send(&flow(FlowStatus::Continue, 2)).await.expect("send failed");
        assert_eq!(sequence_of(&module_bus.recv().await.expect("bus closed")), 1);
        assert_eq!(sequence_of(&module_bus.recv().await.expect("bus closed")), 2);
        sleep(Duration::from_millis(50)).await;
        assert!(module_bus.try_recv().is_none());

        module_bus.send(&flow(FlowStatus::Continue, 0)).await.expect("send failed");
        for expected in 3..=5 {
            assert_eq!(sequence_of(&module_bus.recv().await.expect("bus closed")), expected);
        }
    };

    let (_, sent) = tokio::join!(
        peer,
        tester.transmit(&mut tester_bus, &mut timer, MODULE, &payload)
    );
    sent.expect("transmit failed");
    assert!(!tester.is_transmitting());
}

#[tokio::test]
async fn test_flow_wait_holds_transfer() {
    let (mut module_bus, mut tester_bus) = MockCanBus::create_pair();
    let payload = [0x11u8; 12];
    let mut tester = TpFramer::<1>::new(TpConfig::new(TESTER));
    let mut timer = MockTimer;

    let peer = async {
        module_bus.recv().await.expect("bus closed");
        module_bus.send(&flow(FlowStatus::Wait, 0)).await.expect("send failed");
        sleep(Duration::from_millis(50)).await;
        assert!(module_bus.try_recv().is_none());

        module_bus.send(&flow(FlowStatus::Continue, 0)).await.expect("send failed");
        assert_eq!(sequence_of(&module_bus.recv().await.expect("bus closed")), 1);
        assert_eq!(sequence_of(&module_bus.recv().await.expect("bus closed")), 2);
    };

    let (_, sent) = tokio::join!(
        peer,
        tester.transmit(&mut tester_bus, &mut timer, MODULE, &payload)
    );
    sent.expect("transmit failed");
}

#[tokio::test]
async fn test_flow_abort_cancels_transfer() {
    let (mut module_bus, mut tester_bus) = MockCanBus::create_pair();
    let payload = [0x22u8; 40];
    let mut tester = TpFramer::<1>::new(TpConfig::new(TESTER));
    let mut timer = MockTimer;

    let peer = async {
        module_bus.recv().await.expect("bus closed");
        module_bus.send(&flow(FlowStatus::Abort, 0)).await.expect("send failed");
    };

    let (_, sent) = tokio::join!(
        peer,
        tester.transmit(&mut tester_bus, &mut timer, MODULE, &payload)
    );
    assert!(matches!(
        sent,
        Err(FramerError::TransferAborted { recipient: MODULE })
    ));
    assert!(!tester.is_transmitting());
    assert!(module_bus.try_recv().is_none());
}

#[tokio::test]
async fn test_silent_peer_times_out_after_one_second() {
    let (_module_bus, mut tester_bus) = MockCanBus::create_pair();
    let payload = [0x33u8; 14];
    let mut tester = TpFramer::<1>::new(TpConfig::new(TESTER));
    let mut timer = MockTimer;

    let started = Instant::now();
    let result = tester.transmit(&mut tester_bus, &mut timer, MODULE, &payload).await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(FramerError::Module(ModuleError::Timeout {
            stage: ExchangeStage::FlowControl
        }))
    ));
    assert!(elapsed >= Duration::from_millis(1000));
    assert!(elapsed < Duration::from_millis(1500));
    assert!(!tester.is_transmitting());
}
