mod helpers {
    include!("../../helpers/mod.rs");
}
use helpers::{MockCanBus, MockTimer};

use ecu_emu::error::{ExchangeStage, MessageError, ModuleError, SessionError};
use ecu_emu::protocol::diagnostic::exchange::{DiagnosticClient, ExchangeTimeouts};
use ecu_emu::protocol::diagnostic::{
    continuation_frame, continuation_request, initial_frame, CAS_ID, TESTER_ID,
};
use ecu_emu::protocol::messages::{EgsGear, TerminalStatus};
use ecu_emu::infra::codec::traits::FrameRecord;
use ecu_emu::protocol::transport::traits::can_bus::CanBus;
use embassy_time::Duration;
use tokio::time::{sleep, Duration as TokioDuration, Instant};

const VIN_REPLY: [u8; 20] = [
    0x62, 0x10, 0x10, 0x57, 0x42, 0x41, 0x50, 0x4e, 0x37, 0x33, 0x35, 0x58, 0x39, 0x41, 0x32,
    0x36, 0x36, 0x33, 0x38, 0x36,
];

#[tokio::test]
async fn test_short_request_and_single_frame_reply() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let module = async {
        let request = module_bus.recv().await.expect("bus closed");
        assert_eq!(request.id.raw(), 0x6f1);
        assert_eq!(request.payload(), &[0x40, 0x02, 0x1a, 0x80, 0xff, 0xff, 0xff, 0xff]);

        let reply = initial_frame(CAS_ID, TESTER_ID, 2, &[0x5a, 0x80]);
        assert_eq!(reply.payload(), &[0xf1, 0x10, 0x02, 0x5a, 0x80, 0xff, 0xff, 0xff]);
        module_bus.send(&reply).await.expect("send failed");
    };

    let (_, exchange) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .request(CAS_ID, &[0x1a, 0x80])
            .await
    });
    let exchange = exchange.expect("exchange failed");
    assert_eq!(exchange.residual(), 0);
    assert_eq!(exchange.reply(), &[0x5a, 0x80]);

    // No continuation request for a complete reply.
    sleep(TokioDuration::from_millis(20)).await;
    assert!(module_bus.try_recv().is_none());
}

#[tokio::test]
async fn test_multi_frame_reply_after_continuation_request() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let module = async {
        module_bus.recv().await.expect("bus closed");
        let first = initial_frame(CAS_ID, TESTER_ID, VIN_REPLY.len() as u8, &VIN_REPLY[..5]);
        module_bus.send(&first).await.expect("send failed");

        let go_ahead = module_bus.recv().await.expect("bus closed");
        assert_eq!(go_ahead.payload(), continuation_request(TESTER_ID, CAS_ID).payload());
        assert_eq!(go_ahead.id.raw(), 0x6f1);
        assert_eq!(go_ahead.payload(), &[0x40, 0x30, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);

        for (index, chunk) in VIN_REPLY[5..].chunks(6).enumerate() {
            let frame = continuation_frame(CAS_ID, TESTER_ID, 0x21 + index as u8, chunk);
            module_bus.send(&frame).await.expect("send failed");
        }
    };

    let (_, exchange) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .request(CAS_ID, &[0x22, 0x10, 0x10])
            .await
    });
    let exchange = exchange.expect("exchange failed");
    assert!(exchange.is_complete());
    assert_eq!(exchange.reply(), &VIN_REPLY);
}

#[tokio::test]
async fn test_foreign_frames_are_discarded_while_waiting() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let module = async {
        module_bus.recv().await.expect("bus closed");
        let chatter = TerminalStatus.encode().expect("encode failed");
        module_bus.send(&chatter).await.expect("send failed");
        // Initial frame from another module.
        let other = initial_frame(0x00, TESTER_ID, 2, &[0x5a, 0x80]);
        module_bus.send(&other).await.expect("send failed");
        let reply = initial_frame(CAS_ID, TESTER_ID, 2, &[0x5a, 0x80]);
        module_bus.send(&reply).await.expect("send failed");
    };

    let (_, exchange) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .request(CAS_ID, &[0x1a, 0x80])
            .await
    });
    assert_eq!(exchange.expect("exchange failed").respondent(), CAS_ID);
}

#[tokio::test]
async fn test_echo_mismatch_is_reported() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let module = async {
        module_bus.recv().await.expect("bus closed");
        let reply = initial_frame(CAS_ID, TESTER_ID, 2, &[0x5a, 0x81]);
        module_bus.send(&reply).await.expect("send failed");
    };

    let (_, result) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .request(CAS_ID, &[0x1a, 0x80])
            .await
    });
    assert!(matches!(
        result,
        Err(SessionError::Message(MessageError::CommandEchoMismatch {
            index: 1,
            expected: 0x80,
            actual: 0x81
        }))
    ));
}

#[tokio::test]
async fn test_out_of_order_continuation_fails_exchange() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let module = async {
        module_bus.recv().await.expect("bus closed");
        let first = initial_frame(CAS_ID, TESTER_ID, VIN_REPLY.len() as u8, &VIN_REPLY[..5]);
        module_bus.send(&first).await.expect("send failed");
        module_bus.recv().await.expect("bus closed");
        let skipped = continuation_frame(CAS_ID, TESTER_ID, 0x22, &VIN_REPLY[11..17]);
        module_bus.send(&skipped).await.expect("send failed");
    };

    let (_, result) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .request(CAS_ID, &[0x22, 0x10, 0x10])
            .await
    });
    assert!(matches!(
        result,
        Err(SessionError::Message(MessageError::UnexpectedSequence {
            expected: 0x21,
            actual: 0x22
        }))
    ));
}

#[tokio::test]
async fn test_silent_module_times_out_after_one_second() {
    let (_module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;
    let timeouts = ExchangeTimeouts::default().with_reply(Duration::from_millis(1_000));

    let started = Instant::now();
    let result = DiagnosticClient::new(&mut host_bus, &mut timer)
        .with_timeouts(timeouts)
        .request(CAS_ID, &[0x1a, 0x80])
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(
        result,
        Err(SessionError::Module(ModuleError::Timeout {
            stage: ExchangeStage::InitialReply
        }))
    ));
    assert!(elapsed >= TokioDuration::from_millis(1_000));
    assert!(elapsed < TokioDuration::from_millis(1_500));
}

#[tokio::test]
async fn test_missing_continuation_times_out() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;
    let timeouts = ExchangeTimeouts::default().with_continuation(Duration::from_millis(200));

    let module = async {
        module_bus.recv().await.expect("bus closed");
        let first = initial_frame(CAS_ID, TESTER_ID, VIN_REPLY.len() as u8, &VIN_REPLY[..5]);
        module_bus.send(&first).await.expect("send failed");
        module_bus.recv().await.expect("bus closed");
    };

    let (_, result) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .with_timeouts(timeouts)
            .request(CAS_ID, &[0x22, 0x10, 0x10])
            .await
    });
    assert!(matches!(
        result,
        Err(SessionError::Module(ModuleError::Timeout {
            stage: ExchangeStage::Continuation
        }))
    ));
}

#[tokio::test]
async fn test_long_request_without_go_ahead_times_out() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;
    let timeouts = ExchangeTimeouts::default().with_continuation(Duration::from_millis(200));
    let command = [0x2e, 0x10, 0x10, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

    let result = DiagnosticClient::new(&mut host_bus, &mut timer)
        .with_timeouts(timeouts)
        .send_request(CAS_ID, &command)
        .await;
    assert!(matches!(
        result,
        Err(SessionError::Module(ModuleError::Timeout {
            stage: ExchangeStage::ContinuationRequest
        }))
    ));

    let first = module_bus.recv().await.expect("bus closed");
    assert_eq!(first.payload(), &[0x40, 0x10, 0x09, 0x2e, 0x10, 0x10, 0x01, 0x02]);
    assert!(module_bus.try_recv().is_none());
}

#[tokio::test]
async fn test_expect_record_skips_other_frames() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let chatter = TerminalStatus.encode().expect("encode failed");
    let gear = EgsGear { selected_gear: 0x78 }
        .encode()
        .expect("encode failed");
    module_bus.send(&chatter).await.expect("send failed");
    module_bus.send(&gear).await.expect("send failed");

    let mut client = DiagnosticClient::new(&mut host_bus, &mut timer);
    let record: EgsGear = client.expect_record(200).await.expect("no gear frame");
    assert_eq!(record.selected_gear, 0x78);

    let missing = client.expect_record::<EgsGear>(100).await;
    assert!(matches!(
        missing,
        Err(SessionError::Module(ModuleError::Timeout {
            stage: ExchangeStage::ExpectedFrame
        }))
    ));
}

#[tokio::test]
async fn test_long_reply_counts_sequences_past_0x2f() {
    let (mut module_bus, mut host_bus) = MockCanBus::create_pair();
    let mut timer = MockTimer;

    let mut reply = [0x55u8; 120];
    reply[..3].copy_from_slice(&[0x62, 0x10, 0x10]);
    // Continuation 0x30 carries the same bytes as a continuation request.
    reply[5 + 15 * 6..5 + 16 * 6].copy_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);

    let module = async {
        module_bus.recv().await.expect("bus closed");
        let first = initial_frame(CAS_ID, TESTER_ID, reply.len() as u8, &reply[..5]);
        module_bus.send(&first).await.expect("send failed");
        module_bus.recv().await.expect("bus closed");

        for (index, chunk) in reply[5..].chunks(6).enumerate() {
            let frame = continuation_frame(CAS_ID, TESTER_ID, 0x21 + index as u8, chunk);
            module_bus.send(&frame).await.expect("send failed");
        }
    };

    let (_, exchange) = tokio::join!(module, async {
        DiagnosticClient::new(&mut host_bus, &mut timer)
            .request(CAS_ID, &[0x22, 0x10, 0x10])
            .await
    });
    let exchange = exchange.expect("exchange failed");
    assert!(exchange.is_complete());
    assert_eq!(exchange.reply(), &reply[..]);
}
