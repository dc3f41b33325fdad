mod helpers {
    include!("../../helpers/mod.rs");
}
use helpers::{MockCanBus, MockTimer};

use ecu_emu::error::{ExchangeStage, ModuleError, SessionError};
use ecu_emu::protocol::diagnostic::exchange::{DiagnosticClient, ExchangeTimeouts, ScriptStep};
use ecu_emu::protocol::diagnostic::{continuation_request, BROADCAST_ID, CAS_ID, JBE_ID, TESTER_ID};
use ecu_emu::protocol::emulators::cas_jbe::{CasJbeEmulator, CatalogEntry, JBE_CATALOG};
use ecu_emu::protocol::emulators::{Anomaly, Emulator};
use ecu_emu::protocol::transport::traits::can_bus::CanBus;
use embassy_time::Duration;
use tokio::time::{timeout, Duration as TokioDuration};

static SHORT_CATALOG: [CatalogEntry; 2] = [
    CatalogEntry::new(&[0x1a, 0x80], &[0x5a, 0x80]),
    CatalogEntry::new(
        &[0x2e, 0x10, 0x10, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
        &[0x6e, 0x10, 0x10, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06],
    ),
];

/// Feed every frame of `bus` to `emulator` until the bus closes.
async fn serve<E: Emulator>(emulator: &mut E, mut bus: MockCanBus) {
    let mut timer = MockTimer;
    while let Ok(frame) = bus.recv().await {
        emulator
            .on_frame(&mut bus, &mut timer, &frame)
            .await
            .expect("emulator failed");
    }
}

#[tokio::test]
async fn test_identification_fits_initial_frame() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::new(&SHORT_CATALOG, &JBE_CATALOG);
    let mut timer = MockTimer;

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let exchange = {
                let mut client = DiagnosticClient::new(&mut host_bus, &mut timer);
                client.request(CAS_ID, &[0x1a, 0x80]).await.expect("exchange failed")
            };
            assert_eq!(exchange.respondent(), CAS_ID);
            assert_eq!(exchange.declared_len(), 2);
            assert_eq!(exchange.residual(), 0);
            assert_eq!(exchange.reply(), &[0x5a, 0x80]);
            assert!(exchange.data().is_empty());

            // Nothing follows a reply without residual.
            tokio::time::sleep(TokioDuration::from_millis(50)).await;
            assert!(host_bus.try_recv().is_none());
        } => {}
    }

    assert_eq!(emulator.anomalies().count(), 0);
    assert_eq!(emulator.pending_replies(), 0);
}

#[tokio::test]
async fn test_vin_reply_spans_continuations() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::default();
    let mut timer = MockTimer;

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let mut client = DiagnosticClient::new(&mut host_bus, &mut timer);
            let exchange = client
                .request(CAS_ID, &[0x22, 0x10, 0x10])
                .await
                .expect("exchange failed");

            assert_eq!(exchange.declared_len(), 20);
            assert!(exchange.is_complete());
            assert_eq!(exchange.data(), b"WBAPN735X9A266386");
        } => {}
    }
}

#[tokio::test]
async fn test_long_request_waits_for_continuation_request() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::new(&SHORT_CATALOG, &JBE_CATALOG);
    let mut timer = MockTimer;
    let command = [0x2e, 0x10, 0x10, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let mut client = DiagnosticClient::new(&mut host_bus, &mut timer);
            let exchange = client.request(CAS_ID, &command).await.expect("exchange failed");
            assert_eq!(exchange.declared_len(), 9);
            assert!(exchange.data().is_empty());
        } => {}
    }
}

#[tokio::test]
async fn test_broadcast_answered_by_cas_then_jbe() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::default();
    let mut timer = MockTimer;

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let mut client = DiagnosticClient::new(&mut host_bus, &mut timer);
            client
                .send_request(BROADCAST_ID, &[0x1a, 0x80])
                .await
                .expect("send failed");

            let cas = client.receive_reply(CAS_ID, &[0x1a, 0x80]).await.expect("no CAS reply");
            let jbe = client.receive_reply(JBE_ID, &[0x1a, 0x80]).await.expect("no JBE reply");

            assert_eq!(cas.declared_len(), 60);
            assert_eq!(jbe.declared_len(), 31);
            assert_eq!(&jbe.data()[..4], &[0x00, 0x00, 0x09, 0x18]);
        } => {}
    }

    assert_eq!(emulator.pending_replies(), 0);
}

#[tokio::test]
async fn test_full_bench_script() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::default();
    let mut timer = MockTimer;

    let steps = [
        ScriptStep { recipient: CAS_ID, command: &[0x1a, 0x80], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x22, 0x10, 0x10], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x22, 0x3f, 0x00], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x22, 0x3f, 0x01], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x22, 0x3f, 0x02], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x22, 0x3f, 0x03], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x22, 0x3f, 0x04], respondents: &[CAS_ID] },
        ScriptStep { recipient: CAS_ID, command: &[0x30, 0x01, 0x01], respondents: &[CAS_ID] },
        ScriptStep {
            recipient: BROADCAST_ID,
            command: &[0x1a, 0x80],
            respondents: &[CAS_ID, JBE_ID],
        },
    ];

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let mut client = DiagnosticClient::new(&mut host_bus, &mut timer);
            let replies = client.run_script(&steps).await.expect("script failed");
            assert_eq!(replies, 10);
        } => {}
    }

    assert_eq!(emulator.anomalies().count(), 0);
}

#[tokio::test]
async fn test_unknown_command_times_out_and_is_recorded() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::default();
    let mut timer = MockTimer;

    tokio::select! {
        _ = serve(&mut emulator, dut_bus) => panic!("Emulator stopped"),
        _ = async {
            let mut client = DiagnosticClient::new(&mut host_bus, &mut timer)
                .with_timeouts(ExchangeTimeouts::default().with_reply(Duration::from_millis(200)));
            let result = client.request(CAS_ID, &[0x22, 0x99, 0x99]).await;
            assert!(matches!(
                result,
                Err(SessionError::Module(ModuleError::Timeout {
                    stage: ExchangeStage::InitialReply
                }))
            ));
        } => {}
    }

    assert_eq!(emulator.anomalies().count(), 1);
    assert_eq!(
        emulator.anomalies().last(),
        Some(Anomaly::UnknownCommand { module: CAS_ID })
    );
}

#[tokio::test]
async fn test_continuation_request_without_pending_reply() {
    let (dut_bus, mut host_bus) = MockCanBus::create_pair();
    let mut emulator = CasJbeEmulator::default();

    let go_ahead = continuation_request(TESTER_ID, JBE_ID);
    host_bus.send(&go_ahead).await.expect("send failed");
    drop(host_bus);

    timeout(TokioDuration::from_secs(1), serve(&mut emulator, dut_bus))
        .await
        .expect("emulator did not stop");

    assert_eq!(
        emulator.anomalies().last(),
        Some(Anomaly::NothingPending { module: JBE_ID })
    );
}
