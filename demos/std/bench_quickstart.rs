//! # Bench Quickstart
//!
//! Walks through the building blocks of ecu-emu without a bus:
//! - Encode and decode telemetry frames
//! - Answer a diagnostic request from a body-module catalog
//! - Watch module status frames and the text console
//!
//! ```bash
//! cargo run --example bench_quickstart
//! ```

use ecu_emu::infra::codec::traits::FrameRecord;
use ecu_emu::protocol::diagnostic::responder::{DiagResponder, DiagResponse, RequestEvent};
use ecu_emu::protocol::diagnostic::{short_request, CAS_ID, TESTER_ID};
use ecu_emu::protocol::emulators::cas_jbe::CAS;
use ecu_emu::protocol::messages::{DdeRpmTps, EgsGear, Lights, SignOn};
use ecu_emu::protocol::monitoring::console::{ConsoleAssembler, CONSOLE_ID};
use ecu_emu::protocol::monitoring::status::{ModuleStatus, StatusReport};
use ecu_emu::protocol::transport::can_frame::CanFrame;
use ecu_emu::protocol::transport::can_id::CanId;

static LISTEN: [u8; 1] = [CAS_ID];

fn main() {
    println!("=== ecu-emu Bench Quickstart ===\n");

    // ======================================================================
    // 1. Telemetry frames
    // ======================================================================
    println!("1. Telemetry frames");

    let rpm = DdeRpmTps { tps: 0x40, rpm: 3_200 };
    let frame = rpm.encode().expect("Failed to encode rpm frame");
    println!("   0x{:03x} {:02x?}", frame.id.raw(), frame.payload());

    let decoded = DdeRpmTps::decode(&frame).expect("Failed to decode rpm frame");
    println!("   rpm={} tps={}", decoded.rpm, decoded.tps);

    let lights = Lights::new(true, false, false).encode().expect("Failed to encode lights");
    println!("   lights {:02x?}", lights.payload());

    let gear = EgsGear { selected_gear: 0x78 }.encode().expect("Failed to encode gear");
    println!("   gear {:02x?}\n", gear.payload());

    // ======================================================================
    // 2. Diagnostic request answered from the CAS catalog
    // ======================================================================
    println!("2. Diagnostic request");

    let request = short_request(TESTER_ID, CAS_ID, &[0x22, 0x10, 0x10])
        .expect("Command fits a short request");
    println!("   tester -> 0x{:03x} {:02x?}", request.id.raw(), request.payload());

    let mut responder = DiagResponder::new(&LISTEN);
    if let Ok(RequestEvent::Request(received)) = responder.on_frame(&request) {
        match CAS.lookup(received.command()) {
            Some(entry) => {
                let mut reply = DiagResponse::new(CAS_ID, received.requester, entry.reply);
                while let Some(frame) = reply.next_frame() {
                    println!("   cas -> 0x{:03x} {:02x?}", frame.id.raw(), frame.payload());
                }
            }
            None => println!("   CAS has no answer"),
        }
    }
    println!();

    // ======================================================================
    // 3. Status monitoring
    // ======================================================================
    println!("3. Status monitoring");

    let mut status = ModuleStatus::new();
    let sign_on = SignOn {
        reason_code: 0x01,
        module_id: 0x0000_2a01,
        status_code: 0x00,
        sw_version: 0x0103,
    }
    .encode()
    .expect("Failed to encode sign-on");

    if let Some(StatusReport::SignOn(report)) = status.update(&sign_on) {
        println!(
            "   module {:08x} restarted: {}",
            report.module_id,
            report.reason().unwrap_or("unknown reason")
        );
    }
    println!("   frames={} resets={}", status.rx_count, status.module_resets);

    let mut console = ConsoleAssembler::new();
    for chunk in [&b"boot ok\0"[..], &b"can up\0"[..]] {
        let frame = CanFrame::new(CanId::extended(CONSOLE_ID), chunk);
        console.push_frame(&frame, |line| {
            println!("   console: {}", line.as_str().unwrap_or("<binary>"));
        });
    }
    println!("   pending: {:?}", core::str::from_utf8(console.pending()));

    println!("\n=== Done ===");
}
