//! BTHome relay — ESP32 firmware
//!
//! Passively scans for BTHome BLE sensors and prints every decoded
//! advertisement as a JSON report block on serial.
//!
//! Three pieces share the executor:
//!   1. BLE stack runner, which calls `BthomeScanHandler` with advertisement reports
//!   2. scan round loop, which owns the trouble-host scan session
//!   3. consumer task, which drains the mailbox under a scan pause

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use bthome_relay::bthome::BthomeDecoder;
use bthome_relay::comm::LogSink;
use bthome_relay::decoder::{self, BindKey};
use bthome_relay::lifecycle::{ScanController, ScanEndReason, ScanParams, ScanRadio, ScanState};
use bthome_relay::mailbox::Mailbox;
use bthome_relay::protocol::VERSION;
use bthome_relay::scanner::{self, AdvertisementEvent};
use bthome_relay::{board, consumer, defaults};

// ── Radio glue ───────────────────────────────────────────────────────

/// Requests from the controller to the scan round loop.
#[derive(Clone, Copy)]
enum ScanCommand {
    Start(ScanParams),
    Stop,
}

/// Open while the controller is `Active`. The advertisement handler drops
/// reports while it is closed, so `stop()` takes effect immediately even
/// though the scan session is torn down later by the round loop.
static SCAN_GATE: AtomicBool = AtomicBool::new(false);

/// Latest controller request; a newer request replaces an unseen one.
static SCAN_CMD: Signal<CriticalSectionRawMutex, ScanCommand> = Signal::new();

/// `ScanRadio` backed by the trouble-host scanner running in the round loop.
struct SignalRadio;

impl ScanRadio for SignalRadio {
    type Error = core::convert::Infallible;

    fn start(&mut self, params: &ScanParams) -> Result<(), Self::Error> {
        SCAN_GATE.store(true, Ordering::Release);
        SCAN_CMD.signal(ScanCommand::Start(*params));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        SCAN_GATE.store(false, Ordering::Release);
        SCAN_CMD.signal(ScanCommand::Stop);
        Ok(())
    }
}

// ── Shared state ─────────────────────────────────────────────────────

/// Latest decoded reading, written by the scan handler, drained by the consumer
static MAILBOX: Mailbox<CriticalSectionRawMutex> = Mailbox::new();

/// Scan lifecycle, driven by the consumer task and the round loop
static CONTROLLER: ScanController<CriticalSectionRawMutex, SignalRadio> =
    ScanController::new(SignalRadio, ScanParams::new());

/// Readings written to serial, for the status line
static DELIVERED_COUNT: AtomicU32 = AtomicU32::new(0);

// ── BLE scan event handler ──────────────────────────────────────────

/// EventHandler for BLE advertisement reports from trouble-host.
///
/// Called synchronously from the runner — must not block. Filters, decodes
/// and publishes; nothing else runs here.
struct BthomeScanHandler {
    decoder: BthomeDecoder,
    key: Option<BindKey>,
}

impl EventHandler for BthomeScanHandler {
    fn on_adv_reports(&self, mut it: LeAdvReportsIter<'_>) {
        while let Some(Ok(report)) = it.next() {
            if !SCAN_GATE.load(Ordering::Acquire) {
                return;
            }
            let Some(mac) = scanner::mac_from_hci(report.addr.raw()) else {
                continue;
            };
            let event = AdvertisementEvent::parse(mac, report.rssi, report.data);
            decoder::process_advertisement(&event, &self.decoder, self.key.as_ref(), &MAILBOX);
        }
    }
}

/// Wait out one scan round: until its duration elapses or the controller
/// asks for a stop.
async fn scan_round(params: &ScanParams) -> ScanEndReason {
    let deadline = if params.duration_ms > 0 {
        Some(Instant::now() + Duration::from_millis(params.duration_ms.into()))
    } else {
        None
    };

    loop {
        let cmd = match deadline {
            Some(at) => match select(Timer::at(at), SCAN_CMD.wait()).await {
                Either::First(()) => return ScanEndReason::Completed,
                Either::Second(cmd) => cmd,
            },
            None => SCAN_CMD.wait().await,
        };
        match cmd {
            ScanCommand::Stop => return ScanEndReason::Cancelled,
            // Stop and start both happened before we looked; keep scanning
            ScanCommand::Start(_) => {}
        }
    }
}

fn bind_key_from_env() -> Option<BindKey> {
    let hex = defaults::BIND_KEY_HEX?;
    match decoder::parse_bind_key(hex) {
        Ok(key) => key,
        Err(e) => {
            log::warn!("Ignoring BTHOME_BIND_KEY: {}", e);
            None
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: 64 * 1024);

    // Start the RTOS — requires timer + software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!(
        "BTHome relay v{} starting on {} ({})",
        VERSION,
        board::BOARD_NAME,
        board::CHIP
    );

    let key = bind_key_from_env();
    if key.is_some() {
        log::info!("Bind key configured, but the built-in decoder drops encrypted payloads");
    }

    spawner.spawn(consumer_task()).unwrap();
    spawner.spawn(status_task()).unwrap();

    // ── BLE radio initialization ───────────────────────────────────────

    let connector =
        esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
            .expect("BLE connector init failed");

    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let address = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xab]);

    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        central, mut runner, ..
    } = stack.build();

    log::info!("BLE radio initialized");

    let scan_handler = BthomeScanHandler {
        decoder: BthomeDecoder::new(),
        key,
    };

    let params = CONTROLLER.params();
    log::info!("Scan config: {}", params);
    // trouble-host reports every advertisement and has no result cap
    if params.duplicate_filter || params.max_results != 0 {
        log::warn!("Duplicate filter and result limit are not supported by the BLE stack, ignored");
    }

    if CONTROLLER.start() == ScanState::Active {
        log::info!("BLE scan started");
    }

    let _ = embassy_futures::join::join(
        // ── Runner: drives the BLE stack ────────────────────────────────
        async {
            loop {
                if let Err(e) = runner.run_with_handler(&scan_handler).await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        // ── Round loop: one scan session per controller start ───────────
        async {
            let mut scanner = trouble_host::scan::Scanner::new(central);

            loop {
                let params = loop {
                    if let ScanCommand::Start(params) = SCAN_CMD.wait().await {
                        break params;
                    }
                };

                let config = ScanConfig {
                    active: params.active,
                    interval: Duration::from_millis(params.interval_ms.into()),
                    window: Duration::from_millis(params.window_ms.into()),
                    ..Default::default()
                };

                let reason = match scanner.scan(&config).await {
                    // Session stays alive for the round, dropping it stops the radio
                    Ok(_session) => scan_round(&params).await,
                    Err(e) => {
                        log::warn!("BLE scan failed to start: {:?}", e);
                        Timer::after(Duration::from_secs(1)).await;
                        ScanEndReason::Failed
                    }
                };

                CONTROLLER.on_scan_ended(reason);
            }
        },
    )
    .await;
}

/// Consumer task — polls the mailbox and reports readings to serial.
#[embassy_executor::task]
async fn consumer_task() {
    log::info!("Consumer task started");

    let mut sink = LogSink::new();

    loop {
        consumer::poll_once(&CONTROLLER, &MAILBOX, &mut sink);
        DELIVERED_COUNT.store(sink.delivered, Ordering::Relaxed);
        Timer::after(Duration::from_millis(defaults::POLL_INTERVAL_MS)).await;
    }
}

/// Periodic status reporting task
#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(defaults::STATUS_INTERVAL_SECS)).await;

        let uptime_secs = Instant::now().as_secs();
        let stats = MAILBOX.stats();

        log::info!(
            "status: scanning={} uptime={}s delivered={} published={} replaced={} restarts={} heap_free={}",
            CONTROLLER.state() == ScanState::Active,
            uptime_secs,
            DELIVERED_COUNT.load(Ordering::Relaxed),
            stats.published,
            stats.replaced,
            CONTROLLER.restarts(),
            esp_alloc::HEAP.free(),
        );
    }
}
