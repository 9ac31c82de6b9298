//! Drift soak: run a producer and a consumer on two different clocks against
//! one `SlotRing` and report what the ring did about it.
//!
//! ```text
//! cargo run -p slotring --bin soak -- --producer-us 900 --consumer-us 1000 --duration-ms 3000
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::Serialize;
use slotring::{DiagnosticsSnapshot, RingConfig, SlotConsumer, SlotProducer, SlotRing};
use tracing::info;

/// Sequence number + its complement, so torn or misplaced slots are detectable.
const HEADER_BYTES: usize = 16;

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    slot_size: Option<usize>,
    num_slots: Option<usize>,
    producer_period: Duration,
    consumer_period: Duration,
    duration: Duration,
    blocking: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsumerReport {
    fresh_reads: u64,
    repeated_reads: u64,
    order_violations: u64,
    corrupt_slots: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    config: RingConfig,
    mode: &'static str,
    producer_period_us: u128,
    consumer_period_us: u128,
    elapsed_ms: u128,
    final_occupancy: usize,
    consumer: ConsumerReport,
    ring: DiagnosticsSnapshot,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotring=info,soak=info".into()),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("soak failed: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => RingConfig::load(path)
            .with_context(|| format!("loading ring config {}", path.display()))?,
        None => RingConfig::default(),
    };
    if let Some(slot_size) = args.slot_size {
        config.slot_size = slot_size;
    }
    if let Some(num_slots) = args.num_slots {
        config.num_slots = num_slots;
    }
    if config.slot_size < HEADER_BYTES {
        bail!("slot size must be at least {HEADER_BYTES} bytes for the soak payload");
    }

    let ring = SlotRing::with_config(config.clone())?;
    info!(
        slot_size = config.slot_size,
        num_slots = config.num_slots,
        producer_us = args.producer_period.as_micros() as u64,
        consumer_us = args.consumer_period.as_micros() as u64,
        "soak starting"
    );

    let (producer, consumer) = ring.split();
    let (stop_tx, stop_rx) = bounded::<()>(0);

    let started = Instant::now();
    let producer_period = args.producer_period;
    let writer = thread::spawn(move || produce(producer, producer_period, stop_rx));

    let consumer_period = args.consumer_period;
    let duration = args.duration;
    let blocking = args.blocking;
    let reader =
        thread::spawn(move || consume(consumer, consumer_period, duration, blocking));

    let (consumer, report) = reader
        .join()
        .map_err(|_| anyhow!("consumer thread panicked"))?;
    drop(stop_tx);
    let _producer = writer
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))??;

    let ring = consumer.ring();
    let summary = Summary {
        config,
        mode: if blocking { "blocking" } else { "nonBlocking" },
        producer_period_us: producer_period.as_micros(),
        consumer_period_us: consumer_period.as_micros(),
        elapsed_ms: started.elapsed().as_millis(),
        final_occupancy: ring.occupancy(),
        consumer: report,
        ring: ring.diagnostics_snapshot(),
    };

    info!(
        overflow_resets = summary.ring.overflow_resets,
        repeats = summary.ring.repeats_served,
        "soak finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn produce(
    mut producer: SlotProducer,
    period: Duration,
    stop_rx: Receiver<()>,
) -> anyhow::Result<SlotProducer> {
    let mut slot = vec![0u8; producer.ring().slot_size()];
    let mut seq = 0u64;
    loop {
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                slot[..8].copy_from_slice(&seq.to_le_bytes());
                slot[8..HEADER_BYTES].copy_from_slice(&(!seq).to_le_bytes());
                producer.write_slot(&slot)?;
                seq += 1;
            }
            _ => return Ok(producer),
        }
    }
}

fn consume(
    mut consumer: SlotConsumer,
    period: Duration,
    duration: Duration,
    blocking: bool,
) -> (SlotConsumer, ConsumerReport) {
    let mut out = vec![0u8; consumer.ring().slot_size()];
    let mut report = ConsumerReport {
        fresh_reads: 0,
        repeated_reads: 0,
        order_violations: 0,
        corrupt_slots: 0,
    };
    let mut last_seq: Option<u64> = None;
    let deadline = Instant::now() + duration;

    while Instant::now() < deadline {
        let fresh = if blocking {
            consumer.read_slot(&mut out).is_ok()
        } else {
            matches!(consumer.read_last_slot_non_blocking(&mut out), Ok(o) if o.is_fresh())
        };

        if fresh {
            report.fresh_reads += 1;
            match decode_seq(&out) {
                Some(seq) => {
                    if last_seq.is_some_and(|prev| seq <= prev) {
                        report.order_violations += 1;
                    }
                    last_seq = Some(seq);
                }
                None => report.corrupt_slots += 1,
            }
        } else {
            report.repeated_reads += 1;
        }

        thread::sleep(period);
    }

    (consumer, report)
}

fn decode_seq(slot: &[u8]) -> Option<u64> {
    let seq = u64::from_le_bytes(slot.get(..8)?.try_into().ok()?);
    let check = u64::from_le_bytes(slot.get(8..HEADER_BYTES)?.try_into().ok()?);
    (check == !seq).then_some(seq)
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        slot_size: None,
        num_slots: None,
        producer_period: Duration::from_micros(1_000),
        consumer_period: Duration::from_micros(1_000),
        duration: Duration::from_millis(2_000),
        blocking: false,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --config");
                };
                args.config = Some(PathBuf::from(v));
            }
            "--slot-size" => args.slot_size = Some(next_number(&mut it, "--slot-size")? as usize),
            "--slots" => args.num_slots = Some(next_number(&mut it, "--slots")? as usize),
            "--producer-us" => {
                args.producer_period = Duration::from_micros(next_number(&mut it, "--producer-us")?)
            }
            "--consumer-us" => {
                args.consumer_period = Duration::from_micros(next_number(&mut it, "--consumer-us")?)
            }
            "--duration-ms" => {
                args.duration = Duration::from_millis(next_number(&mut it, "--duration-ms")?)
            }
            "--blocking" => args.blocking = true,
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p slotring --bin soak -- \\
  [--config <ring.json>] [--slot-size <bytes>] [--slots <n>] \\
  [--producer-us <n>] [--consumer-us <n>] [--duration-ms <n>] [--blocking]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(args)
}

fn next_number(it: &mut impl Iterator<Item = String>, name: &str) -> anyhow::Result<u64> {
    let Some(v) = it.next() else {
        bail!("missing value for {name}");
    };
    v.parse::<u64>()
        .map_err(|_| anyhow!("invalid value for {name}: {v}"))
}
