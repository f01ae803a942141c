//! Stress tests for the property codec
//!
//! Random buffers must never panic. The heavy variants run with:
//! cargo test --release stress -- --ignored

use elmetrics::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

const FORMATS: [NumericFormat; 6] = [
    NumericFormat::UInt8,
    NumericFormat::Int8,
    NumericFormat::UInt16,
    NumericFormat::Int16,
    NumericFormat::UInt32,
    NumericFormat::Int32,
];

fn random_buffer(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(0..=max_len);
    (0..len).map(|_| rng.gen()).collect()
}

#[test]
fn stress_random_scalars_never_panic() {
    let mut rng = StdRng::seed_from_u64(0x0287);

    for _ in 0..10_000 {
        let buffer = random_buffer(&mut rng, 8);
        for format in FORMATS {
            let value = PropertyCodec::decode(&buffer, format);
            match PropertyCodec::try_decode(&buffer, format) {
                Ok(decoded) => assert_eq!(decoded, value),
                Err(_) => assert_eq!(value, MALFORMED_SENTINEL),
            }
        }
    }
}

#[test]
fn stress_random_arrays_respect_header() {
    let mut rng = StdRng::seed_from_u64(0xB7);

    for _ in 0..10_000 {
        let buffer = random_buffer(&mut rng, 64);
        for format in FORMATS {
            let Ok(slots) = PropertyCodec::try_decode_array(&buffer, format) else {
                assert!(PropertyCodec::decode_array(&buffer, format).is_empty());
                continue;
            };
            let announced = (buffer[1] - buffer[0]) as usize + 1;
            let present = (buffer.len() - 2) / format.width();
            assert_eq!(slots.len(), announced.min(present));
        }
    }
}

#[test]
fn stress_random_payloads_through_poller() {
    let mut rng = StdRng::seed_from_u64(42);
    let registry = std::sync::Arc::new(ClassDecoderRegistry::builtin());
    let poller = DevicePoller::new(registry.clone(), PollerConfig::default());

    let mut transport = StaticTransport::new();
    let mut devices = Vec::new();
    for (i, (class, rules)) in registry.iter().enumerate() {
        let device = Device::new(format!("10.1.0.{}", i), *class);
        for rule in rules {
            transport.insert_response(&device, rule.property, Ok(random_buffer(&mut rng, 16)));
            if let Some((unit, _)) = rule.scale.coded_property() {
                transport.insert_response(&device, unit, Ok(random_buffer(&mut rng, 2)));
            }
        }
        transport.insert_device(device.clone());
        devices.push(device);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let outcome = runtime.block_on(poller.poll_cycle(&transport, &devices));

    assert_eq!(outcome.stats.devices, devices.len());
    assert!(outcome.samples.iter().all(|s| s.value.is_finite()));
}

#[test]
#[ignore] // Run manually with --ignored
fn stress_test_decoding_rate() {
    let mut rng = StdRng::seed_from_u64(7);
    let buffers: Vec<Vec<u8>> = (0..1000).map(|_| random_buffer(&mut rng, 4)).collect();

    let iterations = 1_000;
    let start = Instant::now();
    let mut checksum = 0i64;

    for _ in 0..iterations {
        for buffer in &buffers {
            checksum = checksum.wrapping_add(PropertyCodec::decode(buffer, NumericFormat::UInt32));
        }
    }

    let elapsed = start.elapsed();
    let total = iterations * buffers.len();
    let rate = total as f64 / elapsed.as_secs_f64();

    println!("Decoded {} buffers in {:?} (checksum {})", total, elapsed, checksum);
    println!("Rate: {:.0} buffers/second", rate);

    assert!(
        rate > 1_000_000.0,
        "Should decode at least 1M buffers/s, got {:.0}",
        rate
    );
}
