//! Benchmarks for property decoding and poll cycles

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use elmetrics::{
    class, epc, ClassDecoderRegistry, Device, DevicePoller, MetricSink, MultiplierTable,
    NumericFormat, PollerConfig, PropertyCodec, ScaleResolver, ScaleRule, StaticTransport,
};
use std::sync::Arc;

fn generate_scalars(count: usize) -> Vec<[u8; 4]> {
    (0..count as u32)
        .map(|i| (i.wrapping_mul(2_654_435_761)).to_be_bytes())
        .collect()
}

fn generate_circuit_list(circuits: u8) -> Vec<u8> {
    let mut buffer = vec![0x01, circuits];
    for i in 0..circuits as i32 {
        buffer.extend_from_slice(&(i * 37 - 200).to_be_bytes());
    }
    buffer
}

fn bench_scalars(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalars");

    let buffers = generate_scalars(1000);
    let unit = ScaleRule::CodedMultiplier {
        property: epc::panel::ENERGY_UNIT,
        table: MultiplierTable::EnergyUnit,
    };

    group.throughput(Throughput::Elements(1000));

    group.bench_function("decode_1000_uint32", |b| {
        b.iter(|| {
            for buffer in &buffers {
                black_box(PropertyCodec::decode(buffer, NumericFormat::UInt32));
            }
        })
    });

    group.bench_function("decode_scale_1000_uint32", |b| {
        b.iter(|| {
            for buffer in &buffers {
                let raw = PropertyCodec::decode(buffer, NumericFormat::UInt32);
                black_box(ScaleResolver::resolve(raw, &unit, Some(0.01)));
            }
        })
    });

    group.finish();
}

fn bench_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("arrays");

    for circuits in [8u8, 32, 128] {
        let buffer = generate_circuit_list(circuits);
        group.throughput(Throughput::Elements(circuits as u64));
        group.bench_function(format!("decode_{}_circuits", circuits), |b| {
            b.iter(|| black_box(PropertyCodec::decode_array(&buffer, NumericFormat::Int32)))
        });
    }

    group.finish();
}

fn bench_poll_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_cycle");

    let mut transport = StaticTransport::new();
    let mut devices = Vec::new();
    for i in 0..50u32 {
        let panel = Device::new(format!("10.0.0.{}", i), class::DISTRIBUTION_PANEL_METERING);
        transport.insert_device(panel.clone());
        transport.insert_response(&panel, epc::panel::ENERGY_UNIT, Ok(vec![0x02]));
        transport.insert_response(&panel, epc::panel::CUMULATIVE_IN, Ok((i * 1000).to_be_bytes().to_vec()));
        transport.insert_response(&panel, epc::panel::CUMULATIVE_OUT, Ok(i.to_be_bytes().to_vec()));
        transport.insert_response(&panel, epc::panel::INSTANTANEOUS_POWER, Ok(1200u32.to_be_bytes().to_vec()));
        transport.insert_response(&panel, epc::panel::CIRCUIT_POWER_LIST, Ok(generate_circuit_list(16)));
        transport.insert_response(&panel, epc::panel::CIRCUIT_CUMULATIVE_LIST, Ok(generate_circuit_list(16)));
        devices.push(panel);
    }

    let classes = ClassDecoderRegistry::builtin();
    let sink = MetricSink::builtin(&classes).unwrap();
    let poller = DevicePoller::new(Arc::new(classes), PollerConfig::default());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    group.throughput(Throughput::Elements(devices.len() as u64));

    group.bench_function("poll_50_panels", |b| {
        b.iter(|| black_box(runtime.block_on(poller.poll_all(&transport, &devices))))
    });

    group.bench_function("poll_and_apply_50_panels", |b| {
        b.iter(|| {
            let samples = runtime.block_on(poller.poll_all(&transport, &devices));
            black_box(sink.apply(&samples).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_scalars, bench_arrays, bench_poll_cycle);
criterion_main!(benches);
