use apu_core::{Apu, ApuConfig, ChipMask, NullSink, SampleBank};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn apu(expansion: ChipMask) -> Apu {
    let config = ApuConfig {
        expansion,
        ..ApuConfig::default()
    };
    let mut apu = Apu::with_config(
        &config,
        Box::new(NullSink),
        Box::new(SampleBank::new(vec![0x55; 0x1000])),
    )
    .unwrap();

    // Square, triangle, noise and a looping DPCM sample
    for (address, value) in [
        (0x4000, 0xBF),
        (0x4002, 0xFD),
        (0x4008, 0xFF),
        (0x400A, 0x80),
        (0x400C, 0x3F),
        (0x400E, 0x04),
        (0x4010, 0x4F),
        (0x4013, 0x10),
        (0x4015, 0x1F),
        (0x4003, 0x08),
        (0x400B, 0x08),
        (0x400F, 0x08),
    ] {
        apu.write(address, value);
    }

    // One voice per expansion chip
    for (address, value) in [
        (0x9000, 0x7F),
        (0x9001, 0x80),
        (0x9002, 0x80),
        (0x9010, 0x30),
        (0x9030, 0x30),
        (0x9010, 0x10),
        (0x9030, 0xAC),
        (0x9010, 0x20),
        (0x9030, 0x18),
        (0x4080, 0xA0),
        (0x4083, 0x04),
        (0x5015, 0x01),
        (0x5000, 0xBF),
        (0x5002, 0x80),
        (0x5003, 0x08),
        (0xF800, 0x7F),
        (0x4800, 0x70),
        (0xC000, 0x07),
        (0xE000, 0x3E),
        (0xC000, 0x08),
        (0xE000, 0x0F),
    ] {
        apu.external_write(address, value);
    }
    apu
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("apu_frame");

    for (name, mask) in [
        ("internal", ChipMask::NONE),
        ("vrc6", ChipMask::VRC6),
        ("vrc7", ChipMask::VRC7),
        ("all", ChipMask::ALL),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &mask, |b, &mask| {
            let mut apu = apu(mask);
            let frame = apu.frame_cycle_count() as i32;
            b.iter(|| {
                apu.add_time(frame);
                apu.process();
                black_box(apu.frame_count());
            });
        });
    }

    group.finish();
}

fn bench_second(c: &mut Criterion) {
    c.bench_function("apu_one_second_all_chips", |b| {
        b.iter(|| {
            let mut apu = apu(ChipMask::ALL);
            let frame = apu.frame_cycle_count() as i32;
            for _ in 0..60 {
                apu.add_time(frame);
                apu.process();
            }
            black_box(apu.frame_count());
        });
    });
}

fn bench_register_writes(c: &mut Criterion) {
    c.bench_function("apu_register_writes", |b| {
        let mut apu = apu(ChipMask::NONE);
        b.iter(|| {
            for value in 0..=255u8 {
                apu.add_time(4);
                apu.write(0x4002, black_box(value));
            }
        });
    });
}

criterion_group!(benches, bench_frame, bench_second, bench_register_writes);
criterion_main!(benches);
