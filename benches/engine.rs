//! Benchmarks for the mixing engine frame loop
//!
//! Run with: cargo bench --bench engine

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nes_snd::{ChipKind, ExpansionMask, MixingEngine, Region, TndMode};
use std::hint::black_box;

fn configured(mode: TndMode, expansions: ExpansionMask) -> MixingEngine {
    let mut engine = MixingEngine::new();
    engine
        .configure(44_100, Region::Ntsc, mode)
        .expect("44.1 kHz is a valid rate");
    engine.set_expansions(expansions);
    engine.reset();
    engine
}

/// Both pulses, triangle and noise running.
fn start_apu(engine: &mut MixingEngine) {
    for (addr, value) in [
        (0x4015, 0x0F),
        (0x4000, 0xBF),
        (0x4002, 0xFD),
        (0x4003, 0x00),
        (0x4004, 0x7F),
        (0x4006, 0x7E),
        (0x4007, 0x01),
        (0x4008, 0xFF),
        (0x400A, 0x40),
        (0x400B, 0x01),
        (0x400C, 0x3F),
        (0x400E, 0x04),
        (0x400F, 0x00),
    ] {
        engine.write_register(addr, value);
    }
}

fn run_frame(engine: &mut MixingEngine, pcm: &mut [i16]) {
    engine.skip_cycles(engine.frame_length() ^ 1);
    engine.end_frame();
    let count = engine.samples_avail().min(pcm.len());
    black_box(engine.read_samples(pcm, count));
}

fn bench_apu_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("apu_frame");
    let mut pcm = vec![0i16; 2048];

    for mode in [TndMode::Single, TndMode::Separate] {
        let mut engine = configured(mode, ExpansionMask::empty());
        start_apu(&mut engine);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{mode:?}")), &mode, |b, _| {
            b.iter(|| run_frame(&mut engine, &mut pcm));
        });
    }

    group.finish();
}

fn bench_fm_frame(c: &mut Criterion) {
    let mut engine = configured(TndMode::Single, ExpansionMask::VRC7);
    let mut pcm = vec![0i16; 2048];
    for channel in 0..6u8 {
        for (reg, value) in [(0x30 + channel, 0x10 * (channel + 1)), (0x10 + channel, 0xAC), (0x20 + channel, 0x15)] {
            engine.write_register(0x9010, reg);
            engine.write_register(0x9030, value);
        }
    }

    c.bench_function("vrc7_six_channels", |b| {
        b.iter(|| run_frame(&mut engine, &mut pcm));
    });
}

fn bench_all_expansions(c: &mut Criterion) {
    let mut engine = configured(TndMode::Single, ExpansionMask::all());
    let mut pcm = vec![0i16; 2048];
    start_apu(&mut engine);
    // VRC6 pulse, MMC5 pulse, Sunsoft tone A
    for (addr, value) in [
        (0x9000, 0x3F),
        (0x9001, 0x80),
        (0x9002, 0x81),
        (0x5015, 0x01),
        (0x5000, 0xBF),
        (0x5002, 0x80),
        (0x5003, 0x00),
        (0xC000, 0x00),
        (0xE000, 0x80),
        (0xC000, 0x07),
        (0xE000, 0x3E),
        (0xC000, 0x08),
        (0xE000, 0x0F),
    ] {
        engine.write_register(addr, value);
    }

    c.bench_function("all_expansions_frame", |b| {
        b.iter(|| run_frame(&mut engine, &mut pcm));
    });
}

fn bench_seek_replay(c: &mut Criterion) {
    let mut engine = configured(TndMode::Single, ExpansionMask::VRC6 | ExpansionMask::NAMCO);

    c.bench_function("seek_thousand_writes", |b| {
        b.iter(|| {
            engine.start_seeking();
            for i in 0..1000u16 {
                engine.write_register(0x4000 + (i % 0x14), black_box(i as u8));
                engine.write_register(0x9000 + (i % 3), black_box(i as u8));
            }
            engine.stop_seeking();
            engine.end_frame();
            let avail = engine.samples_avail();
            engine.remove_samples(avail);
        });
    });
}

fn bench_channel_muting(c: &mut Criterion) {
    let mut engine = configured(TndMode::Separate, ExpansionMask::empty());
    let mut pcm = vec![0i16; 2048];
    start_apu(&mut engine);

    c.bench_function("separate_tnd_muting", |b| {
        b.iter(|| {
            engine.set_channel_enabled(ChipKind::BaseApu, 3, black_box(false));
            run_frame(&mut engine, &mut pcm);
            engine.set_channel_enabled(ChipKind::BaseApu, 3, black_box(true));
            run_frame(&mut engine, &mut pcm);
        });
    });
}

criterion_group!(
    benches,
    bench_apu_frame,
    bench_fm_frame,
    bench_all_expansions,
    bench_seek_replay,
    bench_channel_muting
);
criterion_main!(benches);
