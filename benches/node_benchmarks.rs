use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dasp_graph::Buffer;
use schwebung::nodes::{Delay, ToneOscillator};
use schwebung::{AudioNode, EngineConfig, FeedbackSynth, ProcessContext, SynthSettings, BLOCK_SIZE};

const RATE: u32 = 48_000;

pub fn criterion_benchmark(c: &mut Criterion) {
    let ctx = ProcessContext {
        sample_rate: RATE,
        buffer_size: BLOCK_SIZE,
        time: 0.0,
    };

    c.bench_function("ToneOscillator.process()", |b| {
        let mut saw = ToneOscillator::new(440.0);
        let input = Buffer::default();
        let mut output = Buffer::default();
        let params = [{
            let mut p = Buffer::default();
            p.iter_mut().for_each(|s| *s = 440.0);
            p
        }];

        b.iter(|| saw.process(&ctx, &input, black_box(&params), &mut output))
    });

    c.bench_function("Delay.process()+absorb()", |b| {
        let mut delay = Delay::new(0.125, 1.0, RATE);
        let params = [{
            let mut p = Buffer::default();
            p.iter_mut().for_each(|s| *s = 0.125);
            p
        }];
        let mut input = Buffer::default();
        input.iter_mut().enumerate().for_each(|(i, s)| *s = i as f32 / BLOCK_SIZE as f32);
        let mut output = Buffer::default();

        b.iter(|| {
            delay.process(&ctx, &input, black_box(&params), &mut output);
            delay.absorb(&ctx, black_box(&input));
        })
    });

    c.bench_function("FeedbackSynth render_block()", |b| {
        let settings = SynthSettings::default().with_vibrato(5.0, 6.0).with_modulation(0.5, 0.3).with_delay(0.2, 0.6);
        let (synth, mut engine) = FeedbackSynth::build(EngineConfig::new(RATE), settings).unwrap();
        synth.activate().unwrap();

        b.iter(|| {
            black_box(engine.render_block().unwrap());
        })
    });

    c.bench_function("FeedbackSynth render_block() while ramping", |b| {
        let (mut synth, mut engine) = FeedbackSynth::build(EngineConfig::new(RATE), SynthSettings::default()).unwrap();
        synth.activate().unwrap();
        let mut flip = false;

        b.iter(|| {
            // a fresh 10 ms ramp keeps the per-sample path busy
            flip = !flip;
            synth.set_master_gain_db(if flip { -6.0 } else { -18.0 }).unwrap();
            black_box(engine.render_block().unwrap());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
