//! Feedback chorus on the default output device
//!
//! Run with: cargo run --example feedback_chorus --features cpal_sink

use std::thread::sleep;
use std::time::{Duration, Instant};

use schwebung::{CpalDevice, FeedbackSynth, SynthSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    for device in CpalDevice::list_outputs() {
        println!("{}: {} Hz, {} ch", device.name(), device.sample_rate(), device.channels());
    }

    let device = CpalDevice::default_output().ok_or("No audio device")?;
    let settings = SynthSettings::default().with_frequency(220.0);
    let (mut synth, engine) = FeedbackSynth::build(device.engine_config(), settings)?;
    let stream = device.start(engine)?;

    synth.set_master_gain_db(-18.0)?;
    synth.set_vibrato_depth(3.0)?;
    synth.set_delay_time_ms(180.0)?;
    synth.set_mod_rate(0.3)?;
    synth.set_mod_depth(2.0)?;
    synth.set_feedback(55.0)?;
    synth.activate()?;

    println!("Playing... sweeping for 12 seconds");

    let start = Instant::now();
    let mut step = 0u32;
    while start.elapsed() < Duration::from_secs(12) {
        sleep(Duration::from_millis(250));
        step += 1;

        // slow sweeps so every ramp has time to land
        let phase = step as f32 / 16.0 * core::f32::consts::PI;
        synth.set_vibrato_rate(4.0 + 2.0 * phase.sin())?;
        synth.set_mod_depth(2.0 + 1.5 * (phase * 0.5).cos())?;
        if step % 8 == 0 {
            synth.set_feedback(if step % 16 == 0 { 55.0 } else { 85.0 })?;
        }

        println!(
            "t={:.2}s gain={:.1} dBFS delay={:.1} ms feedback={:.0}% mod={:.1}% vibrato={:.2} Hz",
            synth.current_time(),
            synth.master_gain_db_value().unwrap_or(f32::NEG_INFINITY),
            synth.delay_time_ms_value().unwrap_or_default(),
            synth.feedback_value().unwrap_or_default(),
            synth.mod_depth_value().unwrap_or_default(),
            synth.vibrato_rate_value().unwrap_or_default(),
        );
    }

    synth.set_master_gain_db(-80.0)?;
    sleep(Duration::from_millis(50));
    synth.close();
    println!("played {} frames", stream.frames_played());
    Ok(())
}
