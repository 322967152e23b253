//! Demonstration of the classification pipeline on a synthetic session.
//!
//! This example shows how to:
//! 1. Plug hand-written engines into the five classifier ports
//! 2. Build and spawn the pipeline
//! 3. Replay a two-source recording through both lanes
//! 4. Summarize the stored events by day
//!
//! Run with: cargo run --example replay_demo

use chrono::Utc;
use wearable_activity_agent::{
    core::{labels, WindowSnapshot},
    history,
    source::Pace,
    ClassifierPort, ClassifierSpec, MemoryStore, Pipeline, RecordingSource, Sample,
};

const ACTIVITY_LEN: usize = 50;
const RESPIRATORY_LEN: usize = 100;
const PERIOD_MS: u64 = 20;

/// Mean absolute deviation of the acceleration magnitude.
fn motion(window: &WindowSnapshot) -> f32 {
    let mags: Vec<f32> = window
        .samples()
        .iter()
        .map(|s| (s.x * s.x + s.y * s.y + s.z * s.z).sqrt())
        .collect();
    let mean = mags.iter().sum::<f32>() / mags.len() as f32;
    mags.iter().map(|m| (m - mean).abs()).sum::<f32>() / mags.len() as f32
}

fn one_hot(classes: usize, index: usize) -> Vec<f32> {
    let mut out = vec![0.0; classes];
    out[index] = 1.0;
    out
}

fn port(
    name: &'static str,
    len: usize,
    labels: Vec<String>,
    engine: impl FnMut(&WindowSnapshot) -> Vec<f32> + Send + 'static,
) -> ClassifierPort {
    ClassifierPort::new(name, ClassifierSpec::new(len, labels), Box::new(engine))
        .expect("valid classifier spec")
}

/// Lying still for 4 s, sitting upright for 4 s, then running for 4 s.
fn synthetic_session() -> RecordingSource {
    let mut samples = Vec::new();
    for i in 0..600u64 {
        let t = i * PERIOD_MS;
        let phase = i as f32 * 0.9;
        let (x, y, z) = match i {
            0..=199 => (0.01, 0.02, 0.99),
            200..=399 => (0.02, -0.98, 0.05),
            _ => (0.6 * phase.sin(), -1.0 + 0.8 * phase.cos(), 0.3 * phase.sin()),
        };
        samples.push(Sample::primary(x, y, z, t));
        if i >= 200 {
            samples.push(Sample::secondary(0.1, -0.95, 0.1, t + 3));
        }
    }
    RecordingSource::from_samples(samples)
}

fn main() {
    println!("Wearable Activity Agent - Replay Demo");
    println!("=====================================");
    println!();

    let branch = port("branch", ACTIVITY_LEN, labels::branch_labels(), |w| {
        one_hot(2, if motion(w) > 0.05 { 0 } else { 1 })
    });
    let static_activity = port("static", ACTIVITY_LEN, labels::static_labels(), |w| {
        let upright = w.samples().last().map(|s| s.y.abs() > 0.7).unwrap_or(false);
        one_hot(5, if upright { 4 } else { 0 })
    });
    let dynamic_activity = port("dynamic", ACTIVITY_LEN, labels::dynamic_labels(), |_| {
        one_hot(6, 3)
    });
    let secondary_aux = port("secondary_aux", ACTIVITY_LEN, labels::secondary_aux_labels(), |_| {
        vec![0.8, 0.2]
    });
    let respiratory = port("respiratory", RESPIRATORY_LEN, labels::respiratory_labels(), |_| {
        vec![0.7, 0.1, 0.1, 0.1]
    });

    let store = MemoryStore::new();
    let handle = Pipeline::builder()
        .branch(branch)
        .static_activity(static_activity)
        .dynamic_activity(dynamic_activity)
        .secondary_aux(secondary_aux)
        .respiratory(respiratory)
        .store(store.clone())
        .display(|event| {
            println!(
                "[{}] {:<18} {}",
                event.timestamp.format("%H:%M:%S%.3f"),
                event.kind,
                event.label
            );
        })
        .build()
        .expect("pipeline");
    let stats = handle.shared().stats().clone();
    let handle = handle.spawn();

    let recording = synthetic_session();
    println!(
        "Replaying {} primary and {} secondary samples...",
        recording.primary_count(),
        recording.secondary_count()
    );
    println!();

    let report = recording.play(
        handle.primary_sender().expect("primary lane"),
        handle.secondary_sender().expect("secondary lane"),
        Pace::Unthrottled,
    );
    handle.shutdown().expect("clean shutdown");

    println!();
    println!(
        "Delivered {} primary / {} secondary samples",
        report.primary_delivered, report.secondary_delivered
    );
    println!("{}", stats.summary());
    println!();

    let today = history::local_date(Utc::now(), chrono_tz::UTC);
    println!("{}", history::summarize(&store.records(), today, chrono_tz::UTC));
}
