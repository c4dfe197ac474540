use std::path::PathBuf;
use std::time::Instant;

use piper_tts::engines::piper::{
    AudioFormat, PiperConfig, PiperEngine, PiperInferenceParamsBuilder, SynthesisRequest,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => PiperConfig::with_voices_path(path),
        None => PiperConfig::from_env(),
    };

    let load_start = Instant::now();
    let engine = PiperEngine::with_espeak_ort(config);
    println!("Voice scan finished in {:.2?}", load_start.elapsed());

    println!("Available languages: {:?}", engine.available_languages());
    for voice in engine.voices() {
        println!("  {} -> {}", voice.display_name, voice.model_path.display());
    }

    let Some(voice) = engine
        .find_voices("en")
        .into_iter()
        .next()
        .or_else(|| engine.voices().into_iter().next())
    else {
        eprintln!("No Piper voices installed; pass a voices directory as the first argument.");
        return Ok(());
    };
    println!("Speakers of {}: {:?}", voice.display_name, engine.speakers(&voice)?);

    let text = "Hello! This is Piper, a fast local neural text to speech system. \
                It runs entirely on your machine, one sentence after another.";

    let params = PiperInferenceParamsBuilder::default()
        .rate(1.0f32)
        .output_format(AudioFormat::Wav)
        .build()?;

    let synth_start = Instant::now();
    let done = engine.synthesize_blocking(SynthesisRequest::new(text, voice).with_params(params))?;
    let synth_dur = synth_start.elapsed();

    let audio_duration = done.result.duration_secs();
    let speedup = audio_duration / synth_dur.as_secs_f64();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        audio_duration, synth_dur, speedup
    );

    std::fs::write(PathBuf::from("output.wav"), &done.audio.bytes)?;
    println!("Saved to output.wav");

    engine.unload();
    Ok(())
}
