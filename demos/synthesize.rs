use std::path::PathBuf;
use std::time::Instant;

use qwen_tts_bridge::{
    BridgeOptions, ModelSelection, QwenBridge, RuntimeConfiguration, SynthesisMode,
    SynthesisRequestBuilder,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let libpython = std::env::var("QWEN_TTS_LIBPYTHON")
        .unwrap_or_else(|_| "/usr/lib/x86_64-linux-gnu/libpython3.12.so".to_string());
    let python_home = std::env::var("QWEN_TTS_PYTHON_HOME").unwrap_or_else(|_| "/usr".to_string());
    let runner_dir = std::env::var("QWEN_TTS_RUNNER_DIR").unwrap_or_else(|_| ".".to_string());

    let config = RuntimeConfiguration::new(libpython, python_home).with_module_path(runner_dir);

    let bridge = QwenBridge::new(BridgeOptions::from_env());
    bridge.initialize(&config)?;
    bridge.import_module()?;

    let selection = ModelSelection::for_mode(SynthesisMode::CustomVoice);
    let load_start = Instant::now();
    if !bridge.load_model(selection, false)? {
        let status = bridge.status();
        return Err(format!(
            "no model could be loaded: {}",
            status.last_error.unwrap_or_default()
        )
        .into());
    }
    println!("Model loaded in {:.2?}", load_start.elapsed());

    let status = bridge.status();
    println!(
        "Active: {:?} (fallback applied: {})",
        status.active_selection, status.fallback_applied
    );
    println!(
        "Available speakers: {:?}",
        bridge.supported_speakers(selection)?
    );

    let request = SynthesisRequestBuilder::default()
        .text(
            "Hello! This is Qwen3 text to speech, synthesized through an \
             embedded interpreter bridge.",
        )
        .mode(SynthesisMode::CustomVoice)
        .voice("ryan")
        .build()?;

    let synth_start = Instant::now();
    let result = bridge.synthesize(&request)?;
    let synth_dur = synth_start.elapsed();

    let audio_duration = result.duration_secs();
    println!(
        "Synthesized {:.2}s audio ({} bytes) in {:.2?} ({:.1}x real-time)",
        audio_duration,
        result.wav.len(),
        synth_dur,
        audio_duration / synth_dur.as_secs_f64()
    );

    result.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    bridge.shutdown();
    Ok(())
}
