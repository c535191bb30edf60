//! Voice orchestrator entry point (C9-C12): loads configuration, wires the
//! Audio Device Arbiter, Speech Pipeline, and Intent Oracle from
//! `facegate-voice` to the Sync Tool Facade (C8), then loops: listen for
//! a wake word, ask which flow to run, dispatch it.
//!
//! Deliberately a plain synchronous `main` — the facade owns the single
//! tokio runtime this whole process drives work through (§9), so nothing
//! here runs under `#[tokio::main]`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use facegate_agent::flows::{self, FlowContext};
use facegate_agent::facade::SyncToolClient;
use facegate_config::load_settings;
use facegate_voice::{
    AcousticDecoder, AudioArbiter, AudioInputDevice, FreeFormStt, GrammarConstrainedStt, IntentOracle,
    SilenceDetector, TextToSpeechEngine, TranscriptionEngine, WakeWordDetector,
};

fn main() {
    let env = std::env::var("FACEGATE_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fatal: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting facegate-voice");

    let ctx = match build_context(&settings) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup failure");
            std::process::exit(1);
        }
    };

    tracing::info!("ready; listening for a wake word");
    loop {
        match ctx.listen_for_wake_word() {
            Ok(true) => {
                let outcome = flows::select(&ctx).and_then(|flow| flows::dispatch(&ctx, flow));
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, "flow ended with an error");
                }
            }
            Ok(false) => continue,
            Err(e) => tracing::warn!(error = %e, "wake-word listening failed; retrying"),
        }
    }
}

fn build_context(settings: &facegate_config::Settings) -> anyhow::Result<FlowContext> {
    let decoder = Arc::new(AcousticDecoder::load(&settings.voice.stt_model_path)?);
    let free_form_stt: Arc<dyn TranscriptionEngine> = Arc::new(FreeFormStt::new(decoder.clone()));

    let wake_grammar = json!(settings.voice.wake_words);
    let wake_stt: Arc<dyn TranscriptionEngine> =
        Arc::new(GrammarConstrainedStt::new(decoder.clone(), wake_grammar)?);

    let command_grammar = json!(flows::COMMAND_PHRASES);
    let command_stt: Arc<dyn TranscriptionEngine> = Arc::new(GrammarConstrainedStt::new(decoder, command_grammar)?);

    let tts = TextToSpeechEngine::load(
        &settings.voice.tts_model_path,
        settings.voice.debug_wav_dir.as_ref().map(std::path::PathBuf::from),
    )?;

    let intent = IntentOracle::new(
        settings.voice.llm_endpoint.clone(),
        Duration::from_millis(settings.voice.llm_timeout_ms),
        settings.voice.yes_keywords.clone(),
        settings.voice.no_keywords.clone(),
    );

    Ok(FlowContext {
        facade: SyncToolClient::new(settings.orchestrator.clone()),
        arbiter: AudioArbiter::new(Duration::from_millis(settings.voice.transition_delay_ms)),
        audio_input: AudioInputDevice::new(),
        silence: SilenceDetector::new(settings.voice.silence_energy_threshold_db),
        free_form_stt,
        wake_stt,
        wake_word: WakeWordDetector::new(settings.voice.wake_words.clone()),
        command_stt,
        tts,
        intent,
        orchestrator: settings.orchestrator.clone(),
        voice: settings.voice.clone(),
    })
}

fn init_tracing(settings: &facegate_config::Settings) {
    use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("facegate_voice={}", settings.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
