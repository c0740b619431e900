use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use aria_assistant::config::file::load_config_file;
use aria_assistant::services::SpeakerOutput;
use aria_assistant::voice::{AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE, calculate_energy};
use aria_assistant::{
    Config, ControllerEvent, ControllerHandle, InteractionController, Role, Services, SpeechOutput,
};

/// ARIA - a voice assistant for the terminal
#[derive(Parser)]
#[command(name = "aria", version, about)]
struct Cli {
    /// Use canned phrases and replies instead of the microphone and cloud APIs
    #[arg(long, env = "ARIA_DEMO")]
    demo: bool,

    /// Skip the spoken greeting at startup
    #[arg(long)]
    no_greeting: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Voice mode to speak with
        #[arg(short, long)]
        mode: Option<String>,
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// List the configured voice modes
    Voices,
}

/// A line typed at the prompt
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Listen,
    Text(&'a str),
    Clear,
    Voice(Option<&'a str>),
    Stop,
    Cancel,
    Say(&'a str),
    Summary,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Listen;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Text(line);
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, arg)| (name, arg.trim()));

    match name {
        "clear" => Input::Clear,
        "voice" => Input::Voice((!arg.is_empty()).then_some(arg)),
        "stop" => Input::Stop,
        "cancel" => Input::Cancel,
        "say" => Input::Say(arg),
        "summary" => Input::Summary,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => Input::Unknown(other),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,aria_assistant=info",
        1 => "info,aria_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { mode, text } => test_tts(mode.as_deref(), &text).await,
            Command::Voices => list_voices(),
        };
    }

    let config = Config::load(cli.demo)?;
    tracing::debug!(params = ?config.completion.params, demo = config.demo, "loaded configuration");

    let services = Services::from_config(&config)?;
    let (handle, controller) = InteractionController::spawn(&config, services)?;

    let printer = tokio::spawn(print_events(handle.subscribe(), config.assistant.name.clone()));

    println!(
        "{} ready{}. Press Enter to talk, type a message, or /help.",
        config.assistant.name,
        if config.demo { " (demo mode)" } else { "" }
    );

    if !cli.no_greeting {
        handle
            .say(format!(
                "Hello! I'm {}, your voice assistant. How can I help you today?",
                config.assistant.name
            ))
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        if !handle_line(&handle, &config, &line).await? {
            break;
        }
    }

    handle.shutdown().await?;
    controller.await?;
    printer.abort();
    Ok(())
}

/// Apply one line of input; returns `false` to quit
async fn handle_line(handle: &ControllerHandle, config: &Config, line: &str) -> anyhow::Result<bool> {
    let busy = |accepted: bool| {
        if !accepted {
            println!("(busy: {})", handle.state());
        }
    };

    match parse_input(line) {
        Input::Listen => busy(handle.start_interaction().await?),
        Input::Text(text) => busy(handle.submit_text(text).await?),
        Input::Say(text) => busy(handle.say(text).await?),
        Input::Clear => {
            handle.clear_history().await?;
        }
        Input::Voice(None) => {
            let current = handle.voice_mode().await?;
            let names: Vec<_> = config.voice.modes.names().collect();
            println!("voice mode: {current} (available: {})", names.join(", "));
        }
        Input::Voice(Some(name)) => match handle.set_voice_mode(name).await {
            Ok(_) => {}
            Err(aria_assistant::Error::VoiceMode(e)) => println!("{e}"),
            Err(e) => return Err(e.into()),
        },
        Input::Stop => {
            if !handle.stop_speaking().await? {
                println!("(not speaking)");
            }
        }
        Input::Cancel => {
            if !handle.cancel_interaction().await? {
                println!("(nothing to cancel)");
            }
        }
        Input::Summary => {
            let summary = handle.summary().await?;
            println!("exchanges: {}", summary.total_exchanges);
            if let Some(user) = summary.last_user_message {
                println!("last you: {user}");
            }
            if let Some(reply) = summary.last_assistant_message {
                println!("last {}: {reply}", config.assistant.name);
            }
        }
        Input::Help => print_help(),
        Input::Quit => return Ok(false),
        Input::Unknown(name) => println!("unknown command /{name}; try /help"),
    }

    Ok(true)
}

fn print_help() {
    println!("  <Enter>          listen for a spoken question");
    println!("  <text>           ask a typed question");
    println!("  /say <text>      speak text without adding it to the conversation");
    println!("  /voice [mode]    show or change the voice mode");
    println!("  /stop            stop speaking");
    println!("  /cancel          abandon listening or thinking");
    println!("  /clear           clear the conversation");
    println!("  /summary         summarize the conversation");
    println!("  /quit            exit");
}

/// Render controller events as a conversation log
async fn print_events(mut events: broadcast::Receiver<ControllerEvent>, name: String) {
    loop {
        match events.recv().await {
            Ok(ControllerEvent::StateChanged { state, error }) => {
                if let Some(error) = error {
                    println!("[{state}] {error}");
                } else {
                    println!("[{state}]");
                }
            }
            Ok(ControllerEvent::MessageAppended(message)) => match message.role {
                Role::User => println!("You: {}", message.content),
                Role::Assistant => println!("{name}: {}", message.content),
                Role::System => {}
            },
            Ok(ControllerEvent::HistoryCleared) => println!("(conversation cleared)"),
            Ok(ControllerEvent::VoiceModeChanged(mode)) => println!("(voice mode: {mode})"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event display fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    tokio::task::spawn_blocking(move || {
        let playback = AudioPlayback::new()?;
        playback.play(samples, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output through the speaker adapter
async fn test_tts(mode: Option<&str>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(false)?;
    let mode = mode.unwrap_or(&config.voice.default_mode);
    let params = config.voice.modes.get(mode)?.clone();

    let output = SpeakerOutput::from_config(&config)?;
    output.configure(params);

    println!("Synthesizing and playing with voice mode {mode}...");
    output.speak(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Print the voice mode table
fn list_voices() -> anyhow::Result<()> {
    let config = Config::from_sources(load_config_file(), |key| std::env::var(key).ok())?;

    for (name, params) in config.voice.modes.iter() {
        let marker = if name.eq_ignore_ascii_case(&config.voice.default_mode) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {name:<10} rate {:>3}  pitch {:.1}  voice {:?}{}",
            params.rate,
            params.pitch,
            params.voice,
            if params.mangle_text { "  (mangled)" } else { "" }
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input(""), Input::Listen);
        assert_eq!(parse_input("   "), Input::Listen);
        assert_eq!(parse_input(" what time is it "), Input::Text("what time is it"));
        assert_eq!(parse_input("/voice"), Input::Voice(None));
        assert_eq!(parse_input("/voice  Alien "), Input::Voice(Some("Alien")));
        assert_eq!(parse_input("/say hello there"), Input::Say("hello there"));
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/dance"), Input::Unknown("dance"));
    }
}
