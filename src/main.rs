use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use parley::audio::{frame_queue, AudioCapture, AudioSink, DevicePlayback, FRAME_QUEUE_CAPACITY};
use parley::generator::ChatCompletionsClient;
use parley::synthesis::{SpeechClient, Synthesizer};
use parley::{Config, SessionController, SessionEvent};

/// Parley - real-time voice conversation pipeline
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize and play a line of text
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the speech synthesis pipeline.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Say { text } => say(&text).await,
        };
    }

    run_session().await
}

/// Run one conversation session until it ends
#[allow(clippy::future_not_send)]
async fn run_session() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let generator = Arc::new(ChatCompletionsClient::new(&config.generator)?);
    let synthesizer = Arc::new(SpeechClient::new(&config.synthesis)?);
    let sink = Arc::new(DevicePlayback::new()?);

    let (mut controller, mut events) = SessionController::new(config, generator, synthesizer, sink);

    // Ctrl-C is the explicit-stop signal
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(()).await;
        }
    });

    // Presentation layer: render session events as they arrive
    let surface = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Ended { reason } => {
                    println!("Session ended: {reason}. Goodbye!");
                }
                SessionEvent::TurnFailed { reason } => {
                    tracing::warn!(reason = %reason, "turn failed");
                }
            }
        }
    });

    println!("Listening. Speak into your microphone; Ctrl-C to stop.");
    controller.run(&mut stop_rx).await?;

    drop(controller);
    let _ = surface.await;

    Ok(())
}

/// Test microphone input with a level meter
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n---");

    let (frame_tx, mut frame_rx) = frame_queue(FRAME_QUEUE_CAPACITY);
    let (fault_tx, _fault_rx) = mpsc::unbounded_channel();

    let mut capture = AudioCapture::new()?;
    capture.start(frame_tx, fault_tx)?;

    for second in 0..duration {
        let window = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut samples: Vec<i16> = Vec::new();

        while let Ok(Some(frame)) =
            tokio::time::timeout_at(window, frame_rx.pop()).await
        {
            samples.extend(
                frame
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
            );
        }

        let energy = calculate_rms(&samples);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | [{meter}]", second + 1);
    }

    capture.stop();

    println!("---");
    println!("If you saw movement in the meter, your mic is working!");
    Ok(())
}

/// RMS energy of normalized samples
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let normalized = f32::from(s) / 32768.0;
            normalized * normalized
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds");

    let playback = DevicePlayback::new()?;

    let sample_rate = 24_000.0_f32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    playback.play_samples(samples);
    wait_for_idle(&playback, Duration::from_secs(3)).await;

    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Synthesize a line of text and play it
async fn say(text: &str) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("Synthesizing: \"{text}\"");
    let synthesizer = SpeechClient::new(&config.synthesis)?;
    let audio = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio", audio.len());

    let playback = DevicePlayback::new()?;
    playback.play(&audio)?;
    wait_for_idle(&playback, Duration::from_secs(60)).await;

    Ok(())
}

/// Poll until the playback slot drains or the timeout elapses
async fn wait_for_idle(playback: &DevicePlayback, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !playback.is_idle() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // Let the device drain its last buffer
    tokio::time::sleep(Duration::from_millis(100)).await;
}
