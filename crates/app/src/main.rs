mod singer;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tuneguide_core::{
    pitch::note_name, AppConfig, Score, SessionController, Timeline, TuneGuideError, VoiceId,
};
use tracing_subscriber::EnvFilter;

use crate::singer::SyntheticSinger;

/// Upper bound on a rehearsal, past the end of the score.
const MAX_OVERRUN_SECONDS: f64 = 5.0;

fn main() -> tuneguide_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { score, voice } => run_inspect(&score, voice),
        Commands::Rehearse {
            score,
            voice,
            tempo,
            solo,
            detune,
            config,
        } => run_rehearse(&score, voice, tempo, solo, detune, config.as_deref()),
    }
}

fn run_inspect(path: &Path, voice: Option<u32>) -> tuneguide_core::Result<()> {
    let score = Score::load(path)?;
    let timeline = Timeline::build(&score)?;
    tracing::info!(?path, "inspecting score");

    println!(
        "tempo {} bpm ({:.3} s/beat), {:.2} s, {} voice(s), {} skipped note(s)",
        timeline.tempo_bpm(),
        timeline.seconds_per_beat(),
        timeline.duration_seconds(),
        timeline.voice_count(),
        timeline.skipped_notes()
    );
    if let Some((low, high)) = timeline.pitch_range() {
        println!("range {} to {}", note_name(low), note_name(high));
    }

    for (id, events) in timeline.voices() {
        if voice.is_some_and(|wanted| VoiceId(wanted) != id) {
            continue;
        }
        let notes = events.iter().filter(|event| !event.is_rest()).count();
        println!("voice {id}: {} events, {notes} notes", events.len());
        if voice.is_some() {
            for event in events {
                println!(
                    "  {:>7.3}s {:>6.3}s  {:<5} {}",
                    event.start_sec,
                    event.duration_sec(),
                    event.label(),
                    event.lyric.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn run_rehearse(
    path: &Path,
    voice: u32,
    tempo: Option<f64>,
    solo: bool,
    detune: f64,
    config: Option<&Path>,
) -> tuneguide_core::Result<()> {
    let config = match config {
        Some(config) => AppConfig::load(config)?,
        None => AppConfig::default(),
    };
    let block_size = config.audio.block_size;
    let window = config.audio.analysis_window;
    let sample_rate = config.audio.sample_rate;

    let score = Score::load(path)?;
    let mut session = SessionController::offline(config)?;
    let voice = VoiceId(voice);
    let (events, duration) = {
        let timeline = session.load_timeline(&score)?;
        let events = timeline
            .voice(voice)
            .ok_or(TuneGuideError::UnknownVoice(voice))?
            .to_vec();
        (events, timeline.duration_seconds())
    };
    session.select_voice(voice)?;
    if let Some(bpm) = tempo {
        session.set_tempo(bpm)?;
    }
    if solo {
        session.set_solo(true, voice)?;
    }

    tracing::info!(?path, %voice, detune, "rehearsing");
    let mut singer = SyntheticSinger::new(&events, detune, sample_rate, window);
    session.play()?;
    let played_seconds = sing_along(
        &mut session,
        &mut singer,
        block_size,
        duration + MAX_OVERRUN_SECONDS,
    );

    let report = session
        .stop()?
        .ok_or_else(|| TuneGuideError::msg("session ended before it started"))?;
    let recorded_seconds = report
        .recording
        .as_ref()
        .map_or(0.0, |take| take.duration_seconds());
    let summary = serde_json::json!({
        "voice": voice,
        "tempo_factor": tempo.map_or(1.0, |bpm| bpm / score.tempo()),
        "tier": report.tier(),
        "perfect_ratio": report.analysis.perfect_ratio(),
        "played_seconds": played_seconds,
        "recorded_seconds": recorded_seconds,
        "analysis": report.analysis,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Feeds the singer into a playing session one block at a time until the
/// score is over or the playhead passes `limit`. Returns the seconds played.
fn sing_along(
    session: &mut SessionController,
    singer: &mut SyntheticSinger,
    block_size: usize,
    limit: f64,
) -> f64 {
    let started = session.scheduler().now();
    let mut block = vec![0.0f32; block_size];
    while !session.is_finished() && session.scheduler().playhead() < limit {
        let playhead = session.scheduler().playhead();
        session.on_captured_block(singer.sing(playhead, block_size));
        if let Some(frame) = singer.frame() {
            session.on_audio_frame(frame);
        }
        session.render(&mut block);
    }
    session.scheduler().now() - started
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time vocal trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the voices, note counts and range of a score.
    Inspect {
        /// Score exported by the notation loader, as JSON.
        #[arg(short, long)]
        score: PathBuf,
        /// List every event of this voice.
        #[arg(short, long)]
        voice: Option<u32>,
    },
    /// Run a full offline session with a synthetic singer on one voice.
    Rehearse {
        #[arg(short, long)]
        score: PathBuf,
        /// Voice the singer follows.
        #[arg(short, long)]
        voice: u32,
        /// Playback tempo in BPM; defaults to the score tempo.
        #[arg(short, long)]
        tempo: Option<f64>,
        /// Attenuate every voice but the selected one.
        #[arg(long)]
        solo: bool,
        /// How far off the singer is, in cents.
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        detune: f64,
        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneguide_core::{ScoreNote, ScorePart};

    #[test]
    fn rehearsal_records_what_was_played() {
        let score = Score {
            tempo_bpm: Some(60.0),
            parts: vec![ScorePart {
                voice: None,
                divisions: Some(1),
                notes: vec![ScoreNote::note("A", 0, 4, 2)],
            }],
        };
        let config = AppConfig::default();
        let block_size = config.audio.block_size;
        let sample_rate = config.audio.sample_rate;
        let window = config.audio.analysis_window;

        let mut session = SessionController::offline(config).unwrap();
        let events = session
            .load_timeline(&score)
            .unwrap()
            .voice(VoiceId(0))
            .unwrap()
            .to_vec();
        let mut singer = SyntheticSinger::new(&events, 0.0, sample_rate, window);
        session.play().unwrap();
        let limit = 2.0 + MAX_OVERRUN_SECONDS;
        let played = sing_along(&mut session, &mut singer, block_size, limit);

        let report = session.stop().unwrap().expect("a report");
        let recorded = report.recording.expect("a recording").duration_seconds();
        assert!(played >= 2.0);
        assert!((recorded - played).abs() < 0.1, "recorded {recorded} s of {played} s");
        assert!(report.analysis.total_count > 0);
    }
}
