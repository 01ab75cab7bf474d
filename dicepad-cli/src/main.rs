//! dicepad: play a generative demo kit to the terminal.
//!
//! Builds a bank from config, seeds it with a few Euclidean and
//! probabilistic tracks, and prints each hit as the scheduler emits it.
//! With `--mutate` the pattern mutates at the end of every loop.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dicepad_core::{ChannelSink, Config, SchedulerHandle, SequencerFeedback, TriggerCommand};
use dicepad_types::{
    ActionOutcome, BankAction, SampleBank, SourceHandle, StepCondition, TrackParams,
};

fn init_logging(verbose: bool, to_stderr: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    if to_stderr {
        if let Err(e) = TermLogger::init(
            log_level,
            simplelog::Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ) {
            eprintln!("could not initialize logger: {}", e);
        }
        return;
    }

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("dicepad")
        .join("dicepad.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match std::fs::File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("could not create {}: {}", log_path.display(), e);
            return;
        }
    };
    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("could not initialize logger: {}", e);
        return;
    }

    log::info!("dicepad starting (log level: {:?})", log_level);
}

struct Args {
    verbose: bool,
    stderr: bool,
    mutate: bool,
    seconds: u64,
    bpm: Option<f32>,
    seed: Option<u64>,
    chaos: Option<f32>,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let value = |flag: &str| flag_value(&args, flag);

        Ok(Self {
            verbose: args.iter().any(|a| a == "--verbose" || a == "-v"),
            stderr: args.iter().any(|a| a == "--stderr"),
            mutate: args.iter().any(|a| a == "--mutate"),
            seconds: parse("--seconds", value("--seconds"))?.unwrap_or(8),
            bpm: parse("--bpm", value("--bpm"))?,
            seed: parse("--seed", value("--seed"))?,
            chaos: parse("--chaos", value("--chaos"))?,
        })
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse<T: std::str::FromStr>(flag: &str, raw: Option<&str>) -> Result<Option<T>, String> {
    raw.map(|s| s.parse::<T>().map_err(|_| format!("invalid value for {}: {}", flag, s)))
        .transpose()
}

/// Four pads: a Euclidean kick, a backbeat snare, a sparse hat with random
/// velocity, and a percussion voice that answers whatever played before it.
fn demo_bank(bank: &mut SampleBank) {
    let kit = [("kick", 1), ("snare", 2), ("hat", 3), ("perc", 4)];
    for (t, (name, id)) in kit.iter().enumerate() {
        if let Err(e) = bank.set_track(t, TrackParams::with_source(*name, SourceHandle::new(*id))) {
            log::warn!("demo track {}: {}", name, e);
        }
    }
    if let Some(hat) = bank.track_mut(2) {
        hat.volume = 0.6;
        hat.variation.volume = 0.15;
        hat.variation.timing = 0.05;
        hat.add_variation(SourceHandle::new(5), 0.3);
    }

    let len = bank.current_pattern().length();
    let mut edits = vec![
        BankAction::ApplyEuclidean {
            track: 0,
            hits: 4,
            steps: len as i32,
            rotation: 0,
        },
        BankAction::ToggleStep(1, 4),
        BankAction::ToggleStep(1, 12),
        BankAction::SetStepProbability(1, 12, 0.85),
        BankAction::ApplyEuclidean {
            track: 2,
            hits: 7,
            steps: len as i32,
            rotation: 1,
        },
        BankAction::SetTrackProbability(2, 0.75),
        BankAction::SetMutationRate(0.1),
    ];
    for pos in [3, 7, 11, 15] {
        edits.push(BankAction::ToggleStep(3, pos));
        edits.push(BankAction::SetStepCondition(3, pos, StepCondition::AfterPreviousSkipped));
        edits.push(BankAction::SetStepProbability(3, pos, 0.5));
    }
    let mut rng = dicepad_types::SeededRandom::new(bank.random_seed);
    for edit in &edits {
        report_outcome(edit, dicepad_types::reduce::reduce(edit, bank, &mut rng));
    }
}

/// Edits the CLI issues are expected to apply; anything else is worth a warning.
fn report_outcome(action: &BankAction, outcome: ActionOutcome) {
    match outcome {
        ActionOutcome::Applied => {}
        ActionOutcome::Ignored => log::warn!("{:?} had no effect", action),
        ActionOutcome::Rejected(e) => log::warn!("{:?} rejected: {}", action, e),
    }
}

fn print_hit(cmd: &TriggerCommand) {
    println!(
        "step {:>2}  track {:>2}  {}  vol {:.2}  pitch {:+.1}  offset {:+.1}ms",
        cmd.step,
        cmd.track,
        cmd.source,
        cmd.volume,
        cmd.pitch,
        cmd.timing_offset * 1000.0
    );
}

fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: dicepad [--seconds N] [--bpm X] [--seed S] [--chaos C] [--mutate] [--verbose] [--stderr]");
            return ExitCode::FAILURE;
        }
    };
    init_logging(args.verbose, args.stderr);

    let config = Config::load();
    let engine_config = config.engine();
    let mut bank = config.new_bank();
    if let Some(bpm) = args.bpm {
        bank.set_bpm(bpm);
    }
    if let Some(chaos) = args.chaos {
        bank.set_chaos(chaos);
    }
    if args.seed.is_some() {
        bank.random_seed = args.seed;
    }
    bank.name = "demo".into();
    demo_bank(&mut bank);

    let (sink, hits) = ChannelSink::bounded(engine_config.sink_capacity);
    let sink = Arc::new(sink);
    let mut handle = SchedulerHandle::new(bank, sink.clone(), &engine_config);
    handle.start();

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        crossbeam_channel::select! {
            recv(hits) -> cmd => {
                if let Ok(cmd) = cmd {
                    print_hit(&cmd);
                }
            }
            recv(handle.feedback()) -> msg => {
                if let Ok(SequencerFeedback::LoopCompleted { loop_count, pattern }) = msg {
                    println!("-- loop {} (pattern {})", loop_count, pattern);
                    if args.mutate {
                        let action = BankAction::MutatePattern;
                        let outcome = handle.dispatch(action.clone());
                        report_outcome(&action, outcome);
                    }
                }
            }
            default(Duration::from_millis(50)) => {}
        }
    }

    handle.stop();
    for cmd in hits.try_iter() {
        print_hit(&cmd);
    }

    println!();
    println!("success rate {:.0}%", handle.success_rate() * 100.0);
    for (step, rate) in handle.heat_map() {
        println!("  step {:>2}  {:<20} {:.2}", step, "#".repeat((rate * 20.0).round() as usize), rate);
    }
    if sink.dropped() > 0 {
        println!("{} hits dropped", sink.dropped());
    }
    handle.shutdown();
    ExitCode::SUCCESS
}
