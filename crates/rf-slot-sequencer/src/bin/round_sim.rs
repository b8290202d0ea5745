//! Round sequencing simulator
//!
//! Usage:
//!   round_sim                              - Run the built-in anticipation round
//!   round_sim --round rounds.json          - Run rounds from a JSON file
//!   round_sim --autoplay 10 --turbo        - Autoplay session over the rounds
//!   round_sim --skip-after-ms 300 --json   - Skip mid-drop, print traces as JSON

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use rf_slot_sequencer::{
    Collaborators, Grid, RoundContext, RoundOutcome, RoundReport, RoundResult, RoundSequencer,
    SequencerConfig, WinDescriptor,
};

#[derive(Parser)]
#[command(name = "round_sim", about = "Sequence reel rounds headlessly and print their stage traces")]
struct Cli {
    /// Sequencer config (YAML, or JSON by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Round result JSON (single object or array)
    #[arg(short, long)]
    round: Option<PathBuf>,

    /// Run the rounds as an autoplay session of N spins
    #[arg(short, long)]
    autoplay: Option<u32>,

    /// Enable turbo timing
    #[arg(short, long)]
    turbo: bool,

    /// Request a skip this long after each round starts
    #[arg(long)]
    skip_after_ms: Option<u64>,

    /// Filler RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Print full traces as JSON
    #[arg(long)]
    json: bool,
}

fn demo_round() -> Result<RoundResult> {
    let grid = Grid::from_rows(vec![
        vec![4, 1, 1, 1, 9],
        vec![12, 6, 12, 5, 12],
        vec![3, 8, 2, 7, 6],
    ])?;
    Ok(RoundResult::new(grid).with_wins(vec![WinDescriptor::new(1, 1, 3).with_win(0.5)]))
}

fn schedule_skip(ctx: &RoundContext, after: Option<u64>) {
    if let Some(after_ms) = after {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            match ctx.request_skip() {
                Ok(()) => log::info!("[Sim] skip accepted"),
                Err(reason) => log::info!("[Sim] skip refused: {reason:?}"),
            }
        });
    }
}

fn print_report(report: &RoundReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.trace.to_json()?);
        return Ok(());
    }
    let summary = report.trace.summary();
    println!(
        "round {:>3} | {:>6.0}ms | lines {} | extended {:?} | stages {} | stops {:?} | skip {} | {:?}",
        report.round_id,
        report.elapsed_ms,
        report.lines.len(),
        report.extended_reels,
        summary.anticipation_stages,
        report.stop_order,
        report.skip_used,
        report.win_mode,
    );
    for warning in report.trace.validate().warnings() {
        println!("           ! {warning}");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SequencerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => SequencerConfig::default(),
    };
    if cli.seed.is_some() {
        config.symbols.filler_seed = cli.seed;
    }

    let rounds = match &cli.round {
        Some(path) => RoundResult::load_all(path).with_context(|| format!("loading {}", path.display()))?,
        None => vec![demo_round()?],
    };
    if rounds.is_empty() {
        bail!("no rounds to run");
    }

    let mut sequencer = RoundSequencer::new(config, Collaborators::logging())?;
    sequencer.set_turbo(cli.turbo);
    let ctx = sequencer.context();

    match cli.autoplay {
        Some(spins) => {
            let mut source: VecDeque<RoundResult> = rounds.iter().cycle().take(spins as usize).cloned().collect();
            // Skip timer is armed once for the first automated round
            schedule_skip(&ctx, cli.skip_after_ms);
            let summary = sequencer.run_autoplay(spins, &mut source).await?;
            for report in &summary.rounds {
                print_report(report, cli.json)?;
            }
            println!("autoplay ended: {:?}", summary.end);
        }
        None => {
            for round in rounds {
                schedule_skip(&ctx, cli.skip_after_ms);
                match sequencer.run_round(round).await {
                    RoundOutcome::Completed(report) => print_report(&report, cli.json)?,
                    RoundOutcome::Rejected(e) => println!("round rejected: {e}"),
                }
            }
        }
    }

    sequencer.interrupt_wins().await;
    Ok(())
}
