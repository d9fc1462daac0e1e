// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, built on clap.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`  — trains the selected heads, resuming from the
//                 latest checkpoint of each head
//   2. `status` — prints the latest checkpoint of each head
//
// With `--interactive`, `train` asks the two yes/no questions
// (classification? regression?) before anything is loaded.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::io::{self, BufRead, Write};

use anyhow::Result;
use burn::backend::{wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use clap::Parser;
use commands::{BackendArg, Commands, StatusArgs, TrainArgs};

use crate::application::train_use_case::TrainUseCase;
use crate::domain::head::Head;
use crate::infra::checkpoint::CheckpointManager;

#[derive(Parser, Debug)]
#[command(
    name = "localise-net",
    version = "0.1.0",
    about = "Train a two-headed CNN that classifies 28x28 crops and regresses their bounding boxes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Status(args) => run_status(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut cfg = args.to_config()?;
    if args.interactive {
        cfg.train_classification = confirm("Train the classification head?")?;
        cfg.train_regression = confirm("Train the regression head?")?;
    }

    let use_case = TrainUseCase::new(cfg);
    let reports = match args.backend {
        BackendArg::Ndarray => use_case.execute::<Autodiff<NdArray>>(Default::default())?,
        BackendArg::Wgpu => use_case.execute::<Autodiff<Wgpu>>(WgpuDevice::default())?,
    };

    for report in &reports {
        let last = report.epochs.last().map(|e| e.total_loss).unwrap_or(f64::NAN);
        println!(
            "{}: {} epochs, global step {}, final loss {:.6}, {} checkpoint(s) written",
            report.head,
            report.epochs.len(),
            report.global_step,
            last,
            report.checkpoints.len()
        );
    }
    println!("Training complete.");
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<()> {
    let cfg = args.to_config()?;
    for head in Head::ALL {
        let manager = CheckpointManager::new(&cfg.checkpoint_root, cfg.head_dir(head), cfg.max_to_keep);
        match manager.latest()? {
            Some(meta) => println!(
                "{head:<15} {}  epoch {}  step {}  ({} retained)",
                meta.tag,
                meta.epoch,
                meta.global_step,
                meta.retained.len()
            ),
            None => println!("{head:<15} no checkpoint in '{}'", manager.dir().display()),
        }
    }
    Ok(())
}

/// Yes/no question on stdin; anything but y/yes counts as no.
fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
