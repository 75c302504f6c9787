use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rust_omr::decoder::IdentityDecoder;
use rust_omr::detector::markers::{QUADRANT_NAMES, find_markers};
use rust_omr::error::fmt_error_chain;
use rust_omr::tools::{
    answer_line, bench_limit_from_env, dataset_iter, dataset_root_from_env, grayscale_stats,
    load_answer_key, load_gray, render_overlay,
};
use rust_omr::{RasterImage, Recognizer, RecognizerConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "omrtool", version, about = "RustOMR CLI tools")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// JSON configuration file; defaults are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize a single sheet
    Recognize {
        #[arg(long)]
        image: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Write an overlay of the located grid to this path
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Print the five darkness values and the decision for every question
    Diagnose {
        #[arg(long)]
        image: PathBuf,
    },
    /// Print the marker search for an image
    Markers {
        #[arg(long)]
        image: PathBuf,
    },
    /// Decode only the identity code
    Identity {
        #[arg(long)]
        image: PathBuf,
    },
    /// Recognize every sheet under a directory and score against `.key` files
    Batch {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => match RecognizerConfig::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Failed to load config {}: {}", path.display(), fmt_error_chain(&err));
                return ExitCode::FAILURE;
            }
        },
        None => RecognizerConfig::default(),
    };

    match cli.command {
        Command::Recognize {
            image,
            json,
            overlay,
        } => recognize_cmd(config, &image, json, overlay.as_deref()),
        Command::Diagnose { image } => diagnose_cmd(config, &image),
        Command::Markers { image } => markers_cmd(&config, &image),
        Command::Identity { image } => identity_cmd(config, &image),
        Command::Batch { root, limit } => batch_cmd(config, root, limit),
        Command::Config => config_cmd(&config),
    }
}

fn load(image: &Path) -> Option<RasterImage> {
    match load_gray(image) {
        Ok(raster) => Some(raster),
        Err(err) => {
            eprintln!("Failed to load image {}: {}", image.display(), err);
            None
        }
    }
}

fn build(config: RecognizerConfig) -> Option<Recognizer> {
    match Recognizer::new(config) {
        Ok(recognizer) => Some(recognizer),
        Err(err) => {
            eprintln!("Invalid configuration: {}", fmt_error_chain(&err));
            None
        }
    }
}

fn recognize_cmd(config: RecognizerConfig, image: &Path, json: bool, overlay: Option<&Path>) -> ExitCode {
    let (Some(raster), Some(recognizer)) = (load(image), build(config)) else {
        return ExitCode::FAILURE;
    };

    let analysis = match recognizer.analyze(&raster) {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("{}: [{}] {}", image.display(), err.kind(), fmt_error_chain(&err));
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&analysis.result) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("Failed to serialize result: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let result = &analysis.result;
        println!("Image: {} ({}x{})", image.display(), raster.width(), raster.height());
        println!(
            "Strategy: {}, aligned by markers: {}, {:.1}ms",
            result.strategy,
            result.aligned_by_markers,
            result.elapsed.as_secs_f64() * 1000.0
        );
        match &result.identity {
            Some(code) => println!("Identity: {} (valid: {}, via {})", code.text, code.valid, code.method),
            None => println!("Identity: not decoded"),
        }
        println!(
            "Answered: {}, blank: {}, double: {}",
            result.counts.answered, result.counts.blank, result.counts.double
        );
        let line = answer_line(&analysis);
        for (i, chunk) in line.as_bytes().chunks(15).enumerate() {
            println!("  {:>3}-{:<3} {}", i * 15 + 1, i * 15 + chunk.len(), String::from_utf8_lossy(chunk));
        }
        for warning in &result.warnings {
            println!("Warning: {warning}");
        }
    }

    if let Some(path) = overlay {
        let canvas = render_overlay(&analysis, &recognizer.config().template);
        if let Err(err) = canvas.save(path) {
            eprintln!("Failed to write overlay {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
        println!("Overlay written to {}", path.display());
    }
    ExitCode::SUCCESS
}

fn diagnose_cmd(config: RecognizerConfig, image: &Path) -> ExitCode {
    let (Some(raster), Some(recognizer)) = (load(image), build(config)) else {
        return ExitCode::FAILURE;
    };
    let analysis = match recognizer.analyze(&raster) {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("{}: [{}] {}", image.display(), err.kind(), fmt_error_chain(&err));
            return ExitCode::FAILURE;
        }
    };

    println!("Image: {} ({}x{})", image.display(), raster.width(), raster.height());
    println!("Calibration: {:?}", analysis.calibration.alignment);
    for (kind, failure) in &analysis.rejected {
        println!("Rejected {kind} grid: {failure}");
    }
    println!("Strategy: {}", analysis.result.strategy);
    println!("  Q     A     B     C     D     E   best  diff   std  result");
    for (question, stats) in analysis.grid.questions.iter().zip(&analysis.stats) {
        let values: Vec<String> = question
            .bubbles
            .iter()
            .map(|b| format!("{:5.1}", b.sample.darkness))
            .collect();
        let decision = match analysis.result.question(question.question) {
            Some(c) => c.to_string(),
            None => "?".to_string(),
        };
        println!(
            "{:>3} {}   {:>4} {:5.1} {:5.1}  {}",
            question.question,
            values.join(" "),
            stats.best.as_str(),
            stats.diff,
            stats.std,
            decision
        );
    }
    ExitCode::SUCCESS
}

fn markers_cmd(config: &RecognizerConfig, image: &Path) -> ExitCode {
    let Some(raster) = load(image) else {
        return ExitCode::FAILURE;
    };
    let stats = grayscale_stats(&raster);
    println!("Image: {} ({}x{})", image.display(), raster.width(), raster.height());
    println!("Grayscale range: {}-{}, average: {}", stats.min, stats.max, stats.avg);

    let search = find_markers(&raster, &config.template, &config.calibration);
    println!("Found {} marker candidates", search.candidates.len());
    for (name, quadrant) in QUADRANT_NAMES.iter().zip(search.quadrants.iter()) {
        match quadrant {
            Some(c) => println!(
                "  {name}: centroid=({:.1}, {:.1}) area={} fill={:.2}",
                c.centroid.x,
                c.centroid.y,
                c.area,
                c.fill_ratio()
            ),
            None => println!("  {name}: missing"),
        }
    }
    if search.found() == 4 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn identity_cmd(config: RecognizerConfig, image: &Path) -> ExitCode {
    let Some(raster) = load(image) else {
        return ExitCode::FAILURE;
    };
    let decoder = IdentityDecoder::new(config.identity);
    let start = Instant::now();
    match decoder.decode(&raster) {
        Some(code) => {
            println!(
                "{} (valid: {}, via {}, {:.2?})",
                code.text,
                code.valid,
                code.method,
                start.elapsed()
            );
            ExitCode::SUCCESS
        }
        None => {
            println!("No identity code decoded ({:.2?})", start.elapsed());
            ExitCode::FAILURE
        }
    }
}

fn batch_cmd(config: RecognizerConfig, root: Option<PathBuf>, limit: Option<usize>) -> ExitCode {
    let root = root.unwrap_or_else(dataset_root_from_env);
    let limit = limit.or_else(bench_limit_from_env);
    if !root.exists() {
        eprintln!("Dataset root not found: {}", root.display());
        return ExitCode::FAILURE;
    }
    let Some(recognizer) = build(config) else {
        return ExitCode::FAILURE;
    };

    let images: Vec<PathBuf> = dataset_iter(&root, limit).collect();
    if images.is_empty() {
        println!("No images found under {}", root.display());
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    let outcomes: Vec<(PathBuf, Option<(usize, usize)>, Result<String, String>)> = images
        .par_iter()
        .map(|path| {
            let outcome = load_gray(path).map_err(|e| e.to_string()).and_then(|raster| {
                recognizer
                    .recognize(&raster)
                    .map_err(|e| format!("[{}] {}", e.kind(), fmt_error_chain(&e)))
            });
            let score = match (&outcome, load_answer_key(path)) {
                (Ok(result), Some(key)) => {
                    let correct = key
                        .iter()
                        .zip(&result.questions)
                        .filter(|(expected, got)| **expected == got.classification)
                        .count();
                    Some((correct, key.len()))
                }
                _ => None,
            };
            let summary = outcome.map(|r| {
                format!(
                    "{} answered, {} blank, {} double via {}",
                    r.counts.answered, r.counts.blank, r.counts.double, r.strategy
                )
            });
            (path.clone(), score, summary)
        })
        .collect();

    let mut failures = 0usize;
    let (mut correct, mut graded) = (0usize, 0usize);
    for (path, score, summary) in &outcomes {
        let name = path.strip_prefix(&root).unwrap_or(path.as_path()).display();
        match summary {
            Ok(text) => match score {
                Some((c, t)) => {
                    correct += c;
                    graded += t;
                    println!("  {name}: {text} ({c}/{t} match key)");
                }
                None => println!("  {name}: {text}"),
            },
            Err(err) => {
                failures += 1;
                println!("  {name}: FAILED {err}");
            }
        }
    }

    println!("\nSheets: {}, failed: {}, total {:.2?}", outcomes.len(), failures, start.elapsed());
    if graded > 0 {
        println!(
            "Question accuracy: {}/{} = {:.2}%",
            correct,
            graded,
            correct as f64 / graded as f64 * 100.0
        );
    }
    ExitCode::SUCCESS
}

fn config_cmd(config: &RecognizerConfig) -> ExitCode {
    match config.to_json_pretty() {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Failed to serialize config: {}", fmt_error_chain(&err));
            ExitCode::FAILURE
        }
    }
}
