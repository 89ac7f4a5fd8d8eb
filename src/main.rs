use anyhow::{anyhow, Context, Result};
use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use moodvision::analysis::{display_filename, AnalysisConfig, AnalysisEngine, AnalysisOutcome};
use moodvision::cli::{Args, Command};
use moodvision::config_file::{CliOverrides, Settings};
use moodvision::json_output::JsonMessage;
use moodvision::model::{load_model, LoadedModel};
use moodvision::mood::format_confidence;
use moodvision::report::HistoryReport;
use moodvision::storage::MoodStore;
use moodvision::utils::{
    create_progress_bar, error_println, format_duration, validate_inputs, verbose_println,
    warn_println,
};

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(args) {
        error_println(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if !args.json {
        println!("{}", style("MoodVision - Image Mood Analyzer").bold().blue());
        println!();
    }

    let mut overrides = CliOverrides::from(&args);
    match &args.command {
        Command::Analyze { extensions, .. } => overrides.extensions = extensions.clone(),
        #[cfg(feature = "camera")]
        Command::Capture { camera_index } => overrides.camera_index = *camera_index,
        _ => {}
    }
    let settings = Settings::load(args.config_file.as_deref(), &overrides, args.verbose && !args.json)?;

    if args.verbose && !args.json {
        println!("{}", style("Configuration:").bold());
        println!("  Model directory: {}", settings.model_dir.display());
        println!("  Database: {}", settings.database_path.display());
        println!("  Minimum confidence: {:.2}", settings.min_confidence);
        println!("  Extensions: {:?}", settings.extensions);
        println!();
    }

    match args.command.clone() {
        Command::Analyze {
            input_paths,
            jobs,
            dry_run,
            ..
        } => run_analyze(&args, &settings, &input_paths, jobs, dry_run),
        Command::History => run_history(&args, &settings),
        Command::Delete { ids } => run_delete(&args, &settings, &ids),
        Command::Export { id, output } => run_export(&args, &settings, id, output),
        #[cfg(feature = "camera")]
        Command::Capture { .. } => run_capture(&args, &settings),
    }
}

fn load_engine(args: &Args, settings: &Settings, jobs: usize) -> Result<AnalysisEngine> {
    verbose_println(
        args.verbose && !args.json,
        &format!("Loading model from {}", settings.model_dir.display()),
    );
    let model: Arc<LoadedModel> = load_model(&settings.model_dir)
        .with_context(|| format!("Failed to load mood model from {}", settings.model_dir.display()))?;

    let config = AnalysisConfig {
        min_confidence: settings.min_confidence,
        extensions: settings.extensions.clone(),
        parallel_jobs: jobs,
        verbose: args.verbose && !args.json,
    };
    AnalysisEngine::new(config, model)
}

fn open_store(settings: &Settings) -> Result<MoodStore> {
    MoodStore::open(&settings.database_path)
}

fn run_analyze(
    args: &Args,
    settings: &Settings,
    input_paths: &[PathBuf],
    jobs: usize,
    dry_run: bool,
) -> Result<()> {
    let start_time = Instant::now();
    validate_inputs(input_paths, jobs)?;

    let engine = load_engine(args, settings, jobs)?;
    let store = if dry_run {
        verbose_println(args.verbose && !args.json, "Dry run mode: nothing will be stored");
        None
    } else {
        Some(open_store(settings)?)
    };

    let image_files = engine.discover_images(input_paths)?;
    if image_files.is_empty() {
        if args.json {
            JsonMessage::Summary {
                total_files: 0,
                detected: 0,
                no_face: 0,
                failed: 0,
                duration_secs: start_time.elapsed().as_secs_f64(),
            }
            .emit();
        } else {
            println!("{}", style("No images found with specified extensions").red());
        }
        return Ok(());
    }

    let total = image_files.len();
    let progress = (!args.json).then(|| {
        let pb = create_progress_bar(total as u64);
        pb.set_message("Analyzing images");
        pb
    });

    let summary = engine.analyze_batch(&image_files, store.as_ref(), |index, path, result| {
        if args.json {
            match result {
                Ok(AnalysisOutcome::Detected {
                    prediction,
                    record_id,
                    ..
                }) => JsonMessage::prediction(path, prediction, *record_id).emit(),
                Ok(AnalysisOutcome::NoFace { confidence, .. }) => JsonMessage::NoFace {
                    input_path: path.display().to_string(),
                    confidence: *confidence,
                }
                .emit(),
                Err(e) => JsonMessage::file_failed(path, format!("{:#}", e)),
            }
            JsonMessage::progress(index + 1, total, display_filename(path));
            return;
        }

        let line = match result {
            Ok(AnalysisOutcome::Detected {
                prediction,
                record_id,
                ..
            }) => {
                let stored = match record_id {
                    Some(id) => format!("record #{}", id),
                    None => "not stored".to_string(),
                };
                format!(
                    "{} {}: {} ({})",
                    style("✓").green(),
                    display_filename(path),
                    style(prediction).bold(),
                    style(stored).dim()
                )
            }
            Ok(AnalysisOutcome::NoFace { confidence, .. }) => format!(
                "{} {}: No face detected ({})",
                style("!").yellow(),
                display_filename(path),
                format_confidence(*confidence)
            ),
            Err(e) => format!(
                "{} {}: {:#}",
                style("✗").red(),
                display_filename(path),
                e
            ),
        };

        if let Some(pb) = &progress {
            pb.println(line);
            pb.inc(1);
        }
    });

    let total_time = start_time.elapsed();

    if let Some(pb) = &progress {
        pb.finish_with_message("✓ Analysis complete!");
    }

    if args.json {
        JsonMessage::Summary {
            total_files: summary.total(),
            detected: summary.detected,
            no_face: summary.no_face,
            failed: summary.failed,
            duration_secs: total_time.as_secs_f64(),
        }
        .emit();
        return Ok(());
    }

    println!();
    let header = if dry_run {
        style("Dry Run Results Summary:").bold().cyan()
    } else {
        style("Results Summary:").bold().green()
    };
    println!("{}", header);

    let detected_label = if dry_run { "Detected (not stored)" } else { "Stored" };
    println!("  {}: {}", detected_label, style(summary.detected).bold().green());
    if summary.no_face > 0 {
        println!("  No face detected: {}", style(summary.no_face).bold().yellow());
    }
    if summary.failed > 0 {
        println!("  Failed: {}", style(summary.failed).bold().red());
    }
    println!("  Total time: {}", style(format_duration(total_time)).bold());

    Ok(())
}

fn run_history(args: &Args, settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;
    let records = store.list_all()?;

    if args.json {
        for record in &records {
            JsonMessage::record(record).emit();
        }
        return Ok(());
    }

    HistoryReport::new(&records).print();
    Ok(())
}

fn run_delete(args: &Args, settings: &Settings, ids: &[i64]) -> Result<()> {
    let store = open_store(settings)?;

    for &record_id in ids {
        let found = store.delete(record_id)?;
        if args.json {
            JsonMessage::Deleted { record_id, found }.emit();
        } else if found {
            println!("{} Deleted record #{}", style("✓").green(), record_id);
        } else {
            warn_println(&format!("Record #{} not found", record_id));
        }
    }

    Ok(())
}

fn run_export(args: &Args, settings: &Settings, record_id: i64, output: PathBuf) -> Result<()> {
    let store = open_store(settings)?;
    let record = store
        .get(record_id)?
        .ok_or_else(|| anyhow!("Record #{} not found", record_id))?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    std::fs::write(&output, &record.image)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if args.json {
        JsonMessage::Exported {
            record_id,
            output_path: output.display().to_string(),
        }
        .emit();
    } else {
        println!(
            "{} Exported record #{} ({}) to {}",
            style("✓").green(),
            record_id,
            record.filename,
            output.display()
        );
    }
    Ok(())
}

#[cfg(feature = "camera")]
fn run_capture(args: &Args, settings: &Settings) -> Result<()> {
    use moodvision::camera::{FrameSource, NokhwaCamera};

    // Auto-exposure needs a few frames to settle
    const WARMUP_FRAMES: usize = 5;

    let engine = load_engine(args, settings, 1)?;
    let store = open_store(settings)?;

    verbose_println(
        args.verbose && !args.json,
        &format!("Opening camera {}", settings.camera_index),
    );
    let frame = {
        let mut camera = NokhwaCamera::open(settings.camera_index)?;
        for _ in 0..WARMUP_FRAMES {
            camera.read_frame()?;
        }
        camera.read_frame()?.mirror_horizontal()
    };

    let outcome = engine.analyze_capture(&frame, &store)?;
    match outcome {
        AnalysisOutcome::Detected {
            filename,
            prediction,
            record_id,
        } => {
            if args.json {
                JsonMessage::prediction(std::path::Path::new(&filename), &prediction, record_id)
                    .emit();
            } else {
                println!(
                    "{} Mood: {} ({})",
                    style("✓").green(),
                    style(&prediction).bold(),
                    filename
                );
                println!("Captured successfully! Restart to take another.");
            }
        }
        AnalysisOutcome::NoFace {
            filename,
            confidence,
        } => {
            if args.json {
                JsonMessage::NoFace {
                    input_path: filename,
                    confidence,
                }
                .emit();
            } else {
                warn_println("No face detected. Please try a clearer image.");
            }
        }
    }
    Ok(())
}
