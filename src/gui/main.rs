// GUI entry point for MoodVision
// Loads settings, the model and the record store, then opens the window

use eframe::egui;
use moodvision::config_file::{CliOverrides, Settings};
use moodvision::model::load_model;
use moodvision::storage::MoodStore;
use std::path::PathBuf;
use std::sync::Arc;

mod app;
use app::MoodVisionApp;

fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Optional first argument: config file path
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let settings = match Settings::load(config_path.as_deref(), &CliOverrides::default(), false) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Model load failure is fatal: nothing in the UI works without it
    let model = match load_model(&settings.model_dir) {
        Ok(model) => model,
        Err(e) => {
            log::error!(
                "Failed to load mood model from {}: {:#}",
                settings.model_dir.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let store = match MoodStore::open(&settings.database_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("Failed to open mood database: {:#}", e);
            std::process::exit(1);
        }
    };

    let engine = match app::build_engine(&settings, Arc::clone(&model)) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to create analysis engine: {:#}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 700.0])
            .with_min_inner_size([640.0, 480.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "MoodVision — Image Mood Analyzer",
        options,
        Box::new(move |cc| Ok(Box::new(MoodVisionApp::new(cc, settings, model, engine, store)))),
    )
}
