use eframe::egui;
use moodvision::analysis::{AnalysisConfig, AnalysisEngine, AnalysisOutcome};
use moodvision::camera::webcam_opener;
use moodvision::config_file::{default_config_path, Settings};
use moodvision::image_processing::decode_image;
use moodvision::model::LoadedModel;
use moodvision::mood::MoodPrediction;
use moodvision::session::LiveSession;
use moodvision::storage::{MoodRecord, MoodStore};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

#[path = "app_history.rs"]
mod app_history;
#[path = "app_live.rs"]
mod app_live;
#[path = "app_processing.rs"]
mod app_processing;

const UPLOAD_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
pub(crate) const NO_FACE_MESSAGE: &str = "No face detected. Please try a clearer image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Upload,
    Live,
    History,
}

/// Upload view: Idle -> ImageSelected -> Analyzed
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UploadState {
    Idle,
    ImageSelected,
    Analyzing,
    Analyzed(ViewResult),
}

/// What a finished analysis shows
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ViewResult {
    Mood(MoodPrediction),
    NoFace,
    Error(String),
}

impl From<Result<AnalysisOutcome, String>> for ViewResult {
    fn from(result: Result<AnalysisOutcome, String>) -> Self {
        match result {
            Ok(AnalysisOutcome::Detected { prediction, .. }) => ViewResult::Mood(prediction),
            Ok(AnalysisOutcome::NoFace { .. }) => ViewResult::NoFace,
            Err(e) => ViewResult::Error(e),
        }
    }
}

/// Messages from background analysis threads
#[derive(Debug)]
pub(crate) enum AnalysisMessage {
    Upload {
        request: u64,
        result: Result<AnalysisOutcome, String>,
    },
    Capture {
        generation: u64,
        result: Result<AnalysisOutcome, String>,
    },
}

pub(crate) struct SelectedImage {
    pub filename: String,
    pub bytes: Arc<Vec<u8>>,
    pub texture: Option<egui::TextureHandle>,
}

/// Editable copy of the settings shown in the settings panel
struct SettingsDraft {
    model_dir: String,
    database_path: String,
    camera_index: u32,
    min_confidence: f32,
}

impl From<&Settings> for SettingsDraft {
    fn from(settings: &Settings) -> Self {
        Self {
            model_dir: settings.model_dir.display().to_string(),
            database_path: settings.database_path.display().to_string(),
            camera_index: settings.camera_index,
            min_confidence: settings.min_confidence,
        }
    }
}

pub struct MoodVisionApp {
    settings: Settings,
    model: Arc<LoadedModel>,
    engine: Arc<AnalysisEngine>,
    store: Arc<MoodStore>,
    tab: Tab,

    // Upload view
    selected: Option<SelectedImage>,
    upload_state: UploadState,
    upload_request: u64,

    // Live view
    live: LiveSession,
    camera_enabled: bool,
    live_texture: Option<egui::TextureHandle>,
    camera_error: bool,
    capture_state: Option<CaptureState>,

    // History view (cached until the next insert or delete)
    history: Option<Vec<MoodRecord>>,
    thumbnails: HashMap<i64, Option<egui::TextureHandle>>,
    history_error: String,

    // Settings panel
    show_settings: bool,
    draft: SettingsDraft,
    settings_message: String,

    // Communication channel for background analysis
    analysis_sender: std::sync::mpsc::Sender<AnalysisMessage>,
    analysis_receiver: Receiver<AnalysisMessage>,
    pending_jobs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CaptureState {
    Analyzing,
    Done(ViewResult),
}

/// Analysis engine for the GUI; rebuilt when the confidence threshold changes
pub(crate) fn build_engine(
    settings: &Settings,
    model: Arc<LoadedModel>,
) -> anyhow::Result<Arc<AnalysisEngine>> {
    let config = AnalysisConfig {
        min_confidence: settings.min_confidence,
        extensions: settings.extensions.clone(),
        parallel_jobs: 1,
        verbose: false,
    };
    Ok(Arc::new(AnalysisEngine::new(config, model)?))
}

impl MoodVisionApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        settings: Settings,
        model: Arc<LoadedModel>,
        engine: Arc<AnalysisEngine>,
        store: Arc<MoodStore>,
    ) -> Self {
        let live = LiveSession::new(webcam_opener(settings.camera_index), settings.frame_interval());
        let (analysis_sender, analysis_receiver) = std::sync::mpsc::channel();

        Self {
            draft: SettingsDraft::from(&settings),
            settings,
            model,
            engine,
            store,
            tab: Tab::Upload,
            selected: None,
            upload_state: UploadState::Idle,
            upload_request: 0,
            live,
            camera_enabled: false,
            live_texture: None,
            camera_error: false,
            capture_state: None,
            history: None,
            thumbnails: HashMap::new(),
            history_error: String::new(),
            show_settings: false,
            settings_message: String::new(),
            analysis_sender,
            analysis_receiver,
            pending_jobs: 0,
        }
    }

    fn select_image(&mut self, ctx: &egui::Context, filename: String, bytes: Vec<u8>) {
        let texture = match decode_image(&bytes) {
            Ok(rgb) => {
                let size = [rgb.width() as usize, rgb.height() as usize];
                let color_image = egui::ColorImage::from_rgb(size, rgb.as_raw());
                Some(ctx.load_texture("upload-preview", color_image, egui::TextureOptions::default()))
            }
            Err(e) => {
                log::warn!("Cannot preview {}: {:#}", filename, e);
                None
            }
        };

        self.selected = Some(SelectedImage {
            filename,
            bytes: Arc::new(bytes),
            texture,
        });
        // A new selection invalidates any analysis still in flight
        self.upload_request += 1;
        self.upload_state = UploadState::ImageSelected;
    }

    fn open_file_dialog(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &UPLOAD_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        self.load_file(ctx, &path);
    }

    fn load_file(&mut self, ctx: &egui::Context, path: &Path) {
        match std::fs::read(path) {
            Ok(bytes) => {
                let filename = moodvision::analysis::display_filename(path);
                self.select_image(ctx, filename, bytes);
            }
            Err(e) => {
                self.upload_state =
                    UploadState::Analyzed(ViewResult::Error(format!("Failed to read {}: {}", path.display(), e)));
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().next() else {
            return;
        };

        if let Some(bytes) = file.bytes {
            self.select_image(ctx, file.name.clone(), bytes.to_vec());
        } else if let Some(path) = file.path {
            self.load_file(ctx, &path);
        }
    }

    fn render_upload(&mut self, ui: &mut egui::Ui) {
        ui.heading("📷 Upload Image");
        ui.separator();

        ui.horizontal(|ui| {
            if ui.button("Choose image…").clicked() {
                self.open_file_dialog(ui.ctx());
            }
            ui.label("(jpg, jpeg, png, webp, or drop a file onto the window)");
        });
        ui.add_space(10.0);

        let Some(selected) = &self.selected else {
            ui.label("Upload an image to begin analysis.");
            return;
        };

        ui.label(&selected.filename);
        if let Some(texture) = &selected.texture {
            ui.add(egui::Image::new(texture).max_width(400.0).max_height(400.0));
        }
        ui.add_space(10.0);

        let analyzing = self.upload_state == UploadState::Analyzing;
        let button = egui::Button::new("Analyze Mood").min_size(egui::vec2(200.0, 40.0));
        if ui.add_enabled(!analyzing, button).clicked() {
            self.start_upload_analysis();
        }
        ui.add_space(10.0);

        match &self.upload_state {
            UploadState::Analyzing => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Analyzing…");
                });
            }
            UploadState::Analyzed(result) => render_result(ui, result, false),
            UploadState::Idle | UploadState::ImageSelected => {}
        }
    }

    fn render_settings(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("settings")
            .resizable(false)
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading("⚙ Settings");
                ui.separator();

                ui.label("Model directory:");
                ui.text_edit_singleline(&mut self.draft.model_dir);
                ui.label("Database file:");
                ui.text_edit_singleline(&mut self.draft.database_path);
                ui.horizontal(|ui| {
                    ui.label("Camera index:");
                    ui.add(egui::DragValue::new(&mut self.draft.camera_index).range(0..=16));
                });
                ui.label("Minimum confidence:");
                ui.add(egui::Slider::new(&mut self.draft.min_confidence, 0.0..=1.0));
                ui.add_space(10.0);

                if ui.button("Save").clicked() {
                    self.save_settings();
                }
                if !self.settings_message.is_empty() {
                    ui.label(&self.settings_message);
                }
            });
    }

    fn save_settings(&mut self) {
        let updated = Settings {
            model_dir: self.draft.model_dir.trim().into(),
            database_path: self.draft.database_path.trim().into(),
            camera_index: self.draft.camera_index,
            min_confidence: self.draft.min_confidence,
            ..self.settings.clone()
        };

        let Some(path) = default_config_path() else {
            self.settings_message = "No configuration directory on this system".to_string();
            return;
        };
        if let Err(e) = updated.save(&path) {
            self.settings_message = format!("Failed to save: {:#}", e);
            return;
        }

        let needs_restart = updated.model_dir != self.settings.model_dir
            || updated.database_path != self.settings.database_path
            || updated.camera_index != self.settings.camera_index;

        if updated.min_confidence != self.settings.min_confidence {
            match build_engine(&updated, Arc::clone(&self.model)) {
                Ok(engine) => self.engine = engine,
                Err(e) => {
                    log::error!("Failed to rebuild analysis engine: {:#}", e);
                    self.settings_message = format!("Saved, but not applied: {:#}", e);
                    self.settings = updated;
                    return;
                }
            }
        }
        self.settings = updated;
        self.settings_message = if needs_restart {
            "Saved. Restart to apply model, database and camera changes.".to_string()
        } else {
            "Saved.".to_string()
        };
    }
}

/// Show a finished analysis. Live captures use the one-decimal heading style.
pub(crate) fn render_result(ui: &mut egui::Ui, result: &ViewResult, live: bool) {
    match result {
        ViewResult::Mood(prediction) => {
            if live {
                ui.heading(
                    egui::RichText::new(format!(
                        "Mood: {} {} ({})",
                        prediction.mood,
                        prediction.mood.emoji(),
                        moodvision::mood::format_confidence_short(prediction.confidence)
                    ))
                    .strong(),
                );
            } else {
                ui.heading(format!("{} {}", prediction.mood, prediction.mood.emoji()));
                ui.label(format!("Confidence: {}", prediction.confidence_percent()));
            }
        }
        ViewResult::NoFace => {
            ui.colored_label(egui::Color32::YELLOW, NO_FACE_MESSAGE);
        }
        ViewResult::Error(e) => {
            ui.colored_label(egui::Color32::RED, e);
        }
    }
}

impl eframe::App for MoodVisionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Check for results from background threads
        self.check_results();
        self.handle_dropped_files(ctx);
        // One camera read per pass, whichever tab is shown
        self.poll_live(ctx);

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Upload, "📷 Upload Image");
                ui.selectable_value(&mut self.tab, Tab::Live, "🎥 Live Camera");
                ui.selectable_value(&mut self.tab, Tab::History, "🕓 History");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_settings, "⚙");
                });
            });
        });

        if self.show_settings {
            self.render_settings(ctx);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| match self.tab {
                Tab::Upload => self.render_upload(ui),
                Tab::Live => self.render_live(ui),
                Tab::History => self.render_history(ui),
            });
        });

        if self.live_is_streaming() {
            ctx.request_repaint_after(self.live.frame_interval());
        }
        if self.pending_jobs > 0 {
            ctx.request_repaint();
        }
    }
}
