// Live camera view

use super::{render_result, CaptureState, MoodVisionApp};
use eframe::egui;
use moodvision::camera::Frame;
use moodvision::session::{LiveState, LiveTick};

const CAMERA_UNAVAILABLE: &str = "Unable to access the webcam.";
const CAPTURED_MESSAGE: &str = "Captured successfully! Restart to take another.";

fn frame_to_color_image(frame: &Frame) -> egui::ColorImage {
    egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.data)
}

impl MoodVisionApp {
    pub fn live_is_streaming(&self) -> bool {
        self.live.state() == LiveState::Streaming
    }

    /// Read one frame if streaming and react to what the session reports
    pub fn poll_live(&mut self, ctx: &egui::Context) {
        match self.live.poll() {
            LiveTick::Idle => {}
            LiveTick::Frame(frame) => self.show_frame(ctx, &frame),
            LiveTick::Captured(frame) => {
                self.show_frame(ctx, &frame);
                self.start_capture_analysis(frame);
            }
            LiveTick::Failed(_) => {
                self.camera_error = true;
                self.live_texture = None;
            }
        }
    }

    fn show_frame(&mut self, ctx: &egui::Context, frame: &Frame) {
        let image = frame_to_color_image(frame);
        match &mut self.live_texture {
            Some(texture) => texture.set(image, egui::TextureOptions::default()),
            None => {
                self.live_texture =
                    Some(ctx.load_texture("live-frame", image, egui::TextureOptions::default()));
            }
        }
    }

    fn set_camera_enabled(&mut self, enabled: bool) {
        if enabled {
            self.live.enable();
        } else {
            self.live.disable();
            self.live_texture = None;
        }
        self.camera_error = false;
        self.capture_state = None;
    }

    pub fn render_live(&mut self, ui: &mut egui::Ui) {
        ui.heading("🎥 Live Camera");
        ui.separator();

        let mut enabled = self.camera_enabled;
        if ui.checkbox(&mut enabled, "Enable camera").changed() {
            self.camera_enabled = enabled;
            self.set_camera_enabled(enabled);
        }
        ui.add_space(10.0);

        if self.camera_error {
            ui.colored_label(egui::Color32::YELLOW, CAMERA_UNAVAILABLE);
            return;
        }

        if let Some(texture) = &self.live_texture {
            ui.add(egui::Image::new(texture).max_width(640.0));
        }

        if self.live_is_streaming() {
            ui.add_space(10.0);
            let button = egui::Button::new("Capture").min_size(egui::vec2(200.0, 40.0));
            if ui.add(button).clicked() {
                self.live.request_capture();
            }
        }

        match &self.capture_state {
            Some(CaptureState::Analyzing) => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Analyzing…");
                });
            }
            Some(CaptureState::Done(result)) => {
                ui.add_space(10.0);
                render_result(ui, result, true);
                ui.label(CAPTURED_MESSAGE);
            }
            None => {}
        }
    }
}
