// History view: stored records, newest first, with per-row delete

use super::MoodVisionApp;
use eframe::egui;
use moodvision::image_processing::decode_image;
use moodvision::mood::format_confidence;
use moodvision::report::{total_entries_line, EMPTY_HISTORY};
use moodvision::storage::MoodRecord;

const THUMBNAIL_SIZE: f32 = 100.0;

fn thumbnail_for(ctx: &egui::Context, record: &MoodRecord) -> Option<egui::TextureHandle> {
    match decode_image(&record.image) {
        Ok(rgb) => {
            let size = [rgb.width() as usize, rgb.height() as usize];
            let image = egui::ColorImage::from_rgb(size, rgb.as_raw());
            Some(ctx.load_texture(
                format!("thumb-{}", record.record_id),
                image,
                egui::TextureOptions::default(),
            ))
        }
        Err(e) => {
            log::warn!("Cannot decode image of record {}: {:#}", record.record_id, e);
            None
        }
    }
}

impl MoodVisionApp {
    /// Drop the cached listing; it is re-queried on the next render
    pub fn invalidate_history(&mut self) {
        self.history = None;
    }

    fn refresh_history(&mut self) {
        match self.store.list_all() {
            Ok(records) => {
                self.thumbnails
                    .retain(|id, _| records.iter().any(|r| r.record_id == *id));
                self.history = Some(records);
            }
            Err(e) => {
                log::error!("Failed to load history: {:#}", e);
                self.history_error = format!("Failed to load history: {:#}", e);
                self.history = Some(Vec::new());
            }
        }
    }

    pub fn render_history(&mut self, ui: &mut egui::Ui) {
        ui.heading("🕓 History");
        ui.separator();

        if self.history.is_none() {
            self.refresh_history();
        }
        if !self.history_error.is_empty() {
            ui.colored_label(egui::Color32::RED, &self.history_error);
        }

        let records = self.history.take().unwrap_or_default();
        ui.label(egui::RichText::new(total_entries_line(records.len())).strong());
        ui.add_space(10.0);

        if records.is_empty() {
            ui.label(EMPTY_HISTORY);
            self.history = Some(records);
            return;
        }

        let mut to_delete = None;
        for record in &records {
            let thumbnail = self
                .thumbnails
                .entry(record.record_id)
                .or_insert_with(|| thumbnail_for(ui.ctx(), record))
                .clone();

            ui.horizontal(|ui| {
                match &thumbnail {
                    Some(texture) => {
                        ui.add(
                            egui::Image::new(texture)
                                .max_width(THUMBNAIL_SIZE)
                                .max_height(THUMBNAIL_SIZE),
                        );
                    }
                    None => {
                        ui.add_sized([THUMBNAIL_SIZE, THUMBNAIL_SIZE], egui::Label::new("No preview"));
                    }
                }

                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(&record.filename).strong());
                    ui.label(format!("{} {}", record.mood, record.mood.emoji()));
                    ui.label(format!("Confidence: {}", format_confidence(record.confidence)));
                    ui.label(egui::RichText::new(&record.created_at).weak());
                    if ui.button("Delete").clicked() {
                        to_delete = Some(record.record_id);
                    }
                });
            });
            ui.separator();
        }

        self.history = Some(records);

        if let Some(record_id) = to_delete {
            match self.store.delete(record_id) {
                Ok(_) => {
                    self.thumbnails.remove(&record_id);
                    self.history_error.clear();
                }
                Err(e) => {
                    log::error!("Failed to delete record {}: {:#}", record_id, e);
                    self.history_error = format!("Failed to delete record {}: {:#}", record_id, e);
                }
            }
            self.invalidate_history();
        }
    }
}
