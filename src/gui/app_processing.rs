// Background analysis for the GUI
// Each request runs on its own short-lived thread and reports back over a channel

use super::{AnalysisMessage, CaptureState, MoodVisionApp, UploadState, ViewResult};
use moodvision::analysis::AnalysisOutcome;
use moodvision::camera::Frame;
use std::sync::Arc;

impl MoodVisionApp {
    /// Classify the selected upload and store it on success
    pub fn start_upload_analysis(&mut self) {
        let Some(selected) = &self.selected else {
            return;
        };

        self.upload_state = UploadState::Analyzing;
        self.pending_jobs += 1;

        let request = self.upload_request;
        let filename = selected.filename.clone();
        let bytes = Arc::clone(&selected.bytes);
        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let tx = self.analysis_sender.clone();

        std::thread::spawn(move || {
            let result = engine
                .analyze_upload(&filename, &bytes, &store)
                .map_err(|e| {
                    log::error!("Analysis of {} failed: {:#}", filename, e);
                    format!("Analysis failed: {:#}", e)
                });
            let _ = tx.send(AnalysisMessage::Upload { request, result });
        });
    }

    /// Classify a captured frame and store it on success
    pub fn start_capture_analysis(&mut self, frame: Frame) {
        self.capture_state = Some(CaptureState::Analyzing);
        self.pending_jobs += 1;

        let generation = self.live.generation();
        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let tx = self.analysis_sender.clone();

        std::thread::spawn(move || {
            let result = engine.analyze_capture(&frame, &store).map_err(|e| {
                log::error!("Analysis of captured frame failed: {:#}", e);
                format!("Analysis failed: {:#}", e)
            });
            let _ = tx.send(AnalysisMessage::Capture { generation, result });
        });
    }

    /// Drain results from background threads
    pub fn check_results(&mut self) {
        while let Ok(message) = self.analysis_receiver.try_recv() {
            self.pending_jobs = self.pending_jobs.saturating_sub(1);

            match message {
                AnalysisMessage::Upload { request, result } => {
                    let stored = stored_record(&result);
                    // Stale results still produced a record, but the view has moved on
                    if request == self.upload_request {
                        self.upload_state = UploadState::Analyzed(ViewResult::from(result));
                    }
                    if stored {
                        self.invalidate_history();
                    }
                }
                AnalysisMessage::Capture { generation, result } => {
                    if stored_record(&result) {
                        self.invalidate_history();
                    }
                    // The camera was toggled while this capture was analyzed
                    if generation == self.live.generation() {
                        self.capture_state = Some(CaptureState::Done(ViewResult::from(result)));
                    }
                }
            }
        }
    }
}

fn stored_record(result: &Result<AnalysisOutcome, String>) -> bool {
    matches!(
        result,
        Ok(AnalysisOutcome::Detected {
            record_id: Some(_),
            ..
        })
    )
}
