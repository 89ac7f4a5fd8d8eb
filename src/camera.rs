//! Webcam frames and the sources that produce them.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

const JPEG_QUALITY: u8 = 90;

/// One RGB video frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Flip left-right, so the preview behaves like a mirror
    pub fn mirror_horizontal(&self) -> Frame {
        let row_len = self.width as usize * 3;
        let mut data = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(row_len.max(1)) {
            for pixel in row.chunks_exact(3).rev() {
                data.extend_from_slice(pixel);
            }
        }
        Frame::new(data, self.width, self.height)
    }

    fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            anyhow!(
                "Frame buffer of {} bytes does not fit {}x{}",
                self.data.len(),
                self.width,
                self.height
            )
        })
    }

    /// Encode as JPEG for storage
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let img = self.to_rgb_image()?;
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
            .context("Failed to encode frame as JPEG")?;
        Ok(bytes)
    }
}

/// Something that yields frames on demand (a webcam, or a script in tests)
///
/// Dropping the source releases the underlying device.
pub trait FrameSource: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Opens a frame source; called lazily when the live view starts streaming
pub type CameraOpener = Box<dyn FnMut() -> Result<Box<dyn FrameSource>> + Send>;

#[cfg(feature = "camera")]
pub use webcam::NokhwaCamera;

#[cfg(feature = "camera")]
mod webcam {
    use super::{Frame, FrameSource};
    use anyhow::{anyhow, Result};
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;

    /// Native webcam via nokhwa
    pub struct NokhwaCamera {
        camera: Camera,
    }

    impl NokhwaCamera {
        /// Open the camera at `index` and start streaming
        pub fn open(index: u32) -> Result<Self> {
            let requested_format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

            let mut camera = Camera::new(CameraIndex::Index(index), requested_format)
                .map_err(|e| anyhow!("Could not open camera {}: {e}", index))?;
            camera
                .open_stream()
                .map_err(|e| anyhow!("Could not start camera stream: {e}"))?;

            log::info!(
                "Opened camera {} ({})",
                index,
                camera.info().human_name()
            );
            Ok(Self { camera })
        }
    }

    impl FrameSource for NokhwaCamera {
        fn read_frame(&mut self) -> Result<Frame> {
            let frame_data = self
                .camera
                .frame()
                .map_err(|e| anyhow!("Failed to capture frame: {e}"))?;
            let buffer = frame_data
                .decode_image::<RgbFormat>()
                .map_err(|e| anyhow!("Failed to decode frame: {e}"))?;

            let (width, height) = (buffer.width(), buffer.height());
            Ok(Frame::new(buffer.into_raw(), width, height))
        }
    }

    impl Drop for NokhwaCamera {
        fn drop(&mut self) {
            if let Err(e) = self.camera.stop_stream() {
                log::error!("Error stopping camera stream: {}", e);
            }
            log::debug!("Camera released");
        }
    }
}

/// Opener for the webcam at `index`
#[cfg(feature = "camera")]
pub fn webcam_opener(index: u32) -> CameraOpener {
    Box::new(move || Ok(Box::new(NokhwaCamera::open(index)?) as Box<dyn FrameSource>))
}

/// Without the `camera` feature every open attempt fails, which the live view
/// reports as an unavailable webcam.
#[cfg(not(feature = "camera"))]
pub fn webcam_opener(_index: u32) -> CameraOpener {
    Box::new(|| Err(anyhow!("Built without camera support")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_reverses_each_row() {
        let frame = Frame::new(vec![1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4, 4], 2, 2);
        let mirrored = frame.mirror_horizontal();
        assert_eq!(mirrored.data, vec![2, 2, 2, 1, 1, 1, 4, 4, 4, 3, 3, 3]);
        assert_eq!(mirrored.mirror_horizontal(), frame);
    }

    #[test]
    fn test_encode_jpeg_decodes_back() {
        let frame = Frame::new([200u8, 100, 50].repeat(16 * 8), 16, 8);
        let jpeg = frame.encode_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_bad_frame_buffer_rejected() {
        let frame = Frame::new(vec![0; 5], 2, 2);
        assert!(frame.to_rgb_image().is_err());
        assert!(frame.encode_jpeg().is_err());
    }
}
