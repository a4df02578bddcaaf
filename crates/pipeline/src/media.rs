//! Image decoding and thumbnailing on the blocking thread pool.

use std::io::Cursor;

use async_trait::async_trait;
use image::{ImageFormat, ImageReader};

use sumi_core::error::CoreError;
use sumi_core::ports::{Dimensions, MediaProcessor};

/// `image`-crate processor. Decoding runs under `spawn_blocking`; a file
/// that fails to decode rejects the upload.
pub struct ImageProcessor;

#[async_trait]
impl MediaProcessor for ImageProcessor {
    async fn decode(&self, data: &[u8]) -> Result<Dimensions, CoreError> {
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            let reader = ImageReader::new(Cursor::new(&data))
                .with_guessed_format()
                .map_err(|e| CoreError::Resource(format!("unreadable upload: {e}")))?;
            let (width, height) = reader
                .into_dimensions()
                .map_err(|e| CoreError::Resource(format!("not a supported image: {e}")))?;
            Ok(Dimensions { width, height })
        })
        .await
        .map_err(|e| CoreError::Internal(format!("decode task panicked: {e}")))?
    }

    async fn thumbnail(
        &self,
        data: &[u8],
        max_w: u32,
        max_h: u32,
    ) -> Result<Vec<u8>, CoreError> {
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&data)
                .map_err(|e| CoreError::Resource(format!("not a supported image: {e}")))?;
            let thumb = img.thumbnail(max_w, max_h);
            let mut out = Cursor::new(Vec::new());
            thumb
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|e| CoreError::Resource(format!("thumbnail encoding failed: {e}")))?;
            Ok(out.into_inner())
        })
        .await
        .map_err(|e| CoreError::Internal(format!("thumbnail task panicked: {e}")))?
    }
}
