// ============================================================
// Layer 4 — DICOM Decoding
// ============================================================
// Converts an uploaded .dcm file into an ordinary RGB image so
// it can go through the same ImagePreprocessor as JPEG/PNG scans.
//
//   raw pixel values (any bit depth, first frame only)
//       │  v -= min
//       │  if max > 0: v /= max
//       │  v = clamp(v * 255, 0, 255) as u8
//       ▼
//   8-bit grayscale (or RGB when samples_per_pixel == 3)
//       ▼
//   RGB DynamicImage
//
// Files with and without the 128-byte preamble are accepted.

use anyhow::{bail, Result};
use dicom_pixeldata::PixelDecoder;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::data::preprocessor::UndecodableScan;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4]     = b"DICM";

fn undecodable(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UndecodableScan(msg.into()))
}

/// Decode a DICOM byte buffer into an RGB image.
pub fn decode_dicom(bytes: &[u8]) -> Result<DynamicImage> {
    let body = strip_preamble(bytes);

    let obj = dicom_object::from_reader(body)
        .map_err(|e| undecodable(format!("DICOM parse error: {e}")))?;

    let pixels = obj
        .decode_pixel_data()
        .map_err(|e| undecodable(format!("DICOM pixel data error: {e}")))?;

    let rows    = pixels.rows();
    let columns = pixels.columns();
    let samples = pixels.samples_per_pixel();

    let values: Vec<f32> = pixels
        .to_vec::<f32>()
        .map_err(|e| undecodable(format!("DICOM pixel conversion error: {e}")))?;

    tracing::debug!(
        "DICOM frame {}x{} ({} samples/pixel, {} values)",
        columns,
        rows,
        samples,
        values.len()
    );

    frame_to_image(&values, rows, columns, samples)
}

/// Skip the 128-byte preamble when the "DICM" magic follows it.
fn strip_preamble(bytes: &[u8]) -> &[u8] {
    if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
    {
        &bytes[PREAMBLE_LEN..]
    } else {
        bytes
    }
}

/// Min–max normalise raw values into 0..=255.
pub fn normalize_to_u8(values: &[f32]) -> Vec<u8> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let shifted: Vec<f32> = values.iter().map(|&v| v - min).collect();
    let max = shifted.iter().copied().fold(0.0f32, f32::max);

    shifted
        .into_iter()
        .map(|v| {
            let v = if max > 0.0 { v / max } else { v };
            (v * 255.0).clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Build an RGB image from the first frame of interleaved pixel values.
pub fn frame_to_image(values: &[f32], rows: u32, columns: u32, samples: u16) -> Result<DynamicImage> {
    let frame_len = rows as usize * columns as usize * samples as usize;
    if frame_len == 0 {
        return Err(undecodable("DICOM image has no pixels"));
    }
    if values.len() < frame_len {
        return Err(undecodable(format!(
            "DICOM pixel data too short: {} values for a {}x{}x{} frame",
            values.len(),
            columns,
            rows,
            samples
        )));
    }

    let bytes = normalize_to_u8(&values[..frame_len]);

    let img = match samples {
        1 => GrayImage::from_raw(columns, rows, bytes).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(columns, rows, bytes).map(DynamicImage::ImageRgb8),
        n => bail!(UndecodableScan(format!("unsupported samples per pixel: {n}"))),
    };

    let img = img.ok_or_else(|| undecodable("DICOM frame does not match its dimensions"))?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}
