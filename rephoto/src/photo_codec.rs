//! The load and save boundary: turning encoded bytes into a [`Photo`] and back.
//!
//! Common compressed formats go through the `image` crate. TIFF is decoded
//! with the `tiff` crate directly so that any page of a multi-page file can
//! be selected, and every supported sample layout is converted to RGBA8.

use crate::error::{RegistrationError, Result};
use crate::photo::Photo;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};

/// Where a load gets its pixels from.
#[derive(Debug, Clone)]
pub enum LoadSource {
    /// Encoded file contents, decoded here.
    Bytes(Vec<u8>),
    /// Pixels decoded elsewhere.
    Pixels(Photo),
}

/// A request to populate a panel.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub source: LoadSource,
    pub filename: String,
    pub mime_type: Option<String>,
    /// Page of a multi-page TIFF to decode; ignored for other formats.
    pub page: usize,
}

impl LoadRequest {
    pub fn from_bytes(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        LoadRequest {
            source: LoadSource::Bytes(bytes),
            filename: filename.into(),
            mime_type: None,
            page: 0,
        }
    }

    pub fn from_photo(photo: Photo, filename: impl Into<String>) -> Self {
        LoadRequest {
            source: LoadSource::Pixels(photo),
            filename: filename.into(),
            mime_type: None,
            page: 0,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }
}

/// Facts about a loaded image kept alongside its pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub filename: String,
    pub mime_type: Option<String>,
    /// Number of pages in the source file (1 for single-image formats).
    pub page_count: usize,
    /// The page the pixels were taken from.
    pub page: usize,
}

/// A decoded image.
#[derive(Debug, Clone)]
pub struct DecodedPhoto {
    pub photo: Photo,
    pub metadata: ImageMetadata,
}

/// Output formats of the save boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Tiff,
}

impl SaveFormat {
    pub fn is_lossless(&self) -> bool {
        !matches!(self, SaveFormat::Jpeg)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SaveFormat::Png => "image/png",
            SaveFormat::Jpeg => "image/jpeg",
            SaveFormat::Tiff => "image/tiff",
        }
    }

    /// Picks a format from a file extension, case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            _ => None,
        }
    }
}

/// A request to encode a panel's current pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub format: SaveFormat,
    /// JPEG quality in `1..=100`; ignored by lossless formats.
    pub quality: u8,
}

impl SaveRequest {
    pub fn new(format: SaveFormat) -> Self {
        SaveRequest { format, quality: 90 }
    }
}

/// Produces the pixels described by `request`.
///
/// # Errors
/// [`RegistrationError::Decode`] for unreadable, corrupt or unsupported input,
/// a missing TIFF page, or a pre-decoded buffer whose length does not match
/// its dimensions.
pub fn decode(request: LoadRequest) -> Result<DecodedPhoto> {
    let LoadRequest {
        source,
        filename,
        mime_type,
        page,
    } = request;
    let decode_error = |reason: String| RegistrationError::Decode {
        filename: filename.clone(),
        reason,
    };

    let (photo, page_count, page) = match source {
        LoadSource::Pixels(photo) => {
            if photo.img_data.len() != photo.width * photo.height * 4 {
                return Err(decode_error(format!(
                    "pixel buffer holds {} bytes, expected {} for {}x{}",
                    photo.img_data.len(),
                    photo.width * photo.height * 4,
                    photo.width,
                    photo.height
                )));
            }
            (photo, 1, 0)
        }
        LoadSource::Bytes(bytes) => {
            if bytes.is_empty() {
                return Err(decode_error("input is empty".to_string()));
            }
            if is_tiff(&bytes, &filename, mime_type.as_deref()) {
                let (photo, page_count) = decode_tiff_page(&bytes, page).map_err(decode_error)?;
                (photo, page_count, page)
            } else {
                (decode_compressed(&bytes).map_err(decode_error)?, 1, 0)
            }
        }
    };

    if photo.is_empty() {
        return Err(decode_error("image has no pixels".to_string()));
    }

    tracing::debug!("decoded {filename}: {}x{} (page {page} of {page_count})", photo.width, photo.height);

    Ok(DecodedPhoto {
        photo,
        metadata: ImageMetadata {
            filename,
            mime_type,
            page_count,
            page,
        },
    })
}

fn is_tiff(bytes: &[u8], filename: &str, mime_type: Option<&str>) -> bool {
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return true;
    }
    let by_mime = mime_type.map_or(false, |m| m.eq_ignore_ascii_case("image/tiff"));
    let lower = filename.to_ascii_lowercase();
    by_mime || lower.ends_with(".tif") || lower.ends_with(".tiff")
}

fn decode_compressed(bytes: &[u8]) -> std::result::Result<Photo, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Photo::from_rgba(width as usize, height as usize, rgba.into_raw())
        .ok_or_else(|| "decoder returned a short buffer".to_string())
}

/// Decodes page `page` of a TIFF file to RGBA8 and counts its pages.
fn decode_tiff_page(bytes: &[u8], page: usize) -> std::result::Result<(Photo, usize), String> {
    let mut decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;

    let mut current = 0;
    while current < page {
        if !decoder.more_images() {
            return Err(format!("page {page} requested but the file has {} page(s)", current + 1));
        }
        decoder.next_image().map_err(|e| e.to_string())?;
        current += 1;
    }

    let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;
    let channels = match decoder.colortype().map_err(|e| e.to_string())? {
        tiff::ColorType::Gray(_) => Channels::Gray,
        tiff::ColorType::GrayA(_) => Channels::GrayAlpha,
        tiff::ColorType::RGB(_) => Channels::Rgb,
        tiff::ColorType::RGBA(_) => Channels::Rgba,
        other => return Err(format!("unsupported TIFF color type {other:?}")),
    };
    let samples = normalize_samples(decoder.read_image().map_err(|e| e.to_string())?);

    let mut page_count = page + 1;
    while decoder.more_images() {
        decoder.next_image().map_err(|e| e.to_string())?;
        page_count += 1;
    }

    let pixel_count = width as usize * height as usize;
    let channel_count = channels.count();
    if samples.len() < pixel_count * channel_count {
        return Err(format!(
            "TIFF page holds {} samples, expected {}",
            samples.len(),
            pixel_count * channel_count
        ));
    }

    let mut img_data = Vec::with_capacity(pixel_count * 4);
    for px in samples.chunks_exact(channel_count).take(pixel_count) {
        let rgba = match channels {
            Channels::Gray => [px[0], px[0], px[0], 255],
            Channels::GrayAlpha => [px[0], px[0], px[0], px[1]],
            Channels::Rgb => [px[0], px[1], px[2], 255],
            Channels::Rgba => [px[0], px[1], px[2], px[3]],
        };
        img_data.extend_from_slice(&rgba);
    }

    let photo = Photo::from_rgba(width as usize, height as usize, img_data)
        .ok_or_else(|| "converted buffer has the wrong size".to_string())?;
    Ok((photo, page_count))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Channels {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl Channels {
    fn count(&self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::GrayAlpha => 2,
            Channels::Rgb => 3,
            Channels::Rgba => 4,
        }
    }
}

/// Maps every sample to 8 bits: integers keep their most significant byte
/// (signed ones are offset to unsigned first), floats are read as `0.0..=1.0`.
fn normalize_samples(result: DecodingResult) -> Vec<u8> {
    match result {
        DecodingResult::U8(buf) => buf,
        DecodingResult::U16(buf) => buf.into_iter().map(|s| (s >> 8) as u8).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|s| (s >> 24) as u8).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|s| (s >> 56) as u8).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(|s| (s as i16 + 128) as u8).collect(),
        DecodingResult::I16(buf) => buf
            .into_iter()
            .map(|s| ((s as i32 + 32768) >> 8) as u8)
            .collect(),
        DecodingResult::I32(buf) => buf
            .into_iter()
            .map(|s| ((s as i64 + 2147483648) >> 24) as u8)
            .collect(),
        DecodingResult::I64(buf) => buf
            .into_iter()
            .map(|s| ((s as i128 + (1i128 << 63)) >> 56) as u8)
            .collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(|s| unit_to_u8(s as f64)).collect(),
        DecodingResult::F64(buf) => buf.into_iter().map(unit_to_u8).collect(),
    }
}

fn unit_to_u8(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Encodes `photo` as described by `request`.
///
/// JPEG has no alpha channel, so it is dropped before encoding.
///
/// # Examples
/// ```
/// # use rephoto::photo::Photo;
/// # use rephoto::photo_codec::{decode, encode, LoadRequest, SaveFormat, SaveRequest};
/// let photo = Photo::filled(4, 3, [10, 20, 30, 255]);
/// let png = encode(&photo, &SaveRequest::new(SaveFormat::Png)).unwrap();
/// let back = decode(LoadRequest::from_bytes(png, "roundtrip.png")).unwrap();
/// assert_eq!(back.photo, photo);
/// ```
pub fn encode(photo: &Photo, request: &SaveRequest) -> Result<Vec<u8>> {
    let encode_error = |reason: String| RegistrationError::Encode {
        format: format!("{:?}", request.format),
        reason,
    };
    if photo.is_empty() {
        return Err(encode_error("image has no pixels".to_string()));
    }
    let (width, height) = (photo.width as u32, photo.height as u32);
    let mut out = Vec::new();

    match request.format {
        SaveFormat::Png => PngEncoder::new(&mut out)
            .write_image(&photo.img_data, width, height, ColorType::Rgba8)
            .map_err(|e| encode_error(e.to_string()))?,
        SaveFormat::Tiff => TiffEncoder::new(Cursor::new(&mut out))
            .write_image(&photo.img_data, width, height, ColorType::Rgba8)
            .map_err(|e| encode_error(e.to_string()))?,
        SaveFormat::Jpeg => {
            let rgb: Vec<u8> = photo
                .img_data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let quality = request.quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut out, quality)
                .encode(&rgb, width, height, ColorType::Rgb8)
                .map_err(|e| encode_error(e.to_string()))?
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder as RawTiffEncoder};

    fn sample_photo() -> Photo {
        let mut photo = Photo::new(8, 6);
        for y in 0..6 {
            for x in 0..8 {
                photo.set_rgba(x, y, [(x * 30) as u8, (y * 40) as u8, 90, 255]);
            }
        }
        photo
    }

    fn two_page_gray16_tiff() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = RawTiffEncoder::new(Cursor::new(&mut out)).unwrap();
            encoder
                .write_image::<colortype::Gray16>(2, 1, &[0x1200, 0xff00])
                .unwrap();
            encoder
                .write_image::<colortype::Gray16>(3, 1, &[0x0100, 0x8000, 0xffff])
                .unwrap();
        }
        out
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let photo = sample_photo();
        let bytes = encode(&photo, &SaveRequest::new(SaveFormat::Png)).unwrap();
        let decoded = decode(LoadRequest::from_bytes(bytes, "a.png")).unwrap();
        assert_eq!(decoded.photo, photo);
        assert_eq!(decoded.metadata.page_count, 1);
    }

    #[test]
    fn tiff_round_trip_is_lossless() {
        let photo = sample_photo();
        let bytes = encode(&photo, &SaveRequest::new(SaveFormat::Tiff)).unwrap();
        let decoded = decode(LoadRequest::from_bytes(bytes, "a.tif")).unwrap();
        assert_eq!(decoded.photo, photo);
    }

    #[test]
    fn jpeg_decodes_to_same_size() {
        let photo = sample_photo();
        let request = SaveRequest {
            format: SaveFormat::Jpeg,
            quality: 95,
        };
        let bytes = encode(&photo, &request).unwrap();
        let decoded = decode(LoadRequest::from_bytes(bytes, "a.jpg")).unwrap();
        assert_eq!((decoded.photo.width, decoded.photo.height), (8, 6));
        assert_eq!(decoded.photo.get_rgba(0, 0).map(|p| p[3]), Some(255));
    }

    #[test]
    fn multi_page_tiff_selects_page_and_converts_to_rgba8() {
        let bytes = two_page_gray16_tiff();
        let first = decode(LoadRequest::from_bytes(bytes.clone(), "scan.tiff")).unwrap();
        assert_eq!((first.photo.width, first.photo.height), (2, 1));
        assert_eq!(first.photo.get_rgba(0, 0), Some([0x12, 0x12, 0x12, 255]));
        assert_eq!(first.metadata.page_count, 2);

        let second = decode(LoadRequest::from_bytes(bytes, "scan.tiff").with_page(1)).unwrap();
        assert_eq!((second.photo.width, second.photo.height), (3, 1));
        assert_eq!(second.photo.get_rgba(1, 0), Some([0x80, 0x80, 0x80, 255]));
        assert_eq!(second.metadata.page, 1);
    }

    #[test]
    fn missing_tiff_page_is_a_decode_error() {
        let err = decode(LoadRequest::from_bytes(two_page_gray16_tiff(), "scan.tiff").with_page(5))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Decode { .. }));
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let err = decode(LoadRequest::from_bytes(vec![1, 2, 3, 4, 5], "broken.jpg")).unwrap_err();
        assert!(matches!(err, RegistrationError::Decode { filename, .. } if filename == "broken.jpg"));
        let err = decode(
            LoadRequest::from_bytes(vec![0x49, 0x49, 0x2a, 0x00, 0xff], "broken").with_mime_type("image/tiff"),
        )
        .unwrap_err();
        assert!(matches!(err, RegistrationError::Decode { .. }));
    }

    #[test]
    fn mismatched_pixel_buffer_is_rejected() {
        let photo = Photo {
            img_data: vec![0; 10],
            width: 2,
            height: 2,
        };
        assert!(decode(LoadRequest::from_photo(photo, "raw")).is_err());
    }

    #[test]
    fn float_samples_are_clamped() {
        let out = normalize_samples(DecodingResult::F32(vec![-1.0, 0.5, 2.0]));
        assert_eq!(out, vec![0, 128, 255]);
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(SaveFormat::from_extension("JPG"), Some(SaveFormat::Jpeg));
        assert_eq!(SaveFormat::from_extension("tif"), Some(SaveFormat::Tiff));
        assert_eq!(SaveFormat::from_extension("gif"), None);
        assert!(!SaveFormat::Jpeg.is_lossless());
    }
}
