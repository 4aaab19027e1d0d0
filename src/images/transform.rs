// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Image transform engine.
//!
//! Decodes an upload, runs it through a fixed chain of filters (resize to width
//! 1024 keeping the aspect ratio, contrast +20, brightness +7, gamma 0.5) and
//! re-encodes it in the source format. Consecutive color filters are folded
//! into one lookup table when a pipeline is built.
//!
//! CPU-bound: async callers go through `process_async`, which runs on the
//! blocking pool.

use crate::images::{
    models::ImageFormatTag,
    pool::{PipelinePool, PooledPipeline, DEFAULT_MAX_IDLE},
};
use bytes::Bytes;
use image::{
    buffer::ConvertBuffer,
    codecs::{gif::GifEncoder, jpeg::JpegEncoder, png::PngEncoder},
    imageops::{self, FilterType},
    ColorType, DynamicImage, Frame, ImageEncoder, RgbImage, RgbaImage,
};
use std::{io::Cursor, sync::Arc};
use thiserror::Error;
use tracing::debug;

pub const RESIZE_WIDTH: u32 = 1024;
pub const CONTRAST: f32 = 20.0;
pub const BRIGHTNESS: f32 = 7.0;
pub const GAMMA: f32 = 0.5;

/// Largest side of a transformed image.
pub const MAX_OUTPUT_SIDE: u32 = 16_384;
/// Largest pixel count of a transformed image.
pub const MAX_OUTPUT_PIXELS: u64 = RESIZE_WIDTH as u64 * MAX_OUTPUT_SIDE as u64;

const JPEG_QUALITY: u8 = 75;
const GIF_SPEED: i32 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("failure to decode image: {0}")]
    Decode(String),

    #[error("unsupported image format `{0}`")]
    UnsupportedFormat(String),

    #[error("failure to encode image: {0}")]
    Encode(String),

    #[error("transformed image of {width}x{height} exceeds the output limit")]
    TooLarge { width: u32, height: u32 },

    #[error("transform task failed: {0}")]
    Task(String),
}

/// Resampling kernel used by a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Linear,
    Cubic,
    Lanczos,
}

impl From<Resampling> for FilterType {
    fn from(r: Resampling) -> FilterType {
        match r {
            Resampling::Nearest => FilterType::Nearest,
            Resampling::Linear => FilterType::Triangle,
            Resampling::Cubic => FilterType::CatmullRom,
            Resampling::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// A single pixel transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// A zero dimension is derived from the other one, keeping the aspect ratio.
    Resize {
        width: u32,
        height: u32,
        resampling: Resampling,
    },
    /// Percentage in [-100, 100].
    Contrast(f32),
    /// Percentage in [-100, 100].
    Brightness(f32),
    Gamma(f32),
}

impl Filter {
    /// Destination bounds for a source of `width` x `height`.
    fn bounds(&self, width: u32, height: u32) -> (u32, u32) {
        let Filter::Resize {
            width: dst_w,
            height: dst_h,
            ..
        } = *self
        else {
            return (width, height);
        };

        if width == 0 || height == 0 {
            return (0, 0);
        }

        match (dst_w, dst_h) {
            (0, 0) => (width, height),
            (w, 0) => (w, scale(height, w, width)),
            (0, h) => (scale(width, h, height), h),
            (w, h) => (w, h),
        }
    }

    /// Maps a normalized channel value; `None` for geometric filters.
    fn adjust(&self, c: f32) -> Option<f32> {
        let v = match *self {
            Filter::Resize { .. } => return None,
            Filter::Contrast(percentage) => {
                let p = 1.0 + percentage.clamp(-100.0, 100.0) / 100.0;
                if (0.0..=1.0).contains(&p) {
                    0.5 + (c - 0.5) * p
                } else if p > 1.0 && p < 2.0 {
                    0.5 + (c - 0.5) * (1.0 / (2.0 - p))
                } else if c < 0.5 {
                    0.0
                } else {
                    1.0
                }
            }
            Filter::Brightness(percentage) => c + percentage.clamp(-100.0, 100.0) / 100.0,
            Filter::Gamma(gamma) => c.powf(1.0 / gamma.max(1.0e-5)),
        };

        Some(v.clamp(0.0, 1.0))
    }
}

fn scale(side: u32, target: u32, reference: u32) -> u32 {
    let scaled = (side as f64 * target as f64 / reference as f64).round() as u32;
    scaled.max(1)
}

/// The filter chain applied to every upload.
pub fn standard_filters() -> Vec<Filter> {
    vec![
        Filter::Resize {
            width: RESIZE_WIDTH,
            height: 0,
            resampling: Resampling::Lanczos,
        },
        Filter::Contrast(CONTRAST),
        Filter::Brightness(BRIGHTNESS),
        Filter::Gamma(GAMMA),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    Resize(Filter),
    Lut(Box<[u8; 256]>),
}

fn compile(filters: &[Filter]) -> Vec<Step> {
    let mut steps = vec![];
    let mut colors: Vec<Filter> = vec![];

    for filter in filters {
        if let Filter::Resize { .. } = filter {
            if !colors.is_empty() {
                steps.push(Step::Lut(lookup_table(&colors)));
                colors.clear();
            }
            steps.push(Step::Resize(*filter));
        } else {
            colors.push(*filter);
        }
    }

    if !colors.is_empty() {
        steps.push(Step::Lut(lookup_table(&colors)));
    }

    steps
}

fn lookup_table(filters: &[Filter]) -> Box<[u8; 256]> {
    let mut lut = Box::new([0u8; 256]);
    for (i, slot) in lut.iter_mut().enumerate() {
        let c = filters
            .iter()
            .fold(i as f32 / 255.0, |c, f| f.adjust(c).unwrap_or(c));
        *slot = (c * 255.0).round() as u8;
    }
    lut
}

/// An ordered filter chain plus the scratch buffer outputs are encoded into.
///
/// Not shareable: concurrent callers take distinct pipelines from the pool.
#[derive(Debug)]
pub struct TransformPipeline {
    filters: Vec<Filter>,
    steps: Vec<Step>,
    buffer: Vec<u8>,
}

impl TransformPipeline {
    pub fn new(filters: Vec<Filter>) -> TransformPipeline {
        let steps = compile(&filters);
        TransformPipeline {
            filters,
            steps,
            buffer: vec![],
        }
    }

    /// Destination canvas size for a source of the given size.
    pub fn bounds(&self, width: u32, height: u32) -> (u32, u32) {
        self.filters
            .iter()
            .fold((width, height), |(w, h), f| f.bounds(w, h))
    }

    /// Draws the filtered source onto a new RGBA canvas.
    pub fn draw(&self, src: &DynamicImage) -> RgbaImage {
        let mut canvas = src.to_rgba8();

        for step in &self.steps {
            match step {
                Step::Resize(filter) => {
                    let (w, h) = filter.bounds(canvas.width(), canvas.height());
                    if (w, h) != canvas.dimensions() && w > 0 && h > 0 {
                        let resampling = match filter {
                            Filter::Resize { resampling, .. } => *resampling,
                            _ => Resampling::Lanczos,
                        };
                        canvas = imageops::resize(&canvas, w, h, resampling.into());
                    }
                }
                Step::Lut(lut) => {
                    for pixel in canvas.pixels_mut() {
                        pixel[0] = lut[pixel[0] as usize];
                        pixel[1] = lut[pixel[1] as usize];
                        pixel[2] = lut[pixel[2] as usize];
                    }
                }
            }
        }

        canvas
    }

    /// Encodes `canvas` in `format` into the scratch buffer.
    pub fn encode(
        &mut self,
        canvas: RgbaImage,
        format: ImageFormatTag,
    ) -> Result<(), TransformError> {
        let (w, h) = canvas.dimensions();
        let buffer = &mut self.buffer;

        let result = match format {
            ImageFormatTag::Png => {
                PngEncoder::new(&mut *buffer).write_image(canvas.as_raw(), w, h, ColorType::Rgba8)
            }
            ImageFormatTag::Jpeg => {
                let rgb: RgbImage = canvas.convert();
                JpegEncoder::new_with_quality(&mut *buffer, JPEG_QUALITY).write_image(
                    rgb.as_raw(),
                    w,
                    h,
                    ColorType::Rgb8,
                )
            }
            ImageFormatTag::Gif => {
                let mut encoder = GifEncoder::new_with_speed(&mut *buffer, GIF_SPEED);
                encoder.encode_frame(Frame::new(canvas))
            }
        };

        result.map_err(|err| TransformError::Encode(err.to_string()))
    }

    /// Bytes of the last encode.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    #[cfg(test)]
    pub(crate) fn scratch(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    /// Empties the scratch buffer, keeping its allocation.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// A transformed image.
///
/// The bytes live in the pipeline's scratch buffer and are released with it.
pub struct ProcessedImage {
    pipeline: PooledPipeline,
    format: ImageFormatTag,
}

impl ProcessedImage {
    pub fn bytes(&self) -> &[u8] {
        self.pipeline.buffer()
    }

    pub fn format(&self) -> ImageFormatTag {
        self.format
    }
}

pub struct TransformEngine {
    pool: Arc<PipelinePool>,
}

impl Default for TransformEngine {
    fn default() -> Self {
        TransformEngine::new(PipelinePool::new(standard_filters(), DEFAULT_MAX_IDLE))
    }
}

impl TransformEngine {
    pub fn new(pool: Arc<PipelinePool>) -> TransformEngine {
        TransformEngine { pool }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Arc<PipelinePool> {
        &self.pool
    }

    /// Decodes, filters and re-encodes `data` in its source format.
    ///
    /// The pipeline goes back to the pool when the result (or the error) drops.
    pub fn process(&self, data: &[u8]) -> Result<ProcessedImage, TransformError> {
        let format =
            image::guess_format(data).map_err(|err| TransformError::Decode(err.to_string()))?;
        let tag = ImageFormatTag::from_image_format(format).ok_or_else(|| {
            TransformError::UnsupportedFormat(format!("{format:?}").to_lowercase())
        })?;

        // header-only read, the canvas is checked before anything is decoded
        let (width, height) = image::io::Reader::with_format(Cursor::new(data), format)
            .into_dimensions()
            .map_err(|err| TransformError::Decode(err.to_string()))?;

        let mut pipeline = self.pool.acquire();
        let (dst_w, dst_h) = pipeline.bounds(width, height);
        if dst_w > MAX_OUTPUT_SIDE
            || dst_h > MAX_OUTPUT_SIDE
            || dst_w as u64 * dst_h as u64 > MAX_OUTPUT_PIXELS
        {
            return Err(TransformError::TooLarge {
                width: dst_w,
                height: dst_h,
            });
        }

        let src = image::load_from_memory_with_format(data, format)
            .map_err(|err| TransformError::Decode(err.to_string()))?;

        pipeline.reset();

        let canvas = pipeline.draw(&src);
        debug!(
            src_width = src.width(),
            src_height = src.height(),
            dst_width = canvas.width(),
            dst_height = canvas.height(),
            format = tag.as_str(),
            "image transformed"
        );

        pipeline.encode(canvas, tag)?;

        Ok(ProcessedImage {
            pipeline,
            format: tag,
        })
    }

    /// Runs `process` on the blocking pool.
    pub async fn process_async(
        self: &Arc<Self>,
        data: Bytes,
    ) -> Result<ProcessedImage, TransformError> {
        let engine = self.clone();

        tokio::task::spawn_blocking(move || engine.process(&data))
            .await
            .map_err(|err| TransformError::Task(err.to_string()))?
    }
}
