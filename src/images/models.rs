// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// A persisted image record.
///
/// Once `is_uploaded` is true the URL resolves to a readable object and the
/// record only changes its `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub image_id: Uuid,
    pub image_url: String,
    pub is_uploaded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied on insert; id and timestamps are allocated by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub image_url: String,
    pub is_uploaded: bool,
}

/// Image formats the transform engine decodes and re-encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormatTag {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormatTag::Png => "png",
            ImageFormatTag::Jpeg => "jpeg",
            ImageFormatTag::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormatTag::Png => "image/png",
            ImageFormatTag::Jpeg => "image/jpeg",
            ImageFormatTag::Gif => "image/gif",
        }
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<ImageFormatTag> {
        match format {
            image::ImageFormat::Png => Some(ImageFormatTag::Png),
            image::ImageFormat::Jpeg => Some(ImageFormatTag::Jpeg),
            image::ImageFormat::Gif => Some(ImageFormatTag::Gif),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a format tag is not one the pipeline handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl FromStr for ImageFormatTag {
    type Err = UnknownFormat;

    /// `jpg` is an alias of `jpeg`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormatTag::Png),
            "jpeg" | "jpg" => Ok(ImageFormatTag::Jpeg),
            "gif" => Ok(ImageFormatTag::Gif),
            other => Err(UnknownFormat(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpg_is_encoded_as_jpeg() {
        assert_eq!("jpg".parse::<ImageFormatTag>(), Ok(ImageFormatTag::Jpeg));
        assert_eq!("JPEG".parse::<ImageFormatTag>(), Ok(ImageFormatTag::Jpeg));
        assert_eq!(ImageFormatTag::Jpeg.as_str(), "jpeg");
    }

    #[test]
    fn tiff_is_unknown() {
        assert_eq!(
            "tiff".parse::<ImageFormatTag>(),
            Err(UnknownFormat("tiff".to_owned()))
        );
        assert_eq!(ImageFormatTag::from_image_format(image::ImageFormat::Tiff), None);
    }

    #[test]
    fn content_types() {
        assert_eq!(ImageFormatTag::Png.content_type(), "image/png");
        assert_eq!(ImageFormatTag::Gif.to_string(), "gif");
    }
}
