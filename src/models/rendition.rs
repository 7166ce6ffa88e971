use serde::{Deserialize, Serialize};

use crate::entities::file::FileType;

/// A named URL projection of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Rendition {
    ImageConfig,
    ImageRatio,
    ImageSquare,
    ImageBig,
    Video,
    VideoPoster,
    Audio,
    DocumentPreview,
    Original,
}

const IMAGE: &[Rendition] = &[
    Rendition::ImageConfig,
    Rendition::ImageRatio,
    Rendition::ImageSquare,
    Rendition::ImageBig,
];
const VIDEO: &[Rendition] = &[Rendition::Video, Rendition::VideoPoster];
const AUDIO: &[Rendition] = &[Rendition::Audio];
const DOCUMENT: &[Rendition] = &[Rendition::DocumentPreview];

impl Rendition {
    pub const ALL: [Rendition; 9] = [
        Rendition::ImageConfig,
        Rendition::ImageRatio,
        Rendition::ImageSquare,
        Rendition::ImageBig,
        Rendition::Video,
        Rendition::VideoPoster,
        Rendition::Audio,
        Rendition::DocumentPreview,
        Rendition::Original,
    ];

    /// Key used in the file-info projection.
    pub fn key(&self) -> &'static str {
        match self {
            Rendition::ImageConfig => "imageConfigUrl",
            Rendition::ImageRatio => "imageRatioUrl",
            Rendition::ImageSquare => "imageSquareUrl",
            Rendition::ImageBig => "imageBigUrl",
            Rendition::Video => "videoUrl",
            Rendition::VideoPoster => "videoPosterUrl",
            Rendition::Audio => "audioUrl",
            Rendition::DocumentPreview => "documentPreviewUrl",
            Rendition::Original => "originalUrl",
        }
    }

    /// Short code carried by local anti-link URLs (`type=`).
    pub fn code(&self) -> &'static str {
        match self {
            Rendition::ImageConfig => "config",
            Rendition::ImageRatio => "ratio",
            Rendition::ImageSquare => "square",
            Rendition::ImageBig => "big",
            Rendition::Video => "video",
            Rendition::VideoPoster => "poster",
            Rendition::Audio => "audio",
            Rendition::DocumentPreview => "preview",
            Rendition::Original => "original",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    /// Renditions listed in the file-info projection for a type.
    /// The original rendition is served separately.
    pub fn projected_for(file_type: FileType) -> &'static [Rendition] {
        match file_type {
            FileType::Image => IMAGE,
            FileType::Video => VIDEO,
            FileType::Audio => AUDIO,
            FileType::Document => DOCUMENT,
        }
    }

    pub fn applies_to(&self, file_type: FileType) -> bool {
        *self == Rendition::Original || Self::projected_for(file_type).contains(self)
    }
}
