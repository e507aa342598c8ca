use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{
    errors::{Result, StoryError},
    models::ImageAsset,
};

/// Text-safe form of an image: its MIME type plus a base64 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    payload: String,
}

impl EncodedImage {
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// `data:<mime>;base64,<payload>`, the form vision endpoints accept inline.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.payload)
    }
}

/// Pure and deterministic; only empty input is refused.
pub fn encode(asset: &ImageAsset) -> Result<EncodedImage> {
    if asset.is_empty() {
        return Err(StoryError::encoding(format!(
            "`{}` contains no image data",
            asset.name()
        )));
    }

    let mime_type = asset.mime_type().trim();
    if mime_type.is_empty() {
        return Err(StoryError::encoding(format!(
            "`{}` has no MIME type",
            asset.name()
        )));
    }

    Ok(EncodedImage {
        mime_type: mime_type.to_string(),
        payload: STANDARD.encode(asset.data()),
    })
}
