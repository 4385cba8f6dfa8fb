//! Single-shot image generation

use base64::{engine::general_purpose, Engine as _};
use std::io::Cursor;
use std::sync::Arc;

use crate::error::{Result, StudymateError};
use crate::providers::{AspectRatio, ImageConfig, ImageModel};

/// Output format requested from the image model
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// A decoded generated image
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    /// MIME type reported by the service
    pub mime_type: String,
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// `data:` URL for inline display
    pub data_url: String,
    /// Pixel dimensions when the bytes could be decoded
    pub dimensions: Option<(u32, u32)>,
}

/// Sends one prompt to the image model and decodes the first result
pub struct ImageGenerator {
    model: Arc<dyn ImageModel>,
    model_name: String,
}

impl ImageGenerator {
    /// Generator for `model_name`
    pub fn new(model: Arc<dyn ImageModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    /// Generate one image for `prompt`
    ///
    /// # Errors
    ///
    /// Returns [`StudymateError::Validation`] for a blank prompt before any
    /// call is made, the provider error, or [`StudymateError::Provider`]
    /// when the service returns no usable image.
    pub async fn generate(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<GeneratedImage> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StudymateError::Validation("image prompt is empty".to_string()).into());
        }

        let config = ImageConfig {
            number_of_images: 1,
            output_mime_type: OUTPUT_MIME_TYPE.to_string(),
            aspect_ratio,
        };
        tracing::info!(model = %self.model_name, aspect_ratio = %aspect_ratio, "Generating image");

        let images = self
            .model
            .generate_images(&self.model_name, prompt, &config)
            .await?;
        let payload = images.into_iter().next().ok_or_else(|| {
            StudymateError::Provider("the image model returned no images".to_string())
        })?;

        let bytes = general_purpose::STANDARD
            .decode(payload.data.as_bytes())
            .map_err(|e| StudymateError::Provider(format!("invalid image payload: {}", e)))?;

        let dimensions = match ::image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())
            .and_then(|reader| reader.into_dimensions().map_err(|e| e.to_string()))
        {
            Ok(dimensions) => Some(dimensions),
            Err(e) => {
                tracing::debug!("Could not read image dimensions: {}", e);
                None
            }
        };

        let mime_type = if payload.mime_type.is_empty() {
            OUTPUT_MIME_TYPE.to_string()
        } else {
            payload.mime_type
        };
        Ok(GeneratedImage {
            data_url: format!("data:{};base64,{}", mime_type, payload.data),
            mime_type,
            bytes,
            dimensions,
        })
    }
}

impl std::fmt::Debug for ImageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerator")
            .field("model", &self.model_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ImagePayload, MockImageModel};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = ::image::RgbImage::from_pixel(width, height, ::image::Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ::image::ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_blank_prompt_makes_no_call() {
        let mut mock = MockImageModel::new();
        mock.expect_generate_images().never();

        let generator = ImageGenerator::new(Arc::new(mock), "imagen");
        let err = generator.generate("  ", AspectRatio::Square).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StudymateError>(),
            Some(StudymateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_decodes_first_image() {
        let encoded = general_purpose::STANDARD.encode(jpeg(8, 4));
        let returned = encoded.clone();

        let mut mock = MockImageModel::new();
        mock.expect_generate_images()
            .withf(|model, prompt, config| {
                model == "imagen"
                    && prompt == "a cell diagram"
                    && config.number_of_images == 1
                    && config.output_mime_type == "image/jpeg"
                    && config.aspect_ratio == AspectRatio::Wide
            })
            .times(1)
            .returning(move |_, _, _| {
                Ok(vec![ImagePayload {
                    mime_type: "image/jpeg".to_string(),
                    data: returned.clone(),
                }])
            });

        let generator = ImageGenerator::new(Arc::new(mock), "imagen");
        let image = generator
            .generate(" a cell diagram ", AspectRatio::Wide)
            .await
            .unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.dimensions, Some((8, 4)));
        assert_eq!(image.data_url, format!("data:image/jpeg;base64,{}", encoded));
    }

    #[tokio::test]
    async fn test_empty_result_is_provider_error() {
        let mut mock = MockImageModel::new();
        mock.expect_generate_images().returning(|_, _, _| Ok(Vec::new()));

        let generator = ImageGenerator::new(Arc::new(mock), "imagen");
        let err = generator.generate("x", AspectRatio::Square).await.unwrap_err();
        assert!(err.to_string().contains("no images"));
    }

    #[tokio::test]
    async fn test_undecodable_bytes_have_no_dimensions() {
        let mut mock = MockImageModel::new();
        mock.expect_generate_images().returning(|_, _, _| {
            Ok(vec![ImagePayload {
                mime_type: String::new(),
                data: general_purpose::STANDARD.encode(b"not an image"),
            }])
        });

        let generator = ImageGenerator::new(Arc::new(mock), "imagen");
        let image = generator.generate("x", AspectRatio::Square).await.unwrap();
        assert_eq!(image.dimensions, None);
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, b"not an image");
    }
}
