//! Vision model abstraction.

use async_trait::async_trait;

use super::OcrError;

/// An image-plus-prompt text generation service.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Send one image and prompt. `Ok(None)` means the service answered but
    /// produced no candidate text.
    async fn generate(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<Option<String>, OcrError>;
}
