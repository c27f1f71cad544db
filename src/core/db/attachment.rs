use std::path::PathBuf;

use time::OffsetDateTime;

use crate::core::db::model::ContentKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub id: String,
    /// Name of the stored file inside the workspace image directory.
    pub file_name: String,
    /// MIME type sniffed from the image bytes.
    pub content_type: String,
    pub content_id: String,
    pub content_kind: ContentKind,
    pub created_at: OffsetDateTime,
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub data: Vec<u8>,
    pub original_name: String,
    pub content_id: String,
    pub content_kind: ContentKind,
}

pub trait AttachmentRepository {
    fn store_image(&self, image: NewImage) -> impl Future<Output = anyhow::Result<ImageAttachment>>;
    fn load_attachments(
        &self,
        content_id: &str,
        kind: ContentKind,
    ) -> impl Future<Output = anyhow::Result<Vec<ImageAttachment>>>;
    fn load_image_data(&self, attachment: &ImageAttachment) -> impl Future<Output = anyhow::Result<Vec<u8>>>;
    fn image_path(&self, attachment: &ImageAttachment) -> PathBuf;
    fn delete_attachment(&self, attachment: ImageAttachment) -> impl Future<Output = anyhow::Result<()>>;
    /// Drops every attachment of a piece of content, files included.
    fn delete_attachments_for(
        &self,
        content_id: &str,
        kind: ContentKind,
    ) -> impl Future<Output = anyhow::Result<()>>;
}
