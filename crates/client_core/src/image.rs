//! Image payloads chosen by the user for identification.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

/// Upload ceiling enforced by the prediction service.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// How the image reached the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Explicit pick from a file browser or path argument.
    Picker,
    /// Drag-and-drop onto the upload area.
    Drop,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("File must be an image (got {content_type})")]
    NotAnImage { content_type: String },
    #[error("Image file is empty")]
    Empty,
    #[error("File size {size} bytes exceeds maximum of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("failed to read image {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// The user's current image. Cloning shares the payload.
#[derive(Clone)]
pub struct SelectedImage {
    file_name: String,
    content_type: String,
    preview: String,
    source: ImageSource,
    bytes: Arc<[u8]>,
}

impl SelectedImage {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        source: ImageSource,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            preview: file_name.clone(),
            file_name,
            content_type: content_type.into(),
            source,
            bytes: bytes.into(),
        }
    }

    /// Reads `path` and guesses its content type from the extension.
    pub fn from_path(path: &Path, source: ImageSource) -> Result<Self, ImageError> {
        let bytes = fs::read(path).map_err(|source| ImageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut image = Self::new(file_name, content_type, bytes, source);
        image.preview = path.display().to_string();
        Ok(image)
    }

    pub fn validate(&self, max_bytes: usize) -> Result<(), ImageError> {
        if !is_image_content_type(&self.content_type) {
            return Err(ImageError::NotAnImage {
                content_type: self.content_type.clone(),
            });
        }
        if self.bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if self.bytes.len() > max_bytes {
            return Err(ImageError::TooLarge {
                size: self.bytes.len(),
                limit: max_bytes,
            });
        }
        Ok(())
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Locally displayable reference (path or name) for the preview pane.
    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn source(&self) -> ImageSource {
        self.source
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when both handles point at the same selection.
    #[cfg(test)]
    pub(crate) fn same_selection(&self, other: &SelectedImage) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for SelectedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedImage")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("source", &self.source)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}
