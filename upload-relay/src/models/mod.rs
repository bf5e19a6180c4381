pub mod upload;

pub use upload::{jpeg_filename, AllowedMimeType, FileContent, UploadedFile};
