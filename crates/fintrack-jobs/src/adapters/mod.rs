//! Text extractors selected from job fields.

pub mod image_ocr;
pub mod remote_ocr;

pub use image_ocr::ImageOcrExtractor;
pub use remote_ocr::RemoteOcrExtractor;
