//! Selection of the text extraction strategy for a job.

use std::fmt;

use async_trait::async_trait;

use fintrack_core::{Error, OcrJob, Result, TextExtractor};

/// Where a job's text comes from, resolved once per attempt.
///
/// Priority: a supplied extractor, then `n8n_url`, then `image_url`.
pub enum ExtractionSource<'a> {
    /// Caller-provided extractor.
    Supplied(&'a dyn TextExtractor),
    /// Forward the job to a remote OCR webhook and read back `text`.
    Remote { url: &'a str },
    /// Fetch the image and OCR it locally.
    LocalImage { url: &'a str },
}

impl<'a> ExtractionSource<'a> {
    pub fn resolve(job: &'a OcrJob, supplied: Option<&'a dyn TextExtractor>) -> Result<Self> {
        if let Some(extractor) = supplied {
            return Ok(ExtractionSource::Supplied(extractor));
        }
        if let Some(url) = job.n8n_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(ExtractionSource::Remote { url });
        }
        if let Some(url) = job.image_url.as_deref().filter(|u| !u.is_empty()) {
            return Ok(ExtractionSource::LocalImage { url });
        }
        Err(Error::InvalidInput(
            "Job has no extraction source (n8n_url or image_url)".to_string(),
        ))
    }

    /// Short label for logs.
    pub fn name(&self) -> &str {
        match self {
            ExtractionSource::Supplied(extractor) => extractor.name(),
            ExtractionSource::Remote { .. } => "remote_ocr",
            ExtractionSource::LocalImage { .. } => "image_ocr",
        }
    }
}

impl fmt::Debug for ExtractionSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionSource::Supplied(extractor) => {
                f.debug_tuple("Supplied").field(&extractor.name()).finish()
            }
            ExtractionSource::Remote { url } => f.debug_struct("Remote").field("url", url).finish(),
            ExtractionSource::LocalImage { url } => {
                f.debug_struct("LocalImage").field("url", url).finish()
            }
        }
    }
}

/// Adapts a synchronous closure into a [`TextExtractor`].
///
/// ```
/// use fintrack_core::TextExtractor;
/// use fintrack_jobs::FnExtractor;
///
/// let extractor = FnExtractor::new("fixed", |_job| Ok("TOTAL 9.99".to_string()));
/// assert_eq!(extractor.name(), "fixed");
/// ```
pub struct FnExtractor<F> {
    name: String,
    func: F,
}

impl<F> FnExtractor<F>
where
    F: Fn(&OcrJob) -> Result<String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> TextExtractor for FnExtractor<F>
where
    F: Fn(&OcrJob) -> Result<String> + Send + Sync,
{
    async fn extract(&self, job: &OcrJob) -> Result<String> {
        (self.func)(job)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
