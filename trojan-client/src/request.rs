//! Analyze request payloads and local validation

use std::path::Path;
use thiserror::Error;

/// File extensions the upload endpoint accepts
pub const ACCEPTED_EXTENSIONS: &[&str] = &["txt", "md", "rtf", "html", "pdf", "doc", "docx"];

/// Local refusals raised before any network I/O
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select a model.")]
    MissingModel,

    #[error("Please enter some text to analyze.")]
    BlankText,

    #[error("Please select a model before uploading a file.")]
    MissingModelForUpload,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// A file picked for upload. Content is forwarded as-is; the server extracts text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    file_name: String,
    bytes: Vec<u8>,
}

impl UploadFile {
    /// Wrap in-memory content. The file name must carry an accepted extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let file_name = file_name.into();
        if !has_accepted_extension(&file_name) {
            return Err(ValidationError::UnsupportedFileType(file_name));
        }
        Ok(Self { file_name, bytes })
    }

    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !has_accepted_extension(&file_name) {
            return Err(ValidationError::UnsupportedFileType(path.display().to_string()));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ValidationError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
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
}

fn has_accepted_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ACCEPTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// What is being analyzed
#[derive(Debug, Clone)]
pub enum AnalyzeSource {
    Text(String),
    File(UploadFile),
}

/// One analyze call: exactly one source, plus engine and model
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub source: AnalyzeSource,
    pub engine: String,
    pub model_id: String,
}

impl AnalyzeRequest {
    /// Validate a text submission
    pub fn text(
        model_id: &str,
        text: &str,
        engine: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if model_id.is_empty() {
            return Err(ValidationError::MissingModel);
        }
        if text.trim().is_empty() {
            return Err(ValidationError::BlankText);
        }

        Ok(Self {
            source: AnalyzeSource::Text(text.to_string()),
            engine: engine.into(),
            model_id: model_id.to_string(),
        })
    }

    /// Validate a file submission
    pub fn file(
        model_id: &str,
        file: UploadFile,
        engine: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        if model_id.is_empty() {
            return Err(ValidationError::MissingModelForUpload);
        }

        Ok(Self {
            source: AnalyzeSource::File(file),
            engine: engine.into(),
            model_id: model_id.to_string(),
        })
    }

    pub fn is_upload(&self) -> bool {
        matches!(self.source, AnalyzeSource::File(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_text_validation() {
        assert_eq!(
            AnalyzeRequest::text("", "hello", "model").unwrap_err(),
            ValidationError::MissingModel
        );
        assert_eq!(
            AnalyzeRequest::text("m", "   \n\t", "model").unwrap_err(),
            ValidationError::BlankText
        );

        let request = AnalyzeRequest::text("latin_model:1.0.0", " Gallia est omnis ", "model").unwrap();
        assert!(!request.is_upload());
        // text is sent untrimmed
        match request.source {
            AnalyzeSource::Text(text) => assert_eq!(text, " Gallia est omnis "),
            AnalyzeSource::File(_) => panic!("expected text source"),
        }
    }

    #[test]
    fn test_file_requires_model() {
        let file = UploadFile::new("ode.txt", b"carpe diem".to_vec()).unwrap();
        assert_eq!(
            AnalyzeRequest::file("", file.clone(), "model").unwrap_err(),
            ValidationError::MissingModelForUpload
        );
        assert!(AnalyzeRequest::file("auto", file, "model").unwrap().is_upload());
    }

    #[test]
    fn test_accepted_extensions() {
        for name in ["a.txt", "b.md", "c.RTF", "d.html", "e.pdf", "f.doc", "g.DocX"] {
            assert!(UploadFile::new(name, vec![1]).is_ok(), "{name} should be accepted");
        }
        for name in ["a.exe", "noext", "archive.tar.gz", ".txt"] {
            assert!(
                matches!(
                    UploadFile::new(name, vec![1]),
                    Err(ValidationError::UnsupportedFileType(_))
                ),
                "{name} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aeneid.md");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"Arma virumque cano").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name(), "aeneid.md");
        assert_eq!(file.bytes(), b"Arma virumque cano");
        assert_eq!(file.len(), 18);

        let missing = UploadFile::from_path(dir.path().join("missing.txt")).await;
        assert!(matches!(missing, Err(ValidationError::Unreadable { .. })));

        let bad = UploadFile::from_path(dir.path().join("script.sh")).await;
        assert!(matches!(bad, Err(ValidationError::UnsupportedFileType(_))));
    }
}
