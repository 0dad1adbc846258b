//! Error types for Hoerbuch
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by the stage of the narration pipeline that raises them,
//! which is also how the binary decides what to clean up and how to exit.
//!
//! ## Categories
//!
//! ### Setup (fatal before any output is touched)
//! - Missing input file → `FileNotFound`
//! - Unknown document extension → `UnsupportedDocument`
//! - Voice model or engine binary missing → `VoiceModelNotFound`, `EngineNotFound`
//! - ffmpeg missing → `FfmpegNotFound`
//!
//! ### Synthesis
//! - Engine failed mid-stream → `SynthesisFailed`
//! - Container encoder failed → `FfmpegError`
//!
//! ### Tagging (never fatal, logged as warnings by the caller)
//! - `TaggingFailed`
//!
//! ### Conversion
//! - MP3 transcode failed → `ConversionFailed`
//!
//! ### Pre-existing output
//! - `FileAlreadyExists` is a soft stop: nothing was written.

use std::path::Path;
use thiserror::Error;

/// Result type alias using our HoerbuchError type
pub type Result<T> = std::result::Result<T, HoerbuchError>;

/// Main error type for Hoerbuch
#[derive(Error, Debug)]
pub enum HoerbuchError {
    // ===== Input / Setup Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Input extension is not one of the supported document types
    #[error("Unsupported file extension '{extension}'. Supported: .txt, .docx, .odt, .epub")]
    UnsupportedDocument { extension: String },

    /// Document could not be parsed into segments
    #[error("Error during document parsing: {message}")]
    DocumentParse {
        message: String,
        /// Archive member or element being parsed, if known
        location: Option<String>,
    },

    /// Document parsed fine but produced no text
    #[error("Document contains no extractable text segments")]
    EmptyDocument,

    /// No voice model could be located
    #[error("Voice model '{0}' not found in any search path")]
    VoiceModelNotFound(String),

    /// Voice model config (`<model>.onnx.json`) is missing or malformed
    #[error("Invalid voice configuration {path}: {reason}")]
    InvalidVoiceConfig { path: String, reason: String },

    /// Speech engine binary not found in PATH
    #[error("Speech engine '{0}' not found. Please install piper and ensure it's in your PATH.")]
    EngineNotFound(String),

    /// FFmpeg binary not found in PATH
    #[error("FFmpeg not found. Please install FFmpeg and ensure it's in your PATH.")]
    FfmpegNotFound,

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ===== Synthesis Errors =====

    /// The speech engine failed while producing audio
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),

    /// FFmpeg/FFprobe execution error
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    // ===== Tagging / Conversion Errors =====

    /// Writing chapter markers or tags failed
    #[error("Failed to write tags to {path}: {reason}")]
    TaggingFailed { path: String, reason: String },

    /// Secondary format conversion failed
    #[error("Audio conversion failed: {0}")]
    ConversionFailed(String),

    // ===== File Errors =====

    /// Output already exists and will not be overwritten
    #[error("Output file already exists: {0}")]
    FileAlreadyExists(String),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== External Library Errors =====

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Zip container error (docx, odt, epub)
    #[error("Archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// XML error (docx, odt, epub)
    #[error("XML error: {0}")]
    XmlError(#[from] quick_xml::Error),
}

impl From<std::num::ParseFloatError> for HoerbuchError {
    fn from(err: std::num::ParseFloatError) -> Self {
        HoerbuchError::InvalidInput(format!("Failed to parse float: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for HoerbuchError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        HoerbuchError::XmlError(quick_xml::Error::InvalidAttr(err))
    }
}

// Helper methods for creating common errors
impl HoerbuchError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        HoerbuchError::InvalidInput(message.into())
    }

    /// Create a DocumentParse error
    pub fn parse<S: Into<String>>(message: S, location: Option<String>) -> Self {
        HoerbuchError::DocumentParse {
            message: message.into(),
            location,
        }
    }

    /// Create a TaggingFailed error for a file
    pub fn tagging<S: Into<String>>(path: &Path, reason: S) -> Self {
        HoerbuchError::TaggingFailed {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create a FileIoError from an operation, a path and the underlying error
    pub fn file_io(operation: &str, path: &Path, err: impl std::fmt::Display) -> Self {
        HoerbuchError::FileIoError(format!("{}: {} - {}", operation, path.display(), err))
    }

    /// Check if error is a setup problem that must stop the run before any output
    /// file is touched
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            HoerbuchError::FileNotFound(_)
                | HoerbuchError::UnsupportedDocument { .. }
                | HoerbuchError::VoiceModelNotFound(_)
                | HoerbuchError::InvalidVoiceConfig { .. }
                | HoerbuchError::EngineNotFound(_)
                | HoerbuchError::FfmpegNotFound
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            HoerbuchError::FfmpegNotFound => {
                "ffmpeg is required for MP3 conversion but was not found. Please install ffmpeg.".to_string()
            }
            HoerbuchError::EngineNotFound(name) => {
                format!("The speech engine '{}' was not found. Install piper (https://github.com/rhasspy/piper) and make sure it is in your PATH.", name)
            }
            HoerbuchError::FileAlreadyExists(path) => {
                format!("Output file '{}' already exists. Please rename or delete it if you wish to regenerate the audio.", path)
            }
            HoerbuchError::DocumentParse { message, location: Some(location) } => {
                format!("Error during document parsing ({}): {}", location, message)
            }
            _ => self.to_string(),
        }
    }
}
