//! Error types for the edgequake-pdf2audio library.
//!
//! Two error types, two failure modes:
//!
//! * [`Pdf2AudioError`]: **fatal** for a conversion attempt. The document
//!   cannot be read, no backend is configured, a chunk exhausted its retries,
//!   or the audio could not be written. Returned from every pipeline stage.
//!
//! * [`BackendError`]: **per request**. One speech-synthesis call failed.
//!   The orchestrator retries these and only escalates to
//!   [`Pdf2AudioError::SynthesisFailed`] once the retry budget is spent.
//!
//! Cancellation is neither: it is reported as an outcome
//! ([`crate::convert::RunOutcome::Cancelled`]), never as an error.

use crate::job::JobId;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2audio library.
#[derive(Debug, Error)]
pub enum Pdf2AudioError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The PDF opened but has no pages.
    #[error("PDF '{path}' contains no pages")]
    EmptyDocument { path: PathBuf },

    // ── Synthesis errors ──────────────────────────────────────────────────
    /// The requested backend is not registered.
    #[error("Speech backend '{name}' is not configured.\nAvailable: {available}")]
    BackendNotFound { name: String, available: String },

    /// A chunk failed on every attempt.
    #[error("Chunk {chunk} failed after {attempts} attempts: {source}")]
    SynthesisFailed {
        chunk: usize,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    // ── Audio errors ──────────────────────────────────────────────────────
    /// Decoding or concatenating chunk audio failed.
    #[error("Audio assembly failed: {0}")]
    AssemblyFailed(String),

    /// Encoding or writing the output file failed.
    #[error("Failed to export audio to '{path}': {detail}")]
    ExportFailed { path: PathBuf, detail: String },

    // ── Job errors ────────────────────────────────────────────────────────
    /// No job with this id is registered.
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// The requested state change is not an edge of the job state machine.
    #[error("Job {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: &'static str,
        to: &'static str,
    },

    /// The job already reached a terminal state.
    #[error("Job {id} is already {state}; no further updates are accepted")]
    JobFinalized { id: JobId, state: &'static str },

    /// Every pipeline attempt failed.
    #[error("Conversion failed after {attempts} attempts: {last_error}")]
    PipelineFailed { attempts: u32, last_error: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform, then either:\n\
  • place libpdfium next to the working directory, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2AudioError {
    /// Errors caused by the input document itself. Retrying cannot help.
    pub fn is_fatal_input(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. }
                | Self::PermissionDenied { .. }
                | Self::NotAPdf { .. }
                | Self::CorruptPdf { .. }
                | Self::PasswordRequired { .. }
                | Self::WrongPassword { .. }
                | Self::EmptyDocument { .. }
                | Self::PdfiumBindingFailed(_)
        )
    }
}

/// A failed call to a speech backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Transport-level failure (DNS, TLS, timeout).
    #[error("request to {backend} failed: {detail}")]
    Request { backend: String, detail: String },

    /// The service answered with a non-success status.
    #[error("{backend} returned HTTP {status}: {message}")]
    Api {
        backend: String,
        status: u16,
        message: String,
    },

    /// The response body could not be interpreted.
    #[error("could not decode {backend} response: {detail}")]
    Decode { backend: String, detail: String },

    /// The service answered successfully but produced no audio.
    #[error("{backend} returned empty audio")]
    EmptyAudio { backend: String },

    /// Credentials are missing.
    #[error("{backend} is not configured: {hint}")]
    NotConfigured { backend: String, hint: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_failed_carries_last_cause() {
        let e = Pdf2AudioError::SynthesisFailed {
            chunk: 7,
            attempts: 3,
            source: BackendError::Api {
                backend: "openai".into(),
                status: 503,
                message: "overloaded".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("Chunk 7"), "got: {msg}");
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");
    }

    #[test]
    fn input_errors_are_not_retryable() {
        let e = Pdf2AudioError::EmptyDocument {
            path: PathBuf::from("a.pdf"),
        };
        assert!(e.is_fatal_input());
        let e = Pdf2AudioError::AssemblyFailed("format mismatch".into());
        assert!(!e.is_fatal_input());
    }

    #[test]
    fn backend_not_found_lists_alternatives() {
        let e = Pdf2AudioError::BackendNotFound {
            name: "polly".into(),
            available: "openai, google".into(),
        };
        assert!(e.to_string().contains("openai, google"));
    }
}
