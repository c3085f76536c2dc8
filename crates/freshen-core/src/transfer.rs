use reqwest::StatusCode;

use crate::manifest::ReleaseManifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPayload {
    Bytes(Vec<u8>),
    Manifest(ReleaseManifest),
}

/// Outcome of a single manifest or package retrieval.
///
/// A successful result always carries its payload; a failed one never does
/// and always explains itself through [`TransferResult::message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    status: Option<StatusCode>,
    message: Option<String>,
    payload: Option<TransferPayload>,
}

impl TransferResult {
    #[must_use]
    pub fn manifest(status: Option<StatusCode>, manifest: ReleaseManifest) -> Self {
        Self {
            status,
            message: None,
            payload: Some(TransferPayload::Manifest(manifest)),
        }
    }

    #[must_use]
    pub fn package(status: Option<StatusCode>, bytes: Vec<u8>) -> Self {
        Self {
            status,
            message: None,
            payload: Some(TransferPayload::Bytes(bytes)),
        }
    }

    #[must_use]
    pub fn failed(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "transfer failed".to_string()
        } else {
            message
        };
        Self {
            status,
            message: Some(message),
            payload: None,
        }
    }

    /// Attach a diagnostic message (such as the HTTP reason phrase) to a
    /// successful result.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.payload.is_some()
    }

    /// Protocol status of the exchange. `None` for local file reads.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn payload_manifest(&self) -> Option<&ReleaseManifest> {
        match &self.payload {
            Some(TransferPayload::Manifest(manifest)) => Some(manifest),
            _ => None,
        }
    }

    #[must_use]
    pub fn payload_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(TransferPayload::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_payload(self) -> Option<TransferPayload> {
        self.payload
    }
}

/// Progress events emitted while an update is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateProgress {
    Downloading { downloaded: u64, total: u64 },
    Verifying,
    Extracting,
    Launching,
    Complete,
    Failed(String),
}
