use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::BackendError;

/// The largest evidence file accepted, checked before anything is
/// staged to disk.
pub const MAX_EVIDENCE_BYTES: u64 = 50 * 1024 * 1024;

/// The kind of evidence a client may submit for analysis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Voice,
    Image,
}

impl EvidenceKind {
    /// The multipart field name that carries this kind of evidence.
    pub fn field_name(self) -> &'static str {
        match self {
            EvidenceKind::Voice => "audio",
            EvidenceKind::Image => "image",
        }
    }

    /// The top-level media type this kind of evidence must declare.
    pub fn expected_media_type(self) -> &'static str {
        match self {
            EvidenceKind::Voice => "audio/",
            EvidenceKind::Image => "image/",
        }
    }

    /// Checks the declared media type against this kind, mirroring the
    /// upload filter: `audio/*` for voice, `image/*` for images.
    pub fn check_media_type(self, declared: &str) -> Result<(), BackendError> {
        let parsed: mime::Mime = declared.parse().map_err(|_| BackendError::WrongMediaType {
            expected: self.expected_media_type(),
            actual: declared.to_owned(),
        })?;

        let expected = match self {
            EvidenceKind::Voice => mime::AUDIO,
            EvidenceKind::Image => mime::IMAGE,
        };

        if parsed.type_() == expected {
            Ok(())
        } else {
            Err(BackendError::WrongMediaType {
                expected: self.expected_media_type(),
                actual: declared.to_owned(),
            })
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            EvidenceKind::Voice => "voice",
            EvidenceKind::Image => "image",
        })
    }
}

/// Metadata for a staged evidence file. Transient: the file lives only
/// for the duration of its request unless every step succeeds.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub original_name: Option<String>,
    pub stored_name: String,
    pub size_bytes: u64,
    pub declared_media_type: String,
    pub kind: EvidenceKind,
}

impl EvidenceFile {
    /// Validates the declared media type and size, and assigns a staged
    /// name unique to this request so concurrent uploads never collide.
    /// No side effects: staging the bytes under `stored_name` is the
    /// caller's next step.
    pub fn new(
        kind: EvidenceKind,
        original_name: Option<String>,
        declared_media_type: &str,
        size_bytes: u64,
    ) -> Result<Self, BackendError> {
        kind.check_media_type(declared_media_type)?;

        if size_bytes > MAX_EVIDENCE_BYTES {
            return Err(BackendError::EvidenceTooLarge {
                size: size_bytes,
                limit: MAX_EVIDENCE_BYTES,
            });
        }

        Ok(EvidenceFile {
            original_name,
            stored_name: format!("{}-{}", kind, Uuid::new_v4().simple()),
            size_bytes,
            declared_media_type: declared_media_type.to_owned(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_accepts_audio_types() {
        for declared in &["audio/ogg", "audio/mpeg; rate=44100", "audio/wav"] {
            assert!(EvidenceKind::Voice.check_media_type(declared).is_ok());
        }
    }

    #[test]
    fn voice_rejects_non_audio_types() {
        for declared in &["text/plain", "image/png", "application/json", "nonsense"] {
            assert!(matches!(
                EvidenceKind::Voice.check_media_type(declared),
                Err(BackendError::WrongMediaType { .. })
            ));
        }
    }

    #[test]
    fn image_accepts_image_types() {
        assert!(EvidenceKind::Image.check_media_type("image/jpeg").is_ok());
        assert!(matches!(
            EvidenceKind::Image.check_media_type("audio/ogg"),
            Err(BackendError::WrongMediaType { .. })
        ));
    }

    #[test]
    fn oversized_evidence_is_rejected_before_staging() {
        let result = EvidenceFile::new(
            EvidenceKind::Voice,
            None,
            "audio/ogg",
            MAX_EVIDENCE_BYTES + 1,
        );

        assert!(matches!(
            result,
            Err(BackendError::EvidenceTooLarge { .. })
        ));
    }

    #[test]
    fn staged_names_are_unique_per_request() {
        let make = || {
            EvidenceFile::new(EvidenceKind::Image, Some("leaf.png".into()), "image/png", 42)
                .expect("create evidence file")
        };

        let first = make();
        let second = make();

        assert!(first.stored_name.starts_with("image-"));
        assert_ne!(first.stored_name, second.stored_name);
    }
}
