use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::BackendError;

/// The language a diagnosis is localized into when the caller does not
/// pick one.
pub const DEFAULT_TARGET_LANGUAGE: &str = "tw";

/// The result of transcribing a voice evidence file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    pub transcription: String,
    pub confidence: f32,
    pub language: String,
}

/// The result of classifying an image evidence file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub prediction: String,
    pub confidence: f32,
    pub disease_info: DiseaseInfo,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseInfo {
    pub severity: String,
    pub treatment: String,
    pub prevention: String,
}

/// The external analysis engines: speech recognition and crop-disease
/// image classification. Referenced by stable staged-file name, never
/// by raw bytes. Engine failures surface as
/// [`BackendError::ExternalService`].
pub trait Analyzer: Send + Sync {
    fn transcribe(&self, audio_ref: &str) -> BoxFuture<Result<Transcription, BackendError>>;

    fn classify_image(&self, image_ref: &str) -> BoxFuture<Result<ImageAnalysis, BackendError>>;
}

/// The external localization engines: translation and text-to-speech.
/// Engine failures surface as [`BackendError::ExternalService`].
pub trait Localizer: Send + Sync {
    fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> BoxFuture<Result<String, BackendError>>;

    fn synthesize_speech(
        &self,
        text: &str,
        target_language: &str,
    ) -> BoxFuture<Result<Url, BackendError>>;
}

/// Returns the languages a diagnosis can be localized into, keyed by
/// code.
pub fn supported_languages() -> BTreeMap<&'static str, &'static str> {
    let mut languages = BTreeMap::new();
    languages.insert("en", "English");
    languages.insert("tw", "Twi");
    languages.insert("ak", "Akan");
    languages.insert("ee", "Ewe");

    languages
}

/// The stand-in for engines that are not yet integrated. Returns
/// deterministic placeholder data so the pipeline around it stays fully
/// exercisable; it never pretends to be a production engine.
pub struct Unintegrated {
    audio_base: Url,
}

impl Unintegrated {
    /// Creates a new instance. `audio_base` is where synthesized audio
    /// references point.
    pub fn new(audio_base: Url) -> Self {
        Unintegrated { audio_base }
    }
}

impl Analyzer for Unintegrated {
    fn transcribe(&self, _audio_ref: &str) -> BoxFuture<Result<Transcription, BackendError>> {
        async {
            Ok(Transcription {
                transcription: "Sample transcription - speech recognition not yet integrated"
                    .to_owned(),
                confidence: 0.8,
                language: "en".to_owned(),
            })
        }
        .boxed()
    }

    fn classify_image(&self, _image_ref: &str) -> BoxFuture<Result<ImageAnalysis, BackendError>> {
        async {
            Ok(ImageAnalysis {
                prediction: "Sample prediction - crop disease model not yet integrated".to_owned(),
                confidence: 0.85,
                disease_info: DiseaseInfo {
                    severity: "medium".to_owned(),
                    treatment: "Sample treatment recommendation".to_owned(),
                    prevention: "Sample prevention advice".to_owned(),
                },
            })
        }
        .boxed()
    }
}

impl Localizer for Unintegrated {
    fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> BoxFuture<Result<String, BackendError>> {
        let localized = format!("[{}] {}", target_language.to_uppercase(), text);

        async { Ok(localized) }.boxed()
    }

    fn synthesize_speech(
        &self,
        text: &str,
        target_language: &str,
    ) -> BoxFuture<Result<Url, BackendError>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);

        let result = self
            .audio_base
            .join(&format!(
                "audio/{}-{:016x}.mp3",
                target_language,
                hasher.finish()
            ))
            .map_err(|source| BackendError::FailedToGenerateUrl { source });

        async { result }.boxed()
    }
}
