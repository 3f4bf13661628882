use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use url::Url;

use crate::diagnosis::DiagnosisId;
use crate::evidence::EvidenceFile;
use crate::external::{ImageAnalysis, Transcription};

/// The response envelope every endpoint replies with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: &str) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            message: Some(message.to_owned()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizationPayload {
    pub diagnosis_id: DiagnosisId,
    pub localized_text: String,
    #[serde(rename = "audioURL")]
    pub audio_url: Url,
    pub target_language: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagesPayload {
    pub supported_languages: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadPayload {
    #[serde(rename_all = "camelCase")]
    Voice {
        file_info: EvidenceFile,
        processing: Transcription,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        file_info: EvidenceFile,
        analysis: ImageAnalysis,
    },
}

#[derive(Debug, Serialize)]
pub struct HealthPayload {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
