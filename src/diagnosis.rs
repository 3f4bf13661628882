use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::errors::BackendError;

/// The language every diagnosis starts in.
pub const DEFAULT_LANGUAGE: &str = "en";

/// The stable identifier of a diagnosis: a 24-character hexadecimal
/// string (a 4-byte creation-seconds prefix followed by 8 random
/// bytes). Parsing validates the shape, so a held `DiagnosisId` is
/// always well-formed and lookups for malformed ids never reach
/// storage.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct DiagnosisId(String);

impl DiagnosisId {
    /// The number of hexadecimal characters in an identifier.
    pub const LENGTH: usize = 24;

    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        let seconds = OffsetDateTime::now_utc().unix_timestamp() as u32;
        let random = Uuid::new_v4();

        let mut bytes = [0u8; Self::LENGTH / 2];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&random.as_bytes()[..8]);

        DiagnosisId(bytes.iter().map(|byte| format!("{:02x}", byte)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DiagnosisId {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == Self::LENGTH && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(DiagnosisId(s.to_owned()))
        } else {
            Err(BackendError::InvalidId { id: s.to_owned() })
        }
    }
}

impl fmt::Display for DiagnosisId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DiagnosisId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single diagnosis record in the database.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    /// The ID of the diagnosis.
    pub(crate) id: DiagnosisId,

    /// The raw voice analysis result, if any. Opaque to this service.
    pub(crate) voice_input: Option<Value>,

    /// The raw image analysis result, if any. Opaque to this service.
    pub(crate) image_result: Option<Value>,

    /// The combined human-readable diagnosis. Never empty.
    pub(crate) combined_result: String,

    /// The language the diagnosis is currently presented in.
    pub(crate) language: String,

    /// The localized diagnosis text. Present exactly when `audio_url` is.
    pub(crate) localized_text: Option<String>,

    /// A reference to the synthesized audio. Present exactly when
    /// `localized_text` is.
    #[serde(rename = "audioURL")]
    pub(crate) audio_url: Option<Url>,

    /// The date and time it was created.
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
}

impl Diagnosis {
    pub(crate) fn from_new(id: DiagnosisId, new_diagnosis: NewDiagnosis) -> Self {
        Diagnosis {
            id,
            voice_input: new_diagnosis.voice_input,
            image_result: new_diagnosis.image_result,
            combined_result: new_diagnosis.combined_result,
            language: new_diagnosis.language,
            localized_text: None,
            audio_url: None,
            created_at: new_diagnosis.created_at,
        }
    }

    pub fn id(&self) -> &DiagnosisId {
        &self.id
    }

    pub fn combined_result(&self) -> &str {
        &self.combined_result
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn localized_text(&self) -> Option<&str> {
        self.localized_text.as_deref()
    }

    pub fn audio_url(&self) -> Option<&Url> {
        self.audio_url.as_ref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// A validated diagnosis that has not been persisted yet. Constructing
/// one is the only way into the store, so a record without a combined
/// result can never be written.
#[derive(Clone, Debug)]
pub struct NewDiagnosis {
    pub(crate) voice_input: Option<Value>,
    pub(crate) image_result: Option<Value>,
    pub(crate) combined_result: String,
    pub(crate) language: String,
    pub(crate) created_at: OffsetDateTime,
}

impl NewDiagnosis {
    pub fn new(
        voice_input: Option<Value>,
        image_result: Option<Value>,
        combined_result: Option<String>,
        language: Option<String>,
    ) -> Result<Self, BackendError> {
        let combined_result = combined_result.unwrap_or_default();

        if combined_result.is_empty() {
            return Err(BackendError::MissingField {
                field: "combinedResult",
            });
        }

        Ok(NewDiagnosis {
            voice_input,
            image_result,
            combined_result,
            language: language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned()),
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

/// The atomic localization patch: all three fields are applied in a
/// single store update so `localized_text` and `audio_url` are never
/// observable one without the other.
#[derive(Clone, Debug)]
pub struct Localization {
    pub(crate) localized_text: String,
    pub(crate) audio_url: Url,
    pub(crate) language: String,
}

impl Localization {
    pub fn new(localized_text: String, audio_url: Url, language: String) -> Self {
        Localization {
            localized_text,
            audio_url,
            language,
        }
    }
}

/// An optional exact-match filter over the diagnosis history.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub language: Option<String>,
}

/// One page of the diagnosis history, most recent first.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DiagnosisPage {
    pub diagnoses: Vec<Diagnosis>,
    pub pagination: Pagination,
}

impl DiagnosisPage {
    pub fn new(diagnoses: Vec<Diagnosis>, page: u32, limit: u32, total_records: u64) -> Self {
        let pagination = Pagination::new(page, limit, diagnoses.len(), total_records);

        DiagnosisPage {
            diagnoses,
            pagination,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// The requested page.
    pub current_page: u32,

    /// The number of pages the filtered history spans.
    pub total_pages: u32,

    /// The number of records actually returned on this page.
    pub page_count: u32,

    /// The number of records matching the filter.
    pub total_records: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, returned: usize, total_records: u64) -> Self {
        let limit = u64::from(limit.max(1));

        Pagination {
            current_page: page,
            total_pages: ((total_records + limit - 1) / limit) as u32,
            page_count: returned as u32,
            total_records,
        }
    }
}
