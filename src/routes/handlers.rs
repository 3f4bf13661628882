use std::time::{Duration, Instant};

use futures::{pin_mut, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use slog::{debug, error};
use time::OffsetDateTime;
use warp::{
    filters::multipart::FormData,
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Json, Reply, WithStatus},
};

use crate::diagnosis::{DiagnosisId, ListFilter, Localization, NewDiagnosis};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::evidence::{EvidenceFile, EvidenceKind};
use crate::external::{supported_languages, DEFAULT_TARGET_LANGUAGE};
use crate::io::part_as_vec;
use crate::routes::{
    query::ListQuery,
    rejection::{Context, Rejection},
    response::{
        ApiResponse, HealthPayload, LanguagesPayload, LocalizationPayload, UploadPayload,
    },
};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

/// The body of `POST /diagnose`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiagnosisRequest {
    pub voice_input: Option<Value>,
    pub image_result: Option<Value>,
    pub combined_result: Option<String>,
    pub language: Option<String>,
}

/// The body of `POST /output/localize`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizeRequest {
    pub diagnosis_id: Option<String>,
    pub target_language: Option<String>,
}

pub async fn create(environment: Environment, request: CreateDiagnosisRequest) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::create(), e);

        debug!(environment.logger, "Creating diagnosis...");

        let new_diagnosis = NewDiagnosis::new(
            request.voice_input,
            request.image_result,
            request.combined_result,
            request.language,
        )
        .map_err(error_handler)?;

        let diagnosis = environment
            .db
            .insert(new_diagnosis)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Diagnosis saved"; "id" => diagnosis.id().as_str());

        with_status(
            json(&ApiResponse::success(
                diagnosis,
                "Diagnosis created successfully",
            )),
            StatusCode::CREATED,
        )
    }
}

pub async fn list(environment: Environment, query: ListQuery) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::list(), e);

        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(10).max(1);
        let filter = ListFilter {
            language: query.language,
        };

        debug!(environment.logger, "Listing diagnoses..."; "page" => page, "limit" => limit);

        let diagnosis_page = environment
            .db
            .list(filter, page, limit)
            .await
            .map_err(error_handler)?;

        json(&ApiResponse::success(
            diagnosis_page,
            "Diagnoses retrieved successfully",
        ))
    }
}

pub async fn retrieve(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::retrieve(id.clone()), e);

        let parsed: DiagnosisId = id.parse().map_err(&error_handler)?;

        debug!(environment.logger, "Retrieving diagnosis..."; "id" => parsed.as_str());

        let option = environment
            .db
            .retrieve(&parsed)
            .await
            .map_err(&error_handler)?;

        match option {
            Some(diagnosis) => with_status(
                json(&ApiResponse::success(
                    diagnosis,
                    "Diagnosis retrieved successfully",
                )),
                StatusCode::OK,
            ),
            None => {
                return Err(error_handler(BackendError::NotFound {
                    id: parsed.to_string(),
                })
                .into())
            }
        }
    }
}

pub async fn localize(environment: Environment, request: LocalizeRequest) -> RouteResult {
    timed! {
        let raw_id = request.diagnosis_id;
        let error_handler = |e: BackendError| Rejection::new(Context::localize(raw_id.clone()), e);

        let raw = raw_id
            .clone()
            .ok_or(BackendError::MissingField {
                field: "diagnosisId",
            })
            .map_err(&error_handler)?;
        let id: DiagnosisId = raw.parse().map_err(&error_handler)?;
        let target_language = request
            .target_language
            .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_owned());

        debug!(environment.logger, "Localizing diagnosis..."; "id" => id.as_str(), "target_language" => target_language.as_str());

        let diagnosis = environment
            .db
            .retrieve(&id)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| BackendError::NotFound { id: id.to_string() })
            .map_err(&error_handler)?;

        let localized_text = environment
            .localizer
            .translate(diagnosis.combined_result(), &target_language)
            .await
            .map_err(&error_handler)?;
        let audio_url = environment
            .localizer
            .synthesize_speech(&localized_text, &target_language)
            .await
            .map_err(&error_handler)?;

        // one atomic patch: localized text, audio reference and
        // language always change together
        let _updated = environment
            .db
            .apply_localization(
                &id,
                Localization::new(
                    localized_text.clone(),
                    audio_url.clone(),
                    target_language.clone(),
                ),
            )
            .await
            .map_err(&error_handler)?;

        let payload = LocalizationPayload {
            diagnosis_id: id,
            localized_text,
            audio_url,
            target_language,
        };

        with_status(
            json(&ApiResponse::success(
                payload,
                "Localization completed successfully",
            )),
            StatusCode::OK,
        )
    }
}

pub async fn languages(_environment: Environment) -> RouteResult {
    timed! {
        let payload = LanguagesPayload {
            supported_languages: supported_languages(),
        };

        json(&ApiResponse::success(
            payload,
            "Supported languages retrieved successfully",
        ))
    }
}

pub async fn health(_environment: Environment) -> RouteResult {
    timed! {
        let payload = HealthPayload {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: OffsetDateTime::now_utc(),
        };

        json(&ApiResponse::success(payload, "Service is running"))
    }
}

pub async fn upload_voice(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        process_upload(environment, EvidenceKind::Voice, content).await?
    }
}

pub async fn upload_image(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        process_upload(environment, EvidenceKind::Image, content).await?
    }
}

async fn process_upload(
    environment: Environment,
    kind: EvidenceKind,
    content: FormData,
) -> Result<WithStatus<Json>, Rejection> {
    let error_handler = |e: BackendError| Rejection::new(Context::upload(kind), e);

    debug!(environment.logger, "Parsing submission..."; "kind" => %kind);

    let submission = read_submission(kind, content)
        .await
        .map_err(&error_handler)?;

    // validation happens before the save, so a rejected upload leaves
    // nothing on disk
    let evidence = EvidenceFile::new(
        kind,
        submission.original_name,
        &submission.declared_media_type,
        submission.raw.len() as u64,
    )
    .map_err(&error_handler)?;

    debug!(environment.logger, "Staging evidence..."; "stored_name" => evidence.stored_name.as_str());
    environment
        .store
        .save(&evidence.stored_name, submission.raw)
        .await
        .map_err(&error_handler)?;

    let payload = match kind {
        EvidenceKind::Voice => {
            match environment.analyzer.transcribe(&evidence.stored_name).await {
                Ok(processing) => UploadPayload::Voice {
                    file_info: evidence,
                    processing,
                },
                Err(e) => {
                    return Err(error_handler(
                        discard_staged_evidence(&environment, &evidence, e).await,
                    ))
                }
            }
        }
        EvidenceKind::Image => {
            match environment
                .analyzer
                .classify_image(&evidence.stored_name)
                .await
            {
                Ok(analysis) => UploadPayload::Image {
                    file_info: evidence,
                    analysis,
                },
                Err(e) => {
                    return Err(error_handler(
                        discard_staged_evidence(&environment, &evidence, e).await,
                    ))
                }
            }
        }
    };

    debug!(environment.logger, "Sending response...");
    let message = match kind {
        EvidenceKind::Voice => "Voice upload successful",
        EvidenceKind::Image => "Image upload successful",
    };

    Ok(with_status(
        json(&ApiResponse::success(payload, message)),
        StatusCode::CREATED,
    ))
}

/// The single file part of an upload, fully read off the wire.
struct Submission {
    original_name: Option<String>,
    declared_media_type: String,
    raw: Vec<u8>,
}

/// Drains the form one part at a time. A part's body must be read in
/// full before the next part is polled; the multipart state only keeps
/// one part live at once.
async fn read_submission(kind: EvidenceKind, content: FormData) -> Result<Submission, BackendError> {
    pin_mut!(content);

    let mut submission = None;

    while let Some(result) = content.next().await {
        let part = result.map_err(|_| BackendError::MalformedFormSubmission)?;

        if part.name() != kind.field_name() {
            return Err(BackendError::UnexpectedField {
                field: part.name().to_owned(),
            });
        }

        let original_name = part.filename().map(ToOwned::to_owned);
        let declared_media_type = part
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();

        let raw = part_as_vec(part)
            .await
            .map_err(|_| BackendError::MalformedFormSubmission)?;

        submission = Some(Submission {
            original_name,
            declared_media_type,
            raw,
        });
    }

    submission.ok_or(BackendError::NoEvidenceFile {
        field: kind.field_name(),
    })
}

/// Removes a staged file after a downstream failure, so no orphaned
/// evidence outlives its request. Returns the original cause.
async fn discard_staged_evidence(
    environment: &Environment,
    evidence: &EvidenceFile,
    cause: BackendError,
) -> BackendError {
    if let Err(e) = environment.store.delete(&evidence.stored_name).await {
        error!(environment.logger, "Failed to clean up staged evidence"; "stored_name" => evidence.stored_name.as_str(), "error" => ?e);
    }

    cause
}

fn format_server_timing(elapsed: Duration) -> String {
    format!("handler;dur={}", elapsed.as_secs_f64() * 1000.0)
}
