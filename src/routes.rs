use std::sync::Arc;

use slog::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::environment::Config;
use crate::errors::BackendError;

mod handlers;
mod query;
pub mod rejection;
pub mod response;

pub use internal::*;

use rejection::FlattenedRejection;

/// The maximum form data size to accept: the evidence ceiling plus
/// room for multipart framing. Checked by warp from the declared
/// content length, before any bytes are buffered or staged.
const MAX_CONTENT_LENGTH: u64 = crate::evidence::MAX_EVIDENCE_BYTES + 64 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    config: Config,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?e, "status" => %status_code_for(e));
        let flattened = r.flatten(config.include_error_details);

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    if let Some(e) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        let flattened = FlattenedRejection::new("invalid request body".to_owned(), {
            if config.include_error_details {
                Some(format!("{}", e))
            } else {
                None
            }
        });

        return Ok(with_status(json(&flattened), StatusCode::BAD_REQUEST));
    }

    if rej.find::<reject::InvalidQuery>().is_some() {
        let flattened = FlattenedRejection::new("invalid query parameters".to_owned(), None);

        return Ok(with_status(json(&flattened), StatusCode::BAD_REQUEST));
    }

    if rej.find::<reject::PayloadTooLarge>().is_some() {
        let flattened = FlattenedRejection::new("payload too large".to_owned(), None);

        return Ok(with_status(json(&flattened), StatusCode::PAYLOAD_TOO_LARGE));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        MissingField { .. }
        | InvalidId { .. }
        | MalformedFormSubmission
        | NoEvidenceFile { .. }
        | UnexpectedField { .. }
        | WrongMediaType { .. }
        | EvidenceTooLarge { .. } => StatusCode::BAD_REQUEST,
        NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::{end, param as par};
    use warp::{get as g, path as p, post, query, Filter, Rejection, Reply};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    fn with_environment(
        environment: Environment,
    ) -> impl Filter<Extract = (Environment,), Error = std::convert::Infallible> + Clone {
        warp::any().map(move || environment.clone())
    }

    pub fn make_create_diagnosis_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("diagnose"))
            .and(end())
            .and(post())
            .and(warp::body::json())
            .and_then(handlers::create)
            .boxed()
    }

    pub fn make_list_diagnoses_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("diagnose"))
            .and(end())
            .and(g())
            .and(query::<q::ListQuery>())
            .and_then(handlers::list)
            .boxed()
    }

    pub fn make_retrieve_diagnosis_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("diagnose"))
            .and(par::<String>())
            .and(end())
            .and(g())
            .and_then(handlers::retrieve)
            .boxed()
    }

    pub fn make_localize_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("output"))
            .and(p("localize"))
            .and(end())
            .and(post())
            .and(warp::body::json())
            .and_then(handlers::localize)
            .boxed()
    }

    pub fn make_languages_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("output"))
            .and(p("languages"))
            .and(end())
            .and(g())
            .and_then(handlers::languages)
            .boxed()
    }

    pub fn make_upload_voice_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("upload"))
            .and(p("voice"))
            .and(end())
            .and(post())
            .and(form().max_length(MAX_CONTENT_LENGTH))
            .and_then(handlers::upload_voice)
            .boxed()
    }

    pub fn make_upload_image_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(p("upload"))
            .and(p("image"))
            .and(end())
            .and(post())
            .and(form().max_length(MAX_CONTENT_LENGTH))
            .and_then(handlers::upload_image)
            .boxed()
    }

    pub fn make_health_route(environment: Environment) -> Route {
        with_environment(environment)
            .and(end().or(p("health").and(end())).unify())
            .and(g())
            .and_then(handlers::health)
            .boxed()
    }

    /// The whole HTTP surface with rejection formatting applied.
    pub fn make_api(
        environment: Environment,
    ) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        let logger = environment.logger.clone();
        let config = environment.config;

        make_health_route(environment.clone())
            .or(make_create_diagnosis_route(environment.clone()))
            .or(make_list_diagnoses_route(environment.clone()))
            .or(make_retrieve_diagnosis_route(environment.clone()))
            .or(make_localize_route(environment.clone()))
            .or(make_languages_route(environment.clone()))
            .or(make_upload_voice_route(environment.clone()))
            .or(make_upload_image_route(environment))
            .recover(move |r| super::format_rejection(logger.clone(), config, r))
    }
}
