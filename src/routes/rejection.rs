use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;
use crate::evidence::EvidenceKind;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self, include_details: bool) -> FlattenedRejection {
        FlattenedRejection {
            success: false,
            error: format!("{}", self.error),
            message: if include_details {
                Some(format!("{:?}", self.error))
            } else {
                None
            },
        }
    }
}

impl reject::Reject for Rejection {}

/// The error half of the response envelope. `message` carries internal
/// detail and is only populated outside production.
#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    pub(crate) success: bool,
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl FlattenedRejection {
    pub(crate) fn new(error: String, message: Option<String>) -> Self {
        FlattenedRejection {
            success: false,
            error,
            message,
        }
    }
}

/// Where in the API an error arose, for logging.
#[derive(Clone, Debug)]
pub enum Context {
    Create,
    List,
    Retrieve { id: String },
    Localize { id: Option<String> },
    Upload { kind: EvidenceKind },
}

impl Context {
    pub fn create() -> Context {
        Context::Create
    }

    pub fn list() -> Context {
        Context::List
    }

    pub fn retrieve(id: String) -> Context {
        Context::Retrieve { id }
    }

    pub fn localize(id: Option<String>) -> Context {
        Context::Localize { id }
    }

    pub fn upload(kind: EvidenceKind) -> Context {
        Context::Upload { kind }
    }
}
