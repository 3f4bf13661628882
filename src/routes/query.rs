use serde::Deserialize;

/// Query parameters accepted by the history listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub language: Option<String>,
}
