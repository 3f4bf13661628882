use futures::future::BoxFuture;

use crate::diagnosis::{Diagnosis, DiagnosisId, DiagnosisPage, ListFilter, Localization, NewDiagnosis};
use crate::errors::BackendError;

/// The diagnosis record store. The only component that touches
/// persistence; everything else goes through this contract.
pub trait Db {
    /// Persists a validated diagnosis, assigning its identifier.
    fn insert(&self, new_diagnosis: NewDiagnosis) -> BoxFuture<Result<Diagnosis, BackendError>>;

    /// Fetches one diagnosis. The identifier shape has already been
    /// validated by [`DiagnosisId`] parsing, so malformed ids never get
    /// this far.
    fn retrieve(&self, id: &DiagnosisId) -> BoxFuture<Result<Option<Diagnosis>, BackendError>>;

    /// Returns one page of the history, most recent first, optionally
    /// filtered by exact language match.
    fn list(
        &self,
        filter: ListFilter,
        page: u32,
        limit: u32,
    ) -> BoxFuture<Result<DiagnosisPage, BackendError>>;

    /// Applies the localization patch in a single atomic update, so
    /// `localized_text` and `audio_url` always change together.
    /// Overwrites any previous localization.
    fn apply_localization(
        &self,
        id: &DiagnosisId,
        localization: Localization,
    ) -> BoxFuture<Result<Diagnosis, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde_json::Value;
    use sqlx::postgres::{PgPool, PgRow};
    use sqlx::Row;
    use time::OffsetDateTime;
    use url::Url;

    use crate::diagnosis::{
        Diagnosis, DiagnosisId, DiagnosisPage, ListFilter, Localization, NewDiagnosis,
    };
    use crate::errors::BackendError;

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }

        /// Creates the diagnoses table and its indexes if they do not
        /// exist yet. Run once at startup.
        pub async fn ensure_schema(&self) -> Result<(), BackendError> {
            use sqlx::Executor;

            self.pool
                .execute(include_str!("queries/schema.sql"))
                .await
                .map_err(map_sqlx_error)?;

            Ok(())
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert(
            &self,
            new_diagnosis: NewDiagnosis,
        ) -> BoxFuture<Result<Diagnosis, BackendError>> {
            async move {
                let id = DiagnosisId::generate();
                let diagnosis = Diagnosis::from_new(id, new_diagnosis);

                let query = sqlx::query(include_str!("queries/create.sql"));

                query
                    .bind(diagnosis.id.as_str())
                    .bind(&diagnosis.voice_input)
                    .bind(&diagnosis.image_result)
                    .bind(&diagnosis.combined_result)
                    .bind(&diagnosis.language)
                    .bind(diagnosis.created_at)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(diagnosis)
            }
            .boxed()
        }

        fn retrieve(&self, id: &DiagnosisId) -> BoxFuture<Result<Option<Diagnosis>, BackendError>> {
            let id = id.clone();

            async move {
                let query = sqlx::query(include_str!("queries/retrieve.sql"));

                let result = query
                    .bind(id.as_str())
                    .try_map(|row: PgRow| diagnosis_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(result)
            }
            .boxed()
        }

        fn list(
            &self,
            filter: ListFilter,
            page: u32,
            limit: u32,
        ) -> BoxFuture<Result<DiagnosisPage, BackendError>> {
            async move {
                let offset = i64::from(page - 1) * i64::from(limit);

                let query = sqlx::query(include_str!("queries/list.sql"));

                let diagnoses = query
                    .bind(&filter.language)
                    .bind(i64::from(limit))
                    .bind(offset)
                    .try_map(|row: PgRow| diagnosis_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let count_query =
                    sqlx::query_as::<_, (i64,)>(include_str!("queries/count.sql"));

                let (total,) = count_query
                    .bind(&filter.language)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(DiagnosisPage::new(diagnoses, page, limit, total as u64))
            }
            .boxed()
        }

        fn apply_localization(
            &self,
            id: &DiagnosisId,
            localization: Localization,
        ) -> BoxFuture<Result<Diagnosis, BackendError>> {
            let id = id.clone();

            async move {
                let query = sqlx::query(include_str!("queries/apply_localization.sql"));

                let result = query
                    .bind(id.as_str())
                    .bind(&localization.localized_text)
                    .bind(localization.audio_url.as_str())
                    .bind(&localization.language)
                    .try_map(|row: PgRow| diagnosis_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                result.ok_or(BackendError::NotFound {
                    id: id.to_string(),
                })
            }
            .boxed()
        }
    }

    fn diagnosis_from_row(row: &PgRow) -> Result<Diagnosis, sqlx::Error> {
        let raw_id: String = row.try_get("id")?;
        let id: DiagnosisId = raw_id
            .parse()
            // cannot happen, since the column is constrained to the id
            // shape, but just for completeness...
            .map_err(|e: BackendError| sqlx::Error::Decode(Box::new(e)))?;

        let voice_input: Option<Value> = row.try_get("voice_input")?;
        let image_result: Option<Value> = row.try_get("image_result")?;
        let combined_result: String = row.try_get("combined_result")?;
        let language: String = row.try_get("language")?;
        let localized_text: Option<String> = row.try_get("localized_text")?;
        let created_at: OffsetDateTime = row.try_get("created_at")?;

        let audio_url: Option<String> = row.try_get("audio_url")?;
        let audio_url = match audio_url {
            Some(url) => Some(Url::parse(&url).map_err(|source| {
                sqlx::Error::Decode(Box::new(BackendError::UnableToParseUrl { url, source }))
            })?),
            None => None,
        };

        Ok(Diagnosis {
            id,
            voice_input,
            image_result,
            combined_result,
            language,
            localized_text,
            audio_url,
            created_at,
        })
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        BackendError::Sqlx { source: error }
    }
}

pub mod memory {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    use futures::future::BoxFuture;
    use futures::FutureExt;

    use crate::diagnosis::{
        Diagnosis, DiagnosisId, DiagnosisPage, ListFilter, Localization, NewDiagnosis,
    };
    use crate::errors::BackendError;

    /// An in-memory implementation of [`Db`](super::Db) for tests and
    /// local development. Counts retrievals so tests can prove that
    /// malformed identifiers never cause a storage round-trip.
    #[derive(Default)]
    pub struct MemoryDb {
        rows: RwLock<Vec<Diagnosis>>,
        retrievals: AtomicUsize,
    }

    impl MemoryDb {
        pub fn new() -> Self {
            MemoryDb::default()
        }

        /// The number of times `retrieve` has touched storage.
        pub fn retrievals(&self) -> usize {
            self.retrievals.load(Ordering::SeqCst)
        }

        /// The number of records currently persisted.
        pub fn record_count(&self) -> usize {
            self.rows.read().unwrap().len()
        }
    }

    impl super::Db for MemoryDb {
        fn insert(
            &self,
            new_diagnosis: NewDiagnosis,
        ) -> BoxFuture<Result<Diagnosis, BackendError>> {
            let diagnosis = Diagnosis::from_new(DiagnosisId::generate(), new_diagnosis);

            self.rows.write().unwrap().push(diagnosis.clone());

            async { Ok(diagnosis) }.boxed()
        }

        fn retrieve(&self, id: &DiagnosisId) -> BoxFuture<Result<Option<Diagnosis>, BackendError>> {
            self.retrievals.fetch_add(1, Ordering::SeqCst);

            let result = self
                .rows
                .read()
                .unwrap()
                .iter()
                .find(|diagnosis| diagnosis.id() == id)
                .cloned();

            async { Ok(result) }.boxed()
        }

        fn list(
            &self,
            filter: ListFilter,
            page: u32,
            limit: u32,
        ) -> BoxFuture<Result<DiagnosisPage, BackendError>> {
            let rows = self.rows.read().unwrap();

            // newest insertions first among equal timestamps
            let mut matching: Vec<Diagnosis> = rows
                .iter()
                .rev()
                .filter(|diagnosis| match &filter.language {
                    Some(language) => diagnosis.language() == language,
                    None => true,
                })
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

            let total = matching.len() as u64;
            let offset = (u64::from(page - 1) * u64::from(limit)) as usize;
            let diagnoses: Vec<Diagnosis> = matching
                .into_iter()
                .skip(offset)
                .take(limit as usize)
                .collect();

            let diagnosis_page = DiagnosisPage::new(diagnoses, page, limit, total);

            async { Ok(diagnosis_page) }.boxed()
        }

        fn apply_localization(
            &self,
            id: &DiagnosisId,
            localization: Localization,
        ) -> BoxFuture<Result<Diagnosis, BackendError>> {
            let mut rows = self.rows.write().unwrap();

            let result = match rows.iter_mut().find(|diagnosis| diagnosis.id() == id) {
                Some(diagnosis) => {
                    diagnosis.localized_text = Some(localization.localized_text);
                    diagnosis.audio_url = Some(localization.audio_url);
                    diagnosis.language = localization.language;

                    Ok(diagnosis.clone())
                }
                None => Err(BackendError::NotFound {
                    id: id.to_string(),
                }),
            };

            async { result }.boxed()
        }
    }
}
