use crate::ApiError;

#[derive(Debug)]
pub enum ServiceError {
    NotFound(&'static str),
    Database(sqlx::Error),
    Serialization(serde_json::Error),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            ServiceError::Database(db_err) => ApiError::internal(&db_err),
            ServiceError::Serialization(json_err) => ApiError::internal(&json_err),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}
