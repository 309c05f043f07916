pub mod closure;
pub mod store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("cannot move organization under one of its descendants")]
    CycleDetected,
    #[error("organization not found")]
    NotFound,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
