use crate::Stage;
use destiny_core::ValidationError;
use persistence::PersistenceError;
use thiserror::Error;

/// Why a transition was refused. The session passed in is left untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transition needs stage {expected}, session is in {actual}")]
    WrongStage { expected: Stage, actual: Stage },
    #[error("unknown event card code: {0:?}")]
    InvalidCard(String),
    /// Setup can only be reopened before the first time jump.
    #[error("setup is closed once time has advanced (year {0})")]
    SetupClosed(u32),
    /// A decade jump would run past the final year.
    #[error("no decade left to simulate after year {0}")]
    PastFinalYear(u32),
    /// A loaded session is not one the rules could have produced.
    #[error("saved session is inconsistent: {0}")]
    CorruptSession(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not save game record: {0}")]
    Persistence(#[from] PersistenceError),
}
