use rustyline::error::ReadlineError;
use thiserror::Error;

use crate::api::ApiError;
use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Readline error: {0}")]
    Readline(#[from] ReadlineError),
}

pub type Result<T> = std::result::Result<T, CliError>;
