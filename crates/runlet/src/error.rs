use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "The content type of request is not supported. Please check documentation for supported formats."
    )]
    UnsupportedContentType,
    #[error("Expected code in the request data but couldn't find it there.")]
    CodeNotFound,
    #[error(
        "The JSON data submitted doesn't have required fields (or the desired type). Please verify with documentation."
    )]
    IncorrectJson,
    #[error("The multipart form data could not be parsed. Please verify the request encoding.")]
    InvalidMultipart,
    #[error("The request body must be valid UTF-8 text.")]
    InvalidUtf8,
    #[error(
        "An entrypoint file should be present with name `main.py` (or the filepath set with `x-runlet-entrypoint` header)."
    )]
    EntrypointNotFound,
    #[error("Filepath goes outside the expected directory.")]
    InvalidFilepath,
    #[error("internal error: {0}")]
    Io(#[from] io::Error),
}

impl RunError {
    pub fn title(&self) -> &'static str {
        match self {
            Self::UnsupportedContentType => "Unsupported content type",
            Self::CodeNotFound => "Code not found",
            Self::IncorrectJson => "Incorrect JSON schema",
            Self::InvalidMultipart => "Invalid multipart body",
            Self::InvalidUtf8 => "Invalid text encoding",
            Self::EntrypointNotFound => "Entrypoint not found",
            Self::InvalidFilepath => "Invalid filepath",
            Self::Io(_) => "Internal error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnsupportedContentType => 415,
            Self::Io(_) => 500,
            _ => 400,
        }
    }
}
