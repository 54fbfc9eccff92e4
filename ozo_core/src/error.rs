//! Error types of the generator.
//!
//! Most upstream faults are not errors for the caller at all: they collapse into [`Absent`],
//! which every query returns instead of data and which callers treat as "nothing here".

/// Why a single upstream query produced no usable data.
#[derive(thiserror::Error, Debug)]
pub enum Absent {
    /// The request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Transport(reqwest::Error),
    /// The request ran into the per-query timeout.
    #[error("request timed out")]
    Timeout,
    /// The server answered with nothing.
    #[error("empty response body")]
    EmptyBody,
    /// The server leaked scripting diagnostics into the body.
    #[error("server diagnostics in response body")]
    Diagnostic,
    /// The body is not JSON, or not a list or mapping.
    #[error("undecodable response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Absent {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Absent::Timeout
        } else {
            Absent::Transport(err)
        }
    }
}

/// Errors which abort a whole run.
#[derive(thiserror::Error, Debug)]
pub enum GeneratorError {
    /// The initial municipality listing returned nothing usable.
    #[error("could not load the list of municipalities")]
    NoMunicipalities,
}
