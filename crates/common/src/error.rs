use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown {kind}: {value}")]
    UnknownName { kind: &'static str, value: String },
}

impl Error {
    #[must_use]
    pub fn unknown_name(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownName {
            kind,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
