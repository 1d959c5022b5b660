use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("http error calling cloud provider: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cloud provider returned an error response: {status} {body}")]
    ProviderError { status: u16, body: String },

    #[error("cloud provider credentials missing for {0}")]
    MissingCredentials(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported cloud provider: {0:?}")]
    Unsupported(asc_common::Cloud),
}

pub type Result<T> = std::result::Result<T, CloudError>;
