use thiserror::Error;

use sliceline_core::errors::PortError;

#[derive(Debug, Error)]
pub enum StorefrontError {
    #[error("storefront transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storefront returned {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("storefront response for {endpoint} could not be decoded: {detail}")]
    Decode { endpoint: String, detail: String },
}

impl From<StorefrontError> for PortError {
    fn from(error: StorefrontError) -> Self {
        PortError::transient("storefront", error.to_string())
    }
}
