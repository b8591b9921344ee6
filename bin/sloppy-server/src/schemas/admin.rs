use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct CredentialStatus {
    pub name: String,
    pub configured: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    pub reloaded: bool,
}

/// Body of `PUT /admin/credentials`. The value is write-only.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCredentialRequest {
    #[schema(example = "HF_TOKEN")]
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReleaseResponse {
    /// Whether an active-task marker was held and is now cleared.
    pub released: bool,
}
