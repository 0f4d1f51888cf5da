use serde::Deserialize;

/// Info contains versioning information of the API server.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Major version of the ApiServer
    pub major: String,

    /// Minor version of the ApiServer
    pub minor: String,

    #[serde(default)]
    pub git_version: String,

    pub platform: String,
}
