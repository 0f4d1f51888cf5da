use std::collections::BTreeMap;

use serde::Deserialize;

/// ObjectMeta is metadata that all persisted resources must have, which includes
/// all objects users must create.
///
/// NOTE: Only necessary fields are present here.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    pub namespace: Option<String>,

    pub uid: String,

    pub resource_version: Option<String>,

    pub labels: BTreeMap<String, String>,

    pub annotations: BTreeMap<String, String>,

    /// RFC 3339 timestamp, as sent by the API server.
    pub creation_timestamp: Option<String>,
}

/// ListMeta describes metadata that synthetic resources must have, including
/// lists and various status objects.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListMeta {
    pub resource_version: Option<String>,

    #[serde(rename = "continue")]
    pub continue_: Option<String>,

    pub remaining_item_count: Option<i64>,
}
