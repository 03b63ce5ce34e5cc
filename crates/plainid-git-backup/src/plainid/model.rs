use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityInfo {
    pub id: String,
    pub name: String,
    pub template_id: Option<String>,
}

impl IdentityInfo {
    pub fn template_ref(&self) -> &str {
        self.template_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.id.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplicationSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "authWsId")]
    pub auth_ws_id: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationDescriptor {
    pub application_id: String,
    pub display_name: String,
    pub description: String,
    pub logo_url: String,
    pub color_indication: String,
    pub asset_template_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicySummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub access_type: String,
}

impl PolicySummary {
    pub fn is_inactive(&self) -> bool {
        self.state.trim().eq_ignore_ascii_case("inactive")
    }
}

// PAA group with its sources and views embedded. Fields other than the id
// are kept as received; `Map` keeps keys sorted so output is stable.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PaaGroup {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub sources: Vec<Value>,
    #[serde(default)]
    pub views: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataItem<T> {
    pub data: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageMeta {
    pub total: Option<usize>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationListing {
    #[serde(default)]
    pub data: Vec<ApplicationSummary>,
    #[serde(default)]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyListing {
    #[serde(default)]
    pub data: Vec<PolicySummary>,
    #[serde(default)]
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetType {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
