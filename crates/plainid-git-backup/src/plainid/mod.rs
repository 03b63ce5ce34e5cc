pub mod client;
pub mod model;
pub mod paging;

pub use client::PlainIdClient;
pub use model::{
    ApplicationDescriptor, ApplicationSummary, EnvironmentInfo, IdentityInfo, PaaGroup,
    PolicySummary, WorkspaceInfo,
};
pub use paging::Page;

use crate::error::Result;

pub trait Inventory {
    fn list_environments(&self) -> Result<Vec<EnvironmentInfo>>;
    fn list_workspaces(&self, env_id: &str) -> Result<Vec<WorkspaceInfo>>;
    fn list_identities(&self, env_id: &str) -> Result<Vec<IdentityInfo>>;
}

pub trait ConfigSource: Inventory {
    fn fetch_identity_template(&self, env_id: &str, identity_id: &str) -> Result<Vec<u8>>;
    fn fetch_paa_groups(&self, env_id: &str) -> Result<Vec<PaaGroup>>;
    fn fetch_asset_template_ids(&self, ws_id: &str) -> Result<Vec<String>>;
    fn fetch_asset_template(&self, env_id: &str, template_id: &str) -> Result<Vec<u8>>;
    fn list_applications_page(
        &self,
        env_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ApplicationSummary>>;
    fn fetch_application(&self, env_id: &str, app_id: &str) -> Result<ApplicationDescriptor>;
    fn list_policies_page(
        &self,
        env_id: &str,
        app_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PolicySummary>>;
    fn fetch_policy(&self, env_id: &str, ws_id: &str, policy_id: &str) -> Result<Vec<u8>>;
    fn fetch_api_mapper_set(&self, env_id: &str, app_id: &str) -> Result<Vec<u8>>;
}
