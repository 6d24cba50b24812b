//! Supabase (PostgREST) implementation of [`SectionStore`].
//!
//! Calls the `match_page_sections` Postgres function through the REST RPC
//! endpoint using the service role key.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::store::{MatchParams, PageSection, SectionStore};
use crate::core::errors::UpstreamError;

const MATCH_FUNCTION: &str = "match_page_sections";

pub struct SupabaseStore {
    base_url: String,
    service_role_key: String,
    client: Client,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    embedding: &'a [f32],
    #[serde(flatten)]
    params: &'a MatchParams,
}

impl SupabaseStore {
    pub fn new(base_url: String, service_role_key: String) -> Self {
        Self::with_client(Client::new(), base_url, service_role_key)
    }

    pub fn with_client(client: Client, base_url: String, service_role_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key,
            client,
        }
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, MATCH_FUNCTION)
    }
}

#[async_trait]
impl SectionStore for SupabaseStore {
    async fn match_page_sections(
        &self,
        embedding: &[f32],
        params: &MatchParams,
    ) -> Result<Vec<PageSection>, UpstreamError> {
        let res = self
            .client
            .post(self.rpc_url())
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&MatchRequest { embedding, params })
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(UpstreamError::from_response(res).await);
        }

        let sections: Vec<PageSection> = res.json().await?;
        tracing::debug!(count = sections.len(), "Matched page sections");
        Ok(sections)
    }
}
