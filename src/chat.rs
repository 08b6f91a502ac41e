use crate::error::ChatError;
use crate::render::View;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;

/// Collaborator surface consumed from the chat platform: message primitives
/// for the router and channel primitives for the reconciler. Everything
/// behind this trait is outside the catalogue's state machine.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post a view into a channel; returns the new message id.
    async fn send_message(&self, channel_id: &str, view: &View) -> Result<String, ChatError>;
    /// Edit an existing message in place.
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        view: &View,
    ) -> Result<(), ChatError>;
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ChatError>;
    /// All counter-capable channels of the guild.
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChatError>;
    async fn create_channel(&self, name: &str) -> Result<ChannelInfo, ChatError>;
    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChatError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// REST client for the platform gateway.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    bot_token: String,
    guild_id: String,
}

impl GatewayClient {
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        let base_url = env::var("CHAT_API_BASE").context("CHAT_API_BASE not set")?;
        let bot_token = env::var("CHAT_BOT_TOKEN").context("CHAT_BOT_TOKEN not set")?;
        let guild_id = env::var("CHAT_GUILD_ID").context("CHAT_GUILD_ID not set")?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            guild_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::FORBIDDEN => Err(ChatError::PermissionDenied(format!(
                "gateway refused {}",
                resp.url()
            ))),
            s => Err(ChatError::Unknown(format!(
                "gateway returned {} for {}",
                s,
                resp.url()
            ))),
        }
    }
}

#[async_trait]
impl ChatApi for GatewayClient {
    async fn send_message(&self, channel_id: &str, view: &View) -> Result<String, ChatError> {
        #[derive(Deserialize)]
        struct MessageRef {
            id: String,
        }
        let resp = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .bearer_auth(&self.bot_token)
            .json(view)
            .send()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        let resp = Self::check(resp).await?;
        let message: MessageRef = resp
            .json()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        Ok(message.id)
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        view: &View,
    ) -> Result<(), ChatError> {
        let resp = self
            .client
            .patch(self.url(&format!("/channels/{channel_id}/messages/{message_id}")))
            .bearer_auth(&self.bot_token)
            .json(view)
            .send()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        Self::check(resp).await.map(|_| ())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ChatError> {
        let resp = self
            .client
            .delete(self.url(&format!("/channels/{channel_id}/messages/{message_id}")))
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        Self::check(resp).await.map(|_| ())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChatError> {
        let resp = self
            .client
            .get(self.url(&format!("/guilds/{}/channels", self.guild_id)))
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        let resp = Self::check(resp).await?;
        resp.json()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))
    }

    async fn create_channel(&self, name: &str) -> Result<ChannelInfo, ChatError> {
        let resp = self
            .client
            .post(self.url(&format!("/guilds/{}/channels", self.guild_id)))
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        let resp = Self::check(resp).await?;
        resp.json()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))
    }

    async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), ChatError> {
        let resp = self
            .client
            .patch(self.url(&format!("/channels/{channel_id}")))
            .bearer_auth(&self.bot_token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| ChatError::Unknown(e.to_string()))?;
        Self::check(resp).await.map(|_| ())
    }
}
