use anyhow::Result;
use redis::{AsyncCommands, Client};
use serde::Serialize;

use crate::contracts::InvitationRespondedEvent;

pub const INVITATIONS_RESPONDED_CHANNEL: &str = "invitations.responded";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }

    pub async fn publish_responded(&self, event: &InvitationRespondedEvent) -> Result<()> {
        self.publish_json(INVITATIONS_RESPONDED_CHANNEL, event).await
    }
}
