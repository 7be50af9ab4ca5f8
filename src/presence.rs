use crate::config::PresenceConfig;
use crate::error::NotifyError;
use async_trait::async_trait;
use dashmap::DashSet;
use parking_lot::RwLock;
use serenity::all::{ActivityData, GuildId};
use serenity::prelude::Context;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Playing,
    Idle,
}

impl Presence {
    pub fn as_str(self) -> &'static str {
        match self {
            Presence::Playing => "playing",
            Presence::Idle => "idle",
        }
    }
}

/// Whatever shows the status to the outside world.
#[async_trait]
pub trait PresenceSink: Send + Sync {
    async fn set_presence(&self, presence: Presence) -> Result<(), NotifyError>;
}

/// Turns per-guild start/advance/stop transitions into one external status.
/// The bot has a single activity, so it reads "playing" while any guild is.
pub struct PresenceProjector {
    sink: Arc<dyn PresenceSink>,
    playing: DashSet<GuildId>,
    /// Held from the set update until the sink has the result, so updates
    /// reach the sink in the order the set changed.
    publishing: Mutex<()>,
}

impl PresenceProjector {
    pub fn new(sink: Arc<dyn PresenceSink>) -> Self {
        Self {
            sink,
            playing: DashSet::new(),
            publishing: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Presence {
        if self.playing.is_empty() {
            Presence::Idle
        } else {
            Presence::Playing
        }
    }

    pub async fn playing(&self, guild: GuildId) {
        let _order = self.publishing.lock().await;
        self.playing.insert(guild);
        self.publish().await;
    }

    pub async fn idle(&self, guild: GuildId) {
        let _order = self.publishing.lock().await;
        self.playing.remove(&guild);
        self.publish().await;
    }

    /// Push the current status again, e.g. after the gateway (re)connects.
    pub async fn republish(&self) {
        let _order = self.publishing.lock().await;
        self.publish().await;
    }

    async fn publish(&self) {
        let presence = self.current();
        if let Err(e) = self.sink.set_presence(presence).await {
            tracing::debug!(error = %e, presence = presence.as_str(), "presence update dropped");
        }
    }
}

/// Sets the bot's Discord activity. Until the gateway is ready there is no
/// context to send through and updates are dropped.
pub struct DiscordPresence {
    ctx: RwLock<Option<Context>>,
    texts: PresenceConfig,
}

impl DiscordPresence {
    pub fn new(texts: PresenceConfig) -> Self {
        Self {
            ctx: RwLock::new(None),
            texts,
        }
    }

    pub fn attach(&self, ctx: Context) {
        *self.ctx.write() = Some(ctx);
    }
}

#[async_trait]
impl PresenceSink for DiscordPresence {
    async fn set_presence(&self, presence: Presence) -> Result<(), NotifyError> {
        let ctx = self.ctx.read().clone().ok_or(NotifyError::NotReady)?;
        let text = match presence {
            Presence::Playing => &self.texts.playing,
            Presence::Idle => &self.texts.idle,
        };
        ctx.set_activity(Some(ActivityData::playing(text.as_str())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPresence;

    #[tokio::test]
    async fn reports_playing_while_any_guild_plays() {
        let sink = Arc::new(RecordingPresence::default());
        let projector = PresenceProjector::new(sink.clone());
        let (a, b) = (GuildId::new(1), GuildId::new(2));

        projector.playing(a).await;
        projector.playing(b).await;
        projector.idle(a).await;
        assert_eq!(projector.current(), Presence::Playing);

        projector.idle(b).await;
        assert_eq!(projector.current(), Presence::Idle);
        assert_eq!(
            sink.history(),
            vec![Presence::Playing, Presence::Playing, Presence::Playing, Presence::Idle]
        );
    }

    #[tokio::test]
    async fn overlapping_updates_land_in_order() {
        let sink = Arc::new(RecordingPresence::default());
        let projector = PresenceProjector::new(sink.clone());
        let (a, b) = (GuildId::new(1), GuildId::new(2));
        projector.playing(a).await;

        // The idle update is slow to reach the sink while another guild
        // starts right behind it.
        sink.delay_next(&[4, 0]);
        tokio::join!(projector.idle(a), async {
            tokio::task::yield_now().await;
            projector.playing(b).await;
        });

        assert_eq!(projector.current(), Presence::Playing);
        assert_eq!(sink.last(), Some(Presence::Playing));
    }

    #[tokio::test]
    async fn notify_failures_are_swallowed() {
        let sink = Arc::new(RecordingPresence::failing());
        let projector = PresenceProjector::new(sink.clone());
        projector.playing(GuildId::new(3)).await;
        assert_eq!(projector.current(), Presence::Playing);
        assert!(sink.history().is_empty());
    }

    #[tokio::test]
    async fn discord_presence_waits_for_gateway() {
        let presence = DiscordPresence::new(PresenceConfig::default());
        let result = presence.set_presence(Presence::Idle).await;
        assert!(matches!(result, Err(NotifyError::NotReady)));
    }
}
