pub mod codec;
pub mod store;

// Re-exports for convenience
pub use store::{RelayStore, StoreError};

/// Push destinations in the order they appear in a generated application block
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Destination {
    Youtube,
    Facebook,
    Twitch,
}

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::Youtube,
        Destination::Facebook,
        Destination::Twitch,
    ];

    /// Fixed ingest URL prefix the stream key is appended to.
    ///
    /// Facebook goes through a local stunnel hop on 19350; nginx-rtmp cannot
    /// speak RTMPS directly. Twitch uses the ams03 ingest.
    pub fn push_prefix(self) -> &'static str {
        match self {
            Destination::Youtube => "rtmp://a.rtmp.youtube.com/live2/",
            Destination::Facebook => "rtmp://localhost:19350/rtmp/",
            Destination::Twitch => "rtmp://ams03.contribute.live-video.net/app/",
        }
    }
}

/// Per-destination push state
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PushRule {
    pub enabled: bool,
    pub stream_key: String,
}

/// One operator's relay configuration, a push rule per destination
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RelayConfig {
    pub youtube: PushRule,
    pub facebook: PushRule,
    pub twitch: PushRule,
}

impl RelayConfig {
    pub fn rule(&self, destination: Destination) -> &PushRule {
        match destination {
            Destination::Youtube => &self.youtube,
            Destination::Facebook => &self.facebook,
            Destination::Twitch => &self.twitch,
        }
    }

    pub fn rule_mut(&mut self, destination: Destination) -> &mut PushRule {
        match destination {
            Destination::Youtube => &mut self.youtube,
            Destination::Facebook => &mut self.facebook,
            Destination::Twitch => &mut self.twitch,
        }
    }
}
