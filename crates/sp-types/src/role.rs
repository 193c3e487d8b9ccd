//! Account roles and their canonical OAuth scope sets
//!
//! The application authenticates two independent Twitch identities: the
//! broadcaster account (channel ownership, redemptions, polls, broadcast
//! management) and the bot account (chat and moderation). Each role has a
//! fixed local callback port registered with the provider and a canonical
//! scope set requested at login. The scope sets double as a disambiguation
//! table for stored tokens whose role is not otherwise known.

use serde::{Deserialize, Serialize};

/// Scopes requested for the broadcaster account.
pub const BROADCASTER_SCOPES: &[&str] = &[
    "channel:read:subscriptions",
    "channel:read:redemptions",
    "channel:read:polls",
    "channel:read:predictions",
    "channel:read:hype_train",
    "channel:read:goals",
    "channel:manage:redemptions",
    "channel:manage:polls",
    "channel:manage:predictions",
    "channel:manage:broadcasts",
    "moderator:read:followers",
    "moderator:read:chatters",
    "chat:read",
    "chat:edit",
];

/// Scopes requested for the bot account.
pub const BOT_SCOPES: &[&str] = &[
    "chat:read",
    "chat:edit",
    "channel:moderate",
    "whispers:read",
    "whispers:edit",
];

/// One of the two independent identities the application signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Broadcaster,
    Bot,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Broadcaster, Role::Bot];

    /// Fixed local port the OAuth redirect for this role is registered on.
    /// These are registered with the provider and must not be changed without
    /// updating the Twitch application settings.
    pub fn callback_port(self) -> u16 {
        match self {
            Role::Broadcaster => 17563,
            Role::Bot => 17564,
        }
    }

    /// Canonical scope set requested when this role logs in.
    pub fn scopes(self) -> &'static [&'static str] {
        match self {
            Role::Broadcaster => BROADCASTER_SCOPES,
            Role::Bot => BOT_SCOPES,
        }
    }

    /// Scopes granted only to this role, never to the other. Used to classify
    /// a stored token by its granted scope set; scopes both roles request
    /// (chat:read, chat:edit) carry no signal and are excluded.
    pub fn exclusive_scopes(self) -> Vec<&'static str> {
        let other = self.other().scopes();
        self.scopes()
            .iter()
            .filter(|scope| !other.contains(scope))
            .copied()
            .collect()
    }

    pub fn other(self) -> Role {
        match self {
            Role::Broadcaster => Role::Bot,
            Role::Bot => Role::Broadcaster,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Broadcaster => "broadcaster",
            Role::Bot => "bot",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
