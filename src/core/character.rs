//! Companion characters and their backend-pushed state
//!
//! Two companions are built in. The backend keys every endpoint by
//! `character_id`, and pushes [`CharacterState`] snapshots that the client
//! replaces wholesale; there is no partial merge.

use std::sync::{Arc, Mutex};

use serde::Deserialize;

/// Static descriptor for one of the built-in companions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub nickname: &'static str,
    pub emoji: &'static str,
}

pub const CHARACTERS: [CharacterProfile; 2] = [
    CharacterProfile {
        id: "naruen",
        name: "Song Naruen",
        nickname: "Naru",
        emoji: "🐰",
    },
    CharacterProfile {
        id: "narin",
        name: "Song Narin",
        nickname: "Rin",
        emoji: "💎",
    },
];

pub const DEFAULT_CHARACTER_ID: &str = "naruen";

pub fn find_character(id: &str) -> Option<&'static CharacterProfile> {
    CHARACTERS.iter().find(|c| c.id == id)
}

/// Shared cell holding the currently selected character id.
///
/// The sibling channel reads this at each connection attempt, so a
/// character switch takes effect on the next reconnect without restarting
/// the manager.
#[derive(Debug, Clone)]
pub struct ActiveCharacter {
    inner: Arc<Mutex<String>>,
}

impl ActiveCharacter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(id.into())),
        }
    }

    pub fn get(&self) -> String {
        self.inner.lock().expect("active character lock").clone()
    }

    pub fn set(&self, id: impl Into<String>) {
        *self.inner.lock().expect("active character lock") = id.into();
    }
}

/// Snapshot of a companion's simulated internals, pushed by the backend via
/// `state` events and `GET /api/status`.
///
/// Treated as opaque by the session engine: each snapshot replaces the
/// previous one in full.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CharacterState {
    #[serde(default)]
    pub character: CharacterIdentity,
    #[serde(default)]
    pub hormone: Option<HormoneLevels>,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub sleep: SleepState,
    #[serde(default)]
    pub activity: ActivityState,
    /// Satiety, 0-100.
    #[serde(default)]
    pub hunger: f64,
    /// 0-100.
    #[serde(default)]
    pub fitness: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CharacterIdentity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HormoneLevels {
    #[serde(default)]
    pub dopamine: f64,
    #[serde(default)]
    pub serotonin: f64,
    #[serde(default)]
    pub adrenaline: f64,
    #[serde(default)]
    pub cortisol: f64,
    #[serde(default)]
    pub oxytocin: f64,
    #[serde(default)]
    pub melatonin: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SleepState {
    #[serde(default)]
    pub is_sleeping: bool,
    /// 0-3.
    #[serde(default)]
    pub drowsiness: u8,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ActivityState {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}
