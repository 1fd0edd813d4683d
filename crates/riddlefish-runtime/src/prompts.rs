//! Locally stored clips the fish plays on its own.

use serde::{Deserialize, Serialize};

/// A clip and the words spoken in it (for lip-sync).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub clip: String,
    pub text: String,
}

impl Prompt {
    pub fn new(clip: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            clip: clip.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    English,
    Dutch,
    Repeat,
    MemoryTrouble,
}

/// The `[prompts]` section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prompts {
    pub english: Prompt,
    pub dutch: Prompt,
    pub repeat: Prompt,
    pub memory_trouble: Prompt,
    /// Played during the tail flap after a correct answer.
    pub success_sound: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            english: Prompt::new("english.wav", "English?"),
            dutch: Prompt::new("nederlands.wav", "Nederlands?"),
            repeat: Prompt::new("repeat.wav", "Sorry, could you say that again?"),
            memory_trouble: Prompt::new("memory_trouble.wav", "Oh dear, my memory is playing tricks on me."),
            success_sound: "success.wav".to_string(),
        }
    }
}

impl Prompts {
    pub fn get(&self, kind: PromptKind) -> &Prompt {
        match kind {
            PromptKind::English => &self.english,
            PromptKind::Dutch => &self.dutch,
            PromptKind::Repeat => &self.repeat,
            PromptKind::MemoryTrouble => &self.memory_trouble,
        }
    }
}
