//! The visitor the fish is currently talking to.

use riddlefish_types::protocol::PlayerProfile;
use riddlefish_types::{Attributes, Preference};
use uuid::Uuid;

/// Where a session stands in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Asking for the visitor's language.
    Enrolling,
    /// Waiting for the dialogue service to take its turn.
    AwaitingTurn,
    /// Speaking a reply or recording the visitor's answer.
    ProcessingTurn,
    /// The dialogue service ended the conversation; the fish stays quiet
    /// until the visitor leaves.
    Ended,
}

/// Orchestrator-local record of the active visitor.  Exists exactly while
/// a visitor is believed to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub attributes: Attributes,
    pub preference: Option<Preference>,
    pub turns: u32,
    pub phase: Phase,
}

impl Session {
    pub fn new(id: Uuid, attributes: Attributes) -> Self {
        Self {
            id,
            attributes,
            preference: None,
            turns: 0,
            phase: Phase::AwaitingTurn,
        }
    }

    /// Profile sent to the dialogue service; `None` until a language is
    /// known.
    pub fn profile(&self) -> Option<PlayerProfile> {
        self.preference
            .as_ref()
            .map(|p| PlayerProfile::new(self.id, &self.attributes, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riddlefish_types::Language;

    #[test]
    fn profile_needs_preference() {
        let id = Uuid::new_v4();
        let mut s = Session::new(
            id,
            Attributes {
                age_bucket: "(15-20)".into(),
                confidence: 0.8,
            },
        );
        assert!(s.profile().is_none());
        s.preference = Some(Preference {
            id,
            language: Language::Russian,
            voice: "male_01.wav".into(),
        });
        let p = s.profile().unwrap();
        assert_eq!(p.id, id);
        assert_eq!(p.age, "(15-20)");
        assert_eq!(p.lang, Language::Russian);
    }
}
