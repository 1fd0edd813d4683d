//! Language choice from the visitor's spoken answer to the language prompts.

use rand::seq::SliceRandom;
use riddlefish_types::Language;

use crate::voice::Transcript;

/// Fragments that identify a Dutch answer ("nederlands", "dutch", and the
/// ways the recogniser tends to mishear it).
const DUTCH_MARKERS: [&str; 4] = ["nede", "dutc", "neithe", "nethe"];

/// Derive the conversation language from a transcript.
///
/// Dutch markers win over everything else, then English, then Russian.
/// `None` means the answer was not understood and the visitor should be
/// asked again.
pub fn derive_language(transcript: &Transcript) -> Option<Language> {
    let text = transcript.text.to_lowercase();
    let detected = transcript.language.as_deref();

    if DUTCH_MARKERS.iter().any(|m| text.contains(m)) {
        Some(Language::Dutch)
    } else if text.contains("eng") || detected == Some("en") {
        Some(Language::English)
    } else if text.contains("рус") || detected == Some("ru") {
        Some(Language::Russian)
    } else {
        None
    }
}

/// Pick a synthesis voice uniformly at random.
pub fn pick_voice(voices: &[String]) -> Option<String> {
    voices.choose(&mut rand::thread_rng()).cloned()
}
