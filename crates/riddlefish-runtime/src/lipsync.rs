//! Mouth movement synchronised to a spoken clip.
//!
//! The clip duration is spread over the words of its transcript in
//! proportion to their syllable counts.  For each word the mouth opens,
//! stays open for the word's share minus [`OPEN_TIME`], then closes.

use std::time::Duration;

use riddlefish_types::{FishError, PuppetCommand};
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::puppet_link::Puppet;
use crate::voice::Speaker;

/// Time the mouth motor needs to open.
pub const OPEN_TIME: Duration = Duration::from_millis(600);

const VOWELS: &str = "aeiouy";

/// Vowel-group syllable estimate; never less than one.
pub fn count_syllables(word: &str) -> usize {
    let mut count = 0;
    let mut previous_vowel = false;
    for c in word.chars().flat_map(char::to_lowercase) {
        let vowel = VOWELS.contains(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }
    count.max(1)
}

/// Share of `total` spoken on each word of `text`.
pub fn word_timing(text: &str, total: Duration) -> Vec<Duration> {
    let counts: Vec<usize> = text.split_whitespace().map(count_syllables).collect();
    let syllables: usize = counts.iter().sum();
    if syllables == 0 {
        return Vec::new();
    }
    let per_syllable = total.as_secs_f64() / syllables as f64;
    counts
        .into_iter()
        .map(|n| Duration::from_secs_f64(per_syllable * n as f64))
        .collect()
}

/// Move the mouth once per word.  Stops early, with the mouth closed, once
/// `playback_end` has passed.
pub async fn move_mouth<P: Puppet + ?Sized>(puppet: &mut P, timing: &[Duration], playback_end: Instant) {
    for &word in timing {
        if Instant::now() >= playback_end {
            debug!("clip finished before the mouth did");
            puppet.perform(PuppetCommand::MouthClose).await;
            break;
        }
        puppet.perform(PuppetCommand::MouthOpen).await;
        if let Some(hold) = word.checked_sub(OPEN_TIME) {
            sleep(hold).await;
        }
        puppet.perform(PuppetCommand::MouthClose).await;
    }
}

/// Play `clip` while lip-syncing `text`.  Returns once the clip has ended.
pub async fn speak<P: Puppet + ?Sized>(
    puppet: &mut P,
    speaker: &dyn Speaker,
    clip: Vec<u8>,
    text: &str,
) -> Result<(), FishError> {
    let duration = speaker.duration(&clip)?;
    let timing = word_timing(text, duration);
    let playback_end = Instant::now() + duration;
    let (played, ()) = tokio::join!(speaker.play(clip), move_mouth(puppet, &timing, playback_end));
    played
}
