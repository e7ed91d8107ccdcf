//! Speech synthesis fan-out.
//!
//! Converts a completed reply into an ordered stream of `ai_audio_chunk`
//! events without serializing the synthesis calls:
//!
//! ```text
//! reply text ─▸ segment ─▸ spawn synth per unit (unordered start)
//!                               │
//!                  await handles in index order ─▸ ordered chunk events
//! ```
//!
//! Synthesis latency to the external engine dominates turn latency, so
//! every unit is launched concurrently; delivery then awaits the tasks
//! strictly by ascending sequence index, because the client's audio queue
//! is FIFO and cannot reorder. A failed unit is logged and skipped — a
//! silent gap, never a turn failure.

use std::sync::Arc;
use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use tokio::sync::mpsc;

use super::{SpeechUnit, SynthesisError, Synthesizer};
use crate::events::ServerMessage;
use crate::util::now_epoch_ms;

/// Units shorter than this (after trimming) are discarded, not synthesized.
const MIN_UNIT_CHARS: usize = 2;

/// Sentence-like fragments: text up to and including terminal punctuation,
/// or a trailing fragment without any.
static SENTENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?\n]+|[^.!?\n]+$").expect("valid pattern"));

/// Split a reply into speech units.
///
/// Indices are assigned over the raw split, before the length filter, so
/// downstream ordering still reflects original positions; `is_last` marks
/// the final raw unit.
pub fn segment(text: &str) -> Vec<SpeechUnit> {
    let raw: Vec<&str> = SENTENCE_RE.find_iter(text).map(|m| m.as_str()).collect();
    let raw = if raw.is_empty() { vec![text] } else { raw };
    let unit_count = raw.len();

    raw.into_iter()
        .enumerate()
        .filter_map(|(index, fragment)| {
            let trimmed = fragment.trim();
            if trimmed.chars().count() < MIN_UNIT_CHARS {
                return None;
            }
            Some(SpeechUnit {
                index,
                text: trimmed.to_string(),
                is_last: index == unit_count - 1,
            })
        })
        .collect()
}

/// Synthesize a reply and deliver ordered audio chunk events to `out`.
///
/// All units are launched concurrently; results are delivered strictly by
/// ascending sequence index regardless of completion order. Returns the
/// number of chunks delivered.
pub async fn stream_speech(
    synthesizer: Arc<dyn Synthesizer>,
    text: &str,
    out: &mpsc::UnboundedSender<ServerMessage>,
) -> usize {
    let units = segment(text);
    if units.is_empty() {
        return 0;
    }

    // Unordered start: one task per unit, all in flight at once.
    let handles: Vec<_> = units
        .into_iter()
        .map(|unit| {
            let SpeechUnit {
                index,
                text,
                is_last,
            } = unit;
            let synthesizer = Arc::clone(&synthesizer);
            let handle: tokio::task::JoinHandle<Result<Vec<u8>, SynthesisError>> =
                tokio::spawn(async move { synthesizer.synthesize(&text).await });
            (index, is_last, handle)
        })
        .collect();

    // Ordered delivery: the consumer waits for unit i before emitting
    // unit i+1, even if i+2 finished earlier.
    let mut delivered = 0;
    for (index, is_last, handle) in handles {
        match handle.await {
            Ok(Ok(audio)) => {
                let chunk = ServerMessage::AiAudioChunk {
                    audio: base64::engine::general_purpose::STANDARD.encode(&audio),
                    index,
                    is_last,
                    timestamp: now_epoch_ms(),
                };
                if out.send(chunk).is_err() {
                    // Client gone; stop draining.
                    break;
                }
                delivered += 1;
            }
            Ok(Err(e)) => {
                tracing::warn!(index, error = %e, "speech synthesis failed for unit");
            }
            Err(e) => {
                tracing::warn!(index, error = %e, "synthesis task aborted");
            }
        }
    }
    delivered
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    #[test]
    fn segment_splits_on_sentence_punctuation() {
        let units = segment("Hi! How are you? I'm fine.");
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].text, "Hi!");
        assert_eq!(units[1].text, "How are you?");
        assert_eq!(units[2].text, "I'm fine.");
        assert_eq!(units[0].index, 0);
        assert_eq!(units[2].index, 2);
    }

    #[test]
    fn segment_marks_only_final_unit_as_last() {
        let units = segment("One. Two. Three.");
        assert_eq!(
            units.iter().filter(|u| u.is_last).count(),
            1,
            "exactly one unit is last"
        );
        assert!(units.last().unwrap().is_last);
    }

    #[test]
    fn segment_keeps_trailing_fragment_without_punctuation() {
        let units = segment("Done. And one more thing");
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].text, "And one more thing");
        assert!(units[1].is_last);
    }

    #[test]
    fn segment_splits_on_newline() {
        let units = segment("Line one\nLine two");
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].text, "Line one");
        assert_eq!(units[1].text, "Line two");
    }

    #[test]
    fn segment_drops_short_units_but_keeps_their_index() {
        // The middle fragment trims to "!" (one char) and is discarded;
        // surviving indices still reflect original positions.
        let units = segment("Hello. ! Goodbye.");
        let indices: Vec<_> = units.iter().map(|u| u.index).collect();
        assert_eq!(indices, [0, 2]);
        assert!(units[1].is_last);
    }

    #[test]
    fn segment_unpunctuated_text_is_one_unit() {
        let units = segment("just some words");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].index, 0);
        assert!(units[0].is_last);
    }

    #[test]
    fn segment_empty_text_yields_nothing() {
        assert!(segment("").is_empty());
        assert!(segment("   ").is_empty());
    }

    /// Mock engine driven by unit text of the form `uN`: unit N sleeps
    /// inversely to its index (later units finish first) and fails when N
    /// is in the fail list.
    struct StaggeredSynth {
        fail: Vec<usize>,
    }

    fn unit_number(text: &str) -> usize {
        text.trim_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .unwrap()
    }

    #[async_trait]
    impl Synthesizer for StaggeredSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
            let n = unit_number(text);
            // Reverse-staggered latency: the highest index completes first.
            tokio::time::sleep(Duration::from_millis((9 - n as u64) * 15)).await;
            if self.fail.contains(&n) {
                return Err(SynthesisError::Engine("injected failure".into()));
            }
            Ok(vec![n as u8; 4])
        }
    }

    fn collect_chunks(
        rx: &mut mpsc::UnboundedReceiver<ServerMessage>,
    ) -> Vec<(usize, bool, Vec<u8>)> {
        let mut chunks = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServerMessage::AiAudioChunk {
                    audio,
                    index,
                    is_last,
                    ..
                } => {
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(audio)
                        .unwrap();
                    chunks.push((index, is_last, bytes));
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        chunks
    }

    #[tokio::test]
    async fn delivery_is_index_ordered_despite_reversed_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(StaggeredSynth { fail: Vec::new() });

        let delivered = stream_speech(synth, "u0. u1. u2. u3. u4.", &tx).await;
        assert_eq!(delivered, 5);

        let chunks = collect_chunks(&mut rx);
        let indices: Vec<_> = chunks.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(indices, [0, 1, 2, 3, 4]);
        // Payload for unit i is the mock's i-filled buffer.
        assert_eq!(chunks[3].2, vec![3u8; 4]);
    }

    #[tokio::test]
    async fn failed_unit_is_a_silent_gap() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(StaggeredSynth { fail: vec![1] });

        let delivered = stream_speech(synth, "u0. u1. u2.", &tx).await;
        assert_eq!(delivered, 2);

        let chunks = collect_chunks(&mut rx);
        let indices: Vec<_> = chunks.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(indices, [0, 2]);
        // isLast rides on the event for the final original index.
        assert!(!chunks[0].1);
        assert!(chunks[1].1);
    }

    #[tokio::test]
    async fn all_units_failing_delivers_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(StaggeredSynth {
            fail: vec![0, 1, 2],
        });

        let delivered = stream_speech(synth, "u0. u1. u2.", &tx).await;
        assert_eq!(delivered, 0);
        assert!(collect_chunks(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn delivered_indices_are_a_subsequence_of_the_split() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(StaggeredSynth { fail: vec![0, 3] });

        stream_speech(synth, "u0. u1. u2. u3. u4. u5.", &tx).await;

        let indices: Vec<_> = collect_chunks(&mut rx).iter().map(|(i, _, _)| *i).collect();
        assert_eq!(indices, [1, 2, 4, 5]);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }
}
