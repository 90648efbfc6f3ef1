//! Utterance reassembly integration tests
//!
//! Exercises the fragment flow the way recognizers drive it: fragments
//! arriving concurrently and out of order, filtered before buffering.

use std::sync::Arc;
use std::time::Duration;

use parley_gateway::{ReassemblyConfig, TranscriptFilter, UtteranceReassembler};

fn fast_config() -> ReassemblyConfig {
    ReassemblyConfig {
        gap_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn concurrent_out_of_order_fragments_reassemble() {
    let reassembler = Arc::new(UtteranceReassembler::with_config(fast_config()));

    let mut uploads = Vec::new();
    for (index, text, delay_ms) in [
        (2u32, "before sundown", 30u64),
        (0, "bring the ore", 10),
        (1, "to the forge", 50),
    ] {
        let reassembler = Arc::clone(&reassembler);
        uploads.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            reassembler.add_fragment("utt-1", index, text, f64::from(index) + 40.0);
        }));
    }
    for upload in uploads {
        upload.await.unwrap();
    }

    reassembler.await_contiguous("utt-1").await;
    let (text, last_ms) = reassembler.finalize("utt-1");

    assert_eq!(text, "bring the ore to the forge before sundown");
    assert_eq!(last_ms, Some(42.0));
}

#[tokio::test]
async fn gap_that_never_fills_times_out() {
    let reassembler = UtteranceReassembler::with_config(fast_config());
    reassembler.add_fragment("utt-2", 0, "bring the ore", 40.0);
    reassembler.add_fragment("utt-2", 3, "before sundown", 41.0);

    let waited = tokio::time::Instant::now();
    reassembler.await_contiguous("utt-2").await;
    assert!(waited.elapsed() >= Duration::from_millis(200));

    let (text, _) = reassembler.finalize("utt-2");
    assert_eq!(text, "bring the ore before sundown");
}

#[tokio::test]
async fn filtered_fragments_never_enter_a_session() {
    let reassembler = UtteranceReassembler::new();
    let filter = TranscriptFilter::new();

    for (index, transcript) in [
        (0u32, "Meet me at the gate"),
        (1, "Thanks for watching."),
        (2, "at midnight"),
    ] {
        if filter.is_hallucination(transcript) {
            continue;
        }
        reassembler.add_fragment("utt-3", index, transcript, 35.0);
    }

    let indices: Vec<u32> = reassembler.indices("utt-3").into_iter().collect();
    assert_eq!(indices, vec![0, 2]);

    let (text, _) = reassembler.finalize("utt-3");
    assert_eq!(text, "Meet me at the gate at midnight");
}

#[tokio::test]
async fn sessions_are_independent_and_consumed_once() {
    let reassembler = UtteranceReassembler::new();
    reassembler.add_fragment("player-a", 0, "hello", 10.0);
    reassembler.add_fragment("player-b", 0, "goodbye", 11.0);

    let (a, _) = reassembler.finalize("player-a");
    assert_eq!(a, "hello");

    // player-b is untouched, player-a is gone
    assert!(reassembler.indices("player-a").is_empty());
    let (b, _) = reassembler.finalize("player-b");
    assert_eq!(b, "goodbye");

    let (again, ms) = reassembler.finalize("player-a");
    assert_eq!(again, "");
    assert!(ms.is_none());
}
