//! crates/dechat_core/src/codegen.rs
//!
//! Generates candidate phrase triples for new rooms: two room-identifying
//! phrases plus a host password, drawn from a fixed dictionary of short,
//! easy-to-remember words. The room-identifying pair is checked for
//! uniqueness against the document store before being handed out.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use crate::identity::derive_room_id;
use crate::ports::DocumentStore;

/// Dictionary of common, easy-to-remember words for code generation.
const WORD_LIST: [&str; 52] = [
    "apple", "beach", "cloud", "dance", "eagle", "flame", "grape", "honey", "igloo", "jolly",
    "kiwis", "lemon", "mango", "night", "ocean", "piano", "queen", "river", "sugar", "tiger",
    "umbra", "vivid", "water", "xenon", "yacht", "zebra", "amber", "bloom", "coral", "dunes",
    "earth", "frost", "guide", "heart", "ivory", "jewel", "karma", "lunar", "mocha", "noble",
    "oasis", "pluto", "quill", "royal", "stone", "tulip", "unity", "vault", "waves", "xeric",
    "yield", "zesty",
];

/// The default bound on generation attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 25;

/// A freshly generated room code. The first two phrases identify the room;
/// the host password is not collision-checked.
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub first_phrase: String,
    pub second_phrase: String,
    pub host_password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Exhausted {0} attempts without finding an unused room code")]
    Exhausted(usize),
}

/// Draws candidate triples and verifies room-identifier uniqueness.
pub struct CodeGenerator {
    documents: Arc<dyn DocumentStore>,
    max_attempts: usize,
}

impl CodeGenerator {
    pub fn new(documents: Arc<dyn DocumentStore>, max_attempts: usize) -> Self {
        Self {
            documents,
            max_attempts,
        }
    }

    /// Generates a phrase triple whose derived room identifier is not in use.
    ///
    /// A registry-lookup failure counts as "not unique": the candidate is
    /// discarded and the attempt consumed, never resolved toward a possibly
    /// colliding code. Attempts are bounded, so a store outage terminates in
    /// [`GenerateError::Exhausted`] instead of hanging the caller.
    pub async fn generate(&self) -> Result<GeneratedCode, GenerateError> {
        for attempt in 1..=self.max_attempts {
            let words = {
                let mut rng = rand::thread_rng();
                draw_distinct_words(&mut rng, 3)
            };

            let candidate = derive_room_id(words[0], words[1]);
            match self.documents.room_exists(&candidate).await {
                Ok(false) => {
                    return Ok(GeneratedCode {
                        first_phrase: words[0].to_owned(),
                        second_phrase: words[1].to_owned(),
                        host_password: words[2].to_owned(),
                    })
                }
                Ok(true) => {
                    debug!(room = %candidate, attempt, "room code already taken, redrawing");
                }
                Err(error) => {
                    warn!(%error, attempt, "uniqueness check failed, treating candidate as taken");
                }
            }
        }
        Err(GenerateError::Exhausted(self.max_attempts))
    }
}

/// Draws `count` distinct words by uniform index into a shrinking candidate
/// set. With the full dictionary this always yields `count` words.
fn draw_distinct_words<R: Rng>(rng: &mut R, count: usize) -> Vec<&'static str> {
    let mut remaining: Vec<&'static str> = WORD_LIST.to_vec();
    let mut drawn = Vec::with_capacity(count);
    while drawn.len() < count && !remaining.is_empty() {
        let index = rng.gen_range(0..remaining.len());
        drawn.push(remaining.swap_remove(index));
    }
    drawn
}
