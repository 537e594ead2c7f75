//! Message id generation.
//!
//! Ids are lowercase ULIDs: 48-bit millisecond timestamp plus randomness,
//! monotonic within a process. Queue scans sort file names lexically, so the
//! id doubles as the creation-order key.

use std::sync::{Mutex, OnceLock};
use ulid::{Generator, Ulid};

static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();

/// Next message id.
pub fn next_message_id() -> String {
    let generator = GENERATOR.get_or_init(|| Mutex::new(Generator::new()));
    let ulid = {
        let mut generator = generator.lock().expect("id generator poisoned");
        // Overflow of the random component within one millisecond is the only
        // failure mode; a fresh ULID re-seeds it.
        generator.generate().unwrap_or_else(|_| Ulid::new())
    };
    ulid.to_string().to_ascii_lowercase()
}
