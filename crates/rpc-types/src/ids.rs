//! Correlation identifier generation.
//!
//! The bus only relies on ids being unique among the calls in flight on one
//! bus. The format is otherwise unconstrained.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of generated correlation ids.
pub const DEFAULT_ID_LENGTH: usize = 16;

/// Produces sufficiently unique strings of a requested length.
pub trait IdGenerator: Send + Sync {
    /// Generate a new id of exactly `length` characters.
    fn generate(&self, length: usize) -> String;
}

/// Random alphanumeric ids from the thread-local RNG.
///
/// At the default length of 16 there are 62^16 possible ids, so collisions
/// between concurrent calls are not a practical concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self, length: usize) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    }
}
