//! Short stream identifiers.

use rand::Rng;
use rand::seq::SliceRandom;

/// Lowercase letters and digits without look-alikes (no `i`, `l`, `o`, `0`, `1`, ...).
pub const KEY_CHARS: &[u8] = b"abcdefghjkmpqrstuwxyz23456789";

/// Length of the first key tried.
pub const MIN_KEY_LEN: usize = 4;

/// Draw a stream key that `taken` rejects, growing by one character per collision.
///
/// Characters are sampled without repetition, so the length is capped at
/// [`KEY_CHARS`]`.len()`.
pub fn new_key<R, F>(rng: &mut R, mut taken: F) -> String
where
    R: Rng + ?Sized,
    F: FnMut(&str) -> bool,
{
    let mut len = MIN_KEY_LEN;
    loop {
        let key: String = KEY_CHARS
            .choose_multiple(rng, len)
            .map(|&b| char::from(b))
            .collect();
        if !taken(&key) {
            return key;
        }
        len = (len + 1).min(KEY_CHARS.len());
    }
}
