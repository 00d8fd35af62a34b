//! Bounded text for fixed-capacity display buffers.
//!
//! Every text field a snapshot carries has a declared capacity `L` counted in
//! bytes and including one slot for a terminator, so a field holds at most
//! `L - 1` bytes of text. Snapshots keep owned `String`s already truncated to
//! that size; [`copy_bounded`] writes one out into a caller's byte buffer.

/// Capacity of track, artist and album names.
pub const NAME_CAPACITY: usize = 100;

/// Capacity of `spotify:` URIs and ids.
pub const URI_CAPACITY: usize = 40;

/// Capacity of a device id.
pub const DEVICE_ID_CAPACITY: usize = 45;

/// Capacity of a device name.
pub const DEVICE_NAME_CAPACITY: usize = 80;

/// Capacity of a device type.
pub const DEVICE_TYPE_CAPACITY: usize = 30;

/// Truncate `text` to at most `capacity - 1` bytes.
///
/// The cut moves back to the nearest UTF-8 character boundary, so the result
/// may be a few bytes shorter than the limit but is always valid text.
pub fn truncate_to_capacity(text: &str, capacity: usize) -> String {
    let limit = capacity.saturating_sub(1);
    if text.len() <= limit {
        return text.to_string();
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Copy `src` into `dst` and null-terminate it.
///
/// At most `dst.len() - 1` bytes are copied. The rest of `dst` is zeroed, so
/// the byte at `dst.len() - 1` is always a terminator. Returns the number of
/// text bytes written. An empty `dst` is left untouched.
pub fn copy_bounded(dst: &mut [u8], src: &str) -> usize {
    let Some(limit) = dst.len().checked_sub(1) else {
        return 0;
    };

    let copied = src.len().min(limit);
    dst[..copied].copy_from_slice(&src.as_bytes()[..copied]);
    dst[copied..].fill(0);
    copied
}

/// Cut `text` just before the first occurrence of `mark`.
pub fn cut_at_first(text: &str, mark: char) -> &str {
    match text.find(mark) {
        Some(index) => &text[..index],
        None => text,
    }
}

/// Display-friendly track name.
///
/// Drops everything from the first `(`, then from the first `[`, then from
/// the first `-`, after truncating to the name capacity.
pub fn short_track_name(name: &str) -> String {
    let name = truncate_to_capacity(name, NAME_CAPACITY);
    let short = ['(', '[', '-']
        .into_iter()
        .fold(name.as_str(), cut_at_first);
    short.to_string()
}

/// Display-friendly artist name: everything before the first `&`.
pub fn short_artist_name(name: &str) -> String {
    let name = truncate_to_capacity(name, NAME_CAPACITY);
    cut_at_first(&name, '&').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_capacity() {
        assert_eq!(truncate_to_capacity("short", 40), "short");
        assert_eq!(truncate_to_capacity("abcdef", 6), "abcde");
        assert_eq!(truncate_to_capacity("abcde", 6), "abcde");
        assert_eq!(truncate_to_capacity("anything", 0), "");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // "é" is two bytes; a four byte limit would split the second one.
        let truncated = truncate_to_capacity("éée", 5);
        assert_eq!(truncated, "éé");

        let truncated = truncate_to_capacity("ééé", 4);
        assert_eq!(truncated, "é");
    }

    #[test]
    fn test_copy_bounded_terminates_every_length() {
        for src in ["", "abc", "abcd", "abcdefgh"] {
            let mut dst = [0xffu8; 5];
            let copied = copy_bounded(&mut dst, src);

            assert!(copied <= 4);
            assert_eq!(&dst[..copied], &src.as_bytes()[..copied]);
            assert_eq!(dst[4], 0);
            assert!(dst[copied..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_copy_bounded_empty_destination() {
        let mut dst: [u8; 0] = [];
        assert_eq!(copy_bounded(&mut dst, "abc"), 0);
    }

    #[test]
    fn test_short_track_name() {
        assert_eq!(short_track_name("Song Title (Remix) [Live]"), "Song Title ");
        assert_eq!(short_track_name("Song [Live] - 2011 Remaster"), "Song ");
        assert_eq!(short_track_name("Song - Radio Edit"), "Song ");
        assert_eq!(short_track_name("Plain Song"), "Plain Song");
    }

    #[test]
    fn test_short_track_name_is_capacity_bounded() {
        let long = "x".repeat(150);
        assert_eq!(short_track_name(&long).len(), NAME_CAPACITY - 1);
    }

    #[test]
    fn test_short_artist_name() {
        assert_eq!(short_artist_name("Artist & Friends"), "Artist ");
        assert_eq!(short_artist_name("Solo"), "Solo");
    }
}
