use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub(crate) const EXAM_CODE_LEN: usize = 6;

/// Normalizes a typed exam code: surrounding whitespace dropped, upper-cased,
/// anything outside `A-Z0-9` removed.
pub fn sanitize_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

/// Draws a code that does not collide with any of `existing` after sanitizing.
pub(crate) fn generate_unique_code<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    let taken: std::collections::HashSet<String> =
        existing.into_iter().map(sanitize_code).collect();

    loop {
        let candidate = generate_code(EXAM_CODE_LEN);
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}

fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut output = String::with_capacity(len);
    for _ in 0..len {
        let index = rng.gen_range(0..ALPHABET.len());
        output.push(ALPHABET[index] as char);
    }
    output
}
