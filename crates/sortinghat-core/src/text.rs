//! Free-text normalization applied before comparison and storage.

use unicode_normalization::UnicodeNormalization;

/// Decompose `s` (NFKD) and drop every char outside printable ASCII.
///
/// Accented letters survive as their base letter: `"Zoë"` becomes `"Zoe"`.
pub fn strip_unicode(s: &str) -> String {
  s.nfkd().filter(|c| (' '..'\u{7f}').contains(c)).collect()
}

/// [`strip_unicode`] lifted over an optional value.
pub fn strip_unicode_opt(s: Option<&str>) -> Option<String> {
  s.map(strip_unicode)
}

/// Remove NUL chars, then keep the longest prefix of at most `size` bytes
/// that ends on a char boundary.
pub fn trunc_to_bytes(s: &str, size: usize) -> String {
  let cleaned = s.replace('\0', "");
  if cleaned.len() <= size {
    return cleaned;
  }
  let mut end = size;
  while !cleaned.is_char_boundary(end) {
    end -= 1;
  }
  cleaned[..end].to_owned()
}
