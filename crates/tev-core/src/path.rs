//! Image identifier normalization.
//!
//! tev rewrites the alternate path separator of its host platform into the
//! primary one before it stores an image name. A client that created
//! `"renders/a.exr"` on Windows would otherwise fail to address the image it
//! made, because tev knows it as `"renders\a.exr"`. Every identifier sent by
//! this crate goes through [`normalize`] first.

/// The separator tev stores names with on this platform.
pub const CANONICAL_SEPARATOR: char = std::path::MAIN_SEPARATOR;

/// The separator tev rewrites, if the platform has one.
#[cfg(windows)]
pub const ALTERNATE_SEPARATOR: Option<char> = Some('/');

/// The separator tev rewrites, if the platform has one.
#[cfg(not(windows))]
pub const ALTERNATE_SEPARATOR: Option<char> = None;

/// Rewrites `name` the way tev does on this platform.
///
/// On platforms without an alternate separator this is the identity.
///
/// # Examples
///
/// ```rust
/// use tev_core::path::normalize;
///
/// let once = normalize("renders/frame.exr");
/// assert_eq!(normalize(&once), once);
/// ```
pub fn normalize(name: &str) -> String {
    match ALTERNATE_SEPARATOR {
        Some(alternate) => normalize_with(name, alternate, CANONICAL_SEPARATOR),
        None => name.to_string(),
    }
}

/// Replaces every `alternate` in `name` with `canonical`.
pub fn normalize_with(name: &str, alternate: char, canonical: char) -> String {
    name.chars()
        .map(|c| if c == alternate { canonical } else { c })
        .collect()
}
