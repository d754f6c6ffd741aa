use crate::error::IndexError;

/// Checks that `descriptor` is a non-empty single-line string.
pub fn validate(descriptor: &str) -> Result<(), IndexError> {
    if descriptor.is_empty() || descriptor.contains(['\n', '\r', '\0']) {
        return Err(IndexError::InvalidDescriptor(descriptor.to_string()));
    }
    Ok(())
}

/// Internal binary name of a class descriptor: `Lp/X$Y;` → `p/X$Y`.
///
/// Anything that is not an object descriptor is returned unchanged.
pub fn binary_name(descriptor: &str) -> &str {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(descriptor)
}

/// Simple name used for name search: `Lp/X$Y;` → `Y`, `Lp/X;` → `X`.
pub fn simple_name(descriptor: &str) -> &str {
    let name = binary_name(descriptor);
    let name = name.rsplit_once('/').map_or(name, |(_, tail)| tail);
    match name.rsplit_once('$') {
        Some((_, tail)) if !tail.is_empty() => tail,
        _ => name,
    }
}
