/// `(major, minor)` of a dotted Minecraft version such as `1.20.4` or an
/// API version such as `1.13`. Anything after the minor component is
/// ignored; `None` when either component is missing or not numeric.
pub fn major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = leading_number(parts.next()?)?;
    let minor = leading_number(parts.next()?)?;
    Some((major, minor))
}

/// Digits at the start of a component, so `20-pre1` yields 20.
fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_and_minor() {
        assert_eq!(major_minor("1.20.4"), Some((1, 20)));
        assert_eq!(major_minor("1.13"), Some((1, 13)));
        assert_eq!(major_minor(" 1.21-rc1 "), Some((1, 21)));
    }

    #[test]
    fn rejects_incomplete_versions() {
        assert_eq!(major_minor("1"), None);
        assert_eq!(major_minor("latest"), None);
        assert_eq!(major_minor(""), None);
    }
}
