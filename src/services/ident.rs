use uuid::Uuid;

/// Derive a stable identifier from an arbitrary seed string.
///
/// This is a name-based (version 5) UUID over the DNS namespace, so the same
/// seed yields the same UUID on every platform and every run. The installer
/// manifest builder uses it to derive upgrade codes and component GUIDs;
/// the `generate-uuid` CLI command exposes it directly.
///
/// The empty seed is accepted and yields the fixed value
/// `4ebd0208-8328-5d69-8c44-ec50939c0967`.
pub fn derive(seed: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, seed.as_bytes())
}

/// A fresh random (version 4) UUID, for users who want a one-off code.
pub fn random() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        assert_eq!(derive("installer-forge"), derive("installer-forge"));
        assert_ne!(derive("a"), derive("b"));
    }

    #[test]
    fn test_derive_pinned_fixture() {
        // Regression anchor: must match RFC 4122 v5 over the DNS namespace.
        assert_eq!(
            derive("MyAppName").to_string(),
            "1e1b7d41-d14f-5722-981a-7365c773d829"
        );
    }

    #[test]
    fn test_derive_empty_seed_is_defined() {
        assert_eq!(
            derive("").to_string(),
            "4ebd0208-8328-5d69-8c44-ec50939c0967"
        );
    }

    #[test]
    fn test_random_is_not_stable() {
        assert_ne!(random(), random());
    }
}
