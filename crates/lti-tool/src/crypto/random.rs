// Random identifier generation for states, nonces, and launch ids.

use rand::Rng;

/// Character set: a-z, A-Z, 0-9, -, _ (url-safe, 64 characters).
const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

/// Generate a random url-safe string of the specified length.
pub fn generate_random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// State parameter for the OIDC login flow.
pub fn generate_state() -> String {
    generate_random_string(43)
}

/// Nonce embedded in the platform's id_token.
pub fn generate_nonce() -> String {
    generate_random_string(43)
}

/// Opaque launch id under which a validated launch is cached.
pub fn generate_launch_id() -> String {
    format!("lti1p3-launch-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_length() {
        assert_eq!(generate_random_string(0).len(), 0);
        assert_eq!(generate_random_string(43).len(), 43);
        assert_eq!(generate_random_string(128).len(), 128);
    }

    #[test]
    fn test_valid_characters() {
        let s = generate_random_string(1000);
        for c in s.chars() {
            assert!(
                c.is_ascii_alphanumeric() || c == '-' || c == '_',
                "Invalid character: {c}"
            );
        }
    }

    #[test]
    fn test_uniqueness() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_nonce(), generate_nonce());
    }

    #[test]
    fn test_launch_id_prefix() {
        assert!(generate_launch_id().starts_with("lti1p3-launch-"));
    }
}
