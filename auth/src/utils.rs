//! Utility functions for identity synchronization.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Generate a random local secret.
///
/// Provider-linked accounts never log in with it, but every row needs a
/// non-empty credential.
///
/// # Examples
///
/// ```
/// use identity_bridge::utils::generate_local_secret;
///
/// let secret = generate_local_secret(32);
/// assert_eq!(secret.len(), 32);
/// assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
#[must_use]
pub fn generate_local_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len.max(1))
        .map(char::from)
        .collect()
}

/// Pick the local username for a provider profile.
///
/// Uses the profile name; falls back to the local part of the email when the
/// provider sends a blank name.
///
/// # Examples
///
/// ```
/// use identity_bridge::utils::username_from_profile;
///
/// assert_eq!(username_from_profile("Ann", "a@x.com"), "Ann");
/// assert_eq!(username_from_profile("  ", "ann.lee@x.com"), "ann.lee");
/// ```
#[must_use]
pub fn username_from_profile(name: &str, email: &str) -> String {
    let name = name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    email
        .split('@')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
