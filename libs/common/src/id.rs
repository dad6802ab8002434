use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = gatehouse_common::id::prefixed_ulid("ch");
/// assert!(id.starts_with("ch_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Gateway delivery channel (one per connection attempt).
    pub const CHANNEL: &str = "ch";
    /// Audit correlation id attached to validation requests.
    pub const VALIDATION: &str = "val";
}
