//! Protocol versioning for Beacon.

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u8 = 1;

/// Whether a client asking for `requested` can be served.
///
/// Clients that do not name a version get the current one.
#[must_use]
pub fn supports(requested: Option<u8>) -> bool {
    requested.map_or(true, |version| version == PROTOCOL_VERSION)
}
