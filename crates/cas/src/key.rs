use strata_primitives::Hash;

/// Prefix for raw chunk bytes.
pub const CHUNK_PREFIX: &str = "chunks";
/// Prefix for canonical `ObjectInfo` records.
pub const METADATA_PREFIX: &str = "metadata";

/// Two-level fanout key: `<prefix>/<hh>/<hh>/<64-hex>`.
///
/// The first and second byte of the digest spread keys across 65536
/// directory-like prefixes so no single listing grows unbounded.
fn fanout_key(prefix: &str, hash: &Hash) -> String {
    let hex = hash.to_hex();
    format!("{prefix}/{}/{}/{hex}", &hex[..2], &hex[2..4])
}

#[must_use]
pub fn chunk_key(address: &Hash) -> String {
    fanout_key(CHUNK_PREFIX, address)
}

#[must_use]
pub fn metadata_key(root: &Hash) -> String {
    fanout_key(METADATA_PREFIX, root)
}
