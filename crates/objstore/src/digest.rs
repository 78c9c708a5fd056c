use std::io::Read;

/// Hex BLAKE3 digest of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Hex BLAKE3 digest of everything readable from `reader`, streamed in chunks.
pub fn hash_reader<R: Read>(reader: R) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(reader)?;
    Ok(hex::encode(hasher.finalize().as_bytes()))
}
