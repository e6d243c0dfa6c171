use rand::Rng;

/// Length of a minted handle in characters.
pub const HANDLE_LEN: usize = 48;

/// Mint a handle: 16 random bytes followed by the big-endian `sequence`, hex-encoded.
///
/// The random half makes handles unguessable. The sequence half comes from a
/// counter that never repeats for the lifetime of the store, so a handle is
/// never handed out twice even after the record it named has been purged.
pub fn mint(sequence: u64) -> String {
    let mut entropy = [0u8; 16];
    rand::thread_rng().fill(&mut entropy);
    let mut handle = hex::encode(entropy);
    handle.push_str(&hex::encode(sequence.to_be_bytes()));
    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_shape() {
        let h = mint(1);
        assert_eq!(h.len(), HANDLE_LEN);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(h.ends_with("0000000000000001"));
    }

    #[test]
    fn same_sequence_still_differs() {
        assert_ne!(mint(7), mint(7));
    }
}
