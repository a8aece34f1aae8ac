//! Identifier generation for stored records

use bech32::Bech32m;
use uuid7::uuid7;

/// Human-readable prefix for achievement reference ids.
pub const REFERENCE_HRP: &str = "ach";
/// Human-readable prefix for achievement detail ids.
pub const DETAIL_HRP: &str = "det";

// construct a unique time-ordered id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let reference = new_uuid_to_bech32(REFERENCE_HRP).unwrap();
        let detail = new_uuid_to_bech32(DETAIL_HRP).unwrap();

        assert!(reference.starts_with("ach1"));
        assert!(detail.starts_with("det1"));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}
