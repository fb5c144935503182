//! CID (Content Identifier) utilities
//!
//! Creates content-addressed identifiers using SHA-256, the fixed hasher
//! every replica of a database must agree on for convergence.

use cid::{Cid, Version};
use multihash_codetable::{Code, MultihashDigest};

/// IPLD codecs used by this crate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CidCodec {
    /// Raw binary data (0x55) — used for opaque leaf values
    Raw,
    /// DAG-CBOR (0x71) — used for events and prolly tree nodes
    DagCbor,
}

impl CidCodec {
    /// Get the multicodec code
    pub fn code(&self) -> u64 {
        match self {
            CidCodec::Raw => 0x55,
            CidCodec::DagCbor => 0x71,
        }
    }

    /// Parse from multicodec code
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x55 => Some(CidCodec::Raw),
            0x71 => Some(CidCodec::DagCbor),
            _ => None,
        }
    }
}

impl Default for CidCodec {
    fn default() -> Self {
        CidCodec::Raw
    }
}

/// Create a CID from data using SHA-256
pub fn create_cid(data: &[u8], codec: CidCodec) -> Cid {
    let multihash = Code::Sha2_256.digest(data);
    Cid::new(Version::V1, codec.code(), multihash).expect("valid CID construction")
}

/// Verify that data matches a CID
pub fn verify_cid(data: &[u8], cid: &Cid) -> bool {
    let expected = create_cid(data, CidCodec::from_code(cid.codec()).unwrap_or_default());
    expected == *cid
}

/// Parse a CID from a string
pub fn parse_cid(s: &str) -> Result<Cid, crate::BlockStoreError> {
    s.parse()
        .map_err(|e: cid::Error| crate::BlockStoreError::InvalidCid(e.to_string()))
}

/// Get the codec tag of a CID
pub fn get_codec(cid: &Cid) -> Option<CidCodec> {
    CidCodec::from_code(cid.codec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cid() {
        let data = b"Hello, World!";
        let cid = create_cid(data, CidCodec::Raw);

        assert_eq!(cid.version(), Version::V1);
        assert_eq!(cid.codec(), CidCodec::Raw.code());
    }

    #[test]
    fn test_cid_consistency() {
        let data = b"test data";
        let cid1 = create_cid(data, CidCodec::Raw);
        let cid2 = create_cid(data, CidCodec::Raw);

        assert_eq!(cid1, cid2);
    }

    #[test]
    fn test_different_data_different_cid() {
        let cid1 = create_cid(b"data1", CidCodec::Raw);
        let cid2 = create_cid(b"data2", CidCodec::Raw);

        assert_ne!(cid1, cid2);
    }

    #[test]
    fn test_verify_cid() {
        let data = b"verify me";
        let cid = create_cid(data, CidCodec::Raw);

        assert!(verify_cid(data, &cid));
        assert!(!verify_cid(b"wrong data", &cid));
    }

    #[test]
    fn test_cid_string_roundtrip() {
        let data = b"test";
        let cid = create_cid(data, CidCodec::Raw);
        let string = cid.to_string();
        let parsed = parse_cid(&string).unwrap();

        assert_eq!(cid, parsed);
    }

    #[test]
    fn test_codec_roundtrip() {
        for codec in [CidCodec::Raw, CidCodec::DagCbor] {
            let code = codec.code();
            let parsed = CidCodec::from_code(code);
            assert_eq!(Some(codec), parsed);
        }
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_create_cid_is_deterministic(data: Vec<u8>) {
            let cid1 = create_cid(&data, CidCodec::Raw);
            let cid2 = create_cid(&data, CidCodec::Raw);
            prop_assert_eq!(cid1, cid2);
            prop_assert!(verify_cid(&data, &cid1));
        }

        #[test]
        fn prop_string_roundtrip_preserves_cid(data: Vec<u8>) {
            let cid = create_cid(&data, CidCodec::Raw);
            let parsed = parse_cid(&cid.to_string()).unwrap();
            prop_assert_eq!(cid, parsed);
        }
    }
}
