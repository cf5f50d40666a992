//! Codec for binary asset maps
//!
//! Asset values travel as base64 of gzip-compressed bytes so that arbitrary
//! binary content fits inside a JSON payload without blowing up its size.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::read::GzDecoder;

/// Map from a sandbox-relative path to binary file content
pub type AssetMap = BTreeMap<String, Vec<u8>>;

/// Compress and base64-encode a single asset value
pub fn encode(content: &[u8]) -> String {
    let mut encoder = flate2::GzBuilder::new()
        .mtime(0)
        .write(Vec::new(), Compression::new(7));
    // Writing to a Vec cannot fail
    encoder.write_all(content).expect("write to Vec");
    let compressed = encoder.finish().expect("finish gzip stream");
    BASE64.encode(compressed)
}

/// Decode a base64-of-gzip asset value back into raw bytes
pub fn decode(content: &str) -> anyhow::Result<Vec<u8>> {
    let compressed = BASE64.decode(content.trim())?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Serde adapter for `Option<AssetMap>` fields
pub mod base64_gzip_map {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::AssetMap;

    pub fn serialize<S>(map: &Option<AssetMap>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match map {
            Some(map) => serializer.collect_map(
                map.iter()
                    .map(|(filename, content)| (filename, super::encode(content))),
            ),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<AssetMap>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<std::collections::BTreeMap<String, String>> =
            Option::deserialize(deserializer)?;
        match encoded {
            None => Ok(None),
            Some(encoded) => {
                let mut map = AssetMap::new();
                for (filename, content) in encoded {
                    let bytes = super::decode(&content)
                        .map_err(|e| D::Error::custom(format!("asset {filename}: {e}")))?;
                    map.insert(filename, bytes);
                }
                Ok(Some(map))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let encoded = encode(&payload);
        assert!(encoded.is_ascii());
        assert_eq!(decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not base64 at all!").is_err());
        // Valid base64 but not a gzip stream
        assert!(decode(&BASE64.encode(b"plain bytes")).is_err());
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(decode(&encode(b"")).unwrap(), Vec::<u8>::new());
    }
}
