//! Decoding of the cached minipool dataset.
//!
//! The dataset is a (usually gzip-compressed) JSON array. Only the node
//! deposit and the node's RPL stake figures are kept.

use crate::error::{MinipoolError, Result};
use crate::models::PoolRecord;
use flate2::read::GzDecoder;
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fixed-point scale of on-chain ETH amounts.
const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMinipool {
    #[serde(deserialize_with = "deserialize_amount")]
    node_deposit_balance: u128,
    node: RawNode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(deserialize_with = "deserialize_amount")]
    rpl_stake: u128,
    #[serde(deserialize_with = "deserialize_amount")]
    rpl_min_stake: u128,
}

impl RawMinipool {
    fn into_record(self, index: usize) -> Result<PoolRecord> {
        let category = u64::try_from(self.node_deposit_balance / WEI_PER_ETH).map_err(|_| {
            MinipoolError::InvalidRecord {
                index,
                reason: format!(
                    "node deposit balance {} is out of range",
                    self.node_deposit_balance
                ),
            }
        })?;

        Ok(PoolRecord {
            category,
            stake: self.node.rpl_stake,
            min_stake: self.node.rpl_min_stake,
        })
    }
}

/// Accepts amounts as JSON integers or base-10 strings.
struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a base-10 integer string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u128, E> {
        u128::try_from(v).map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    // Integers past u64 arrive as floats from a plain JSON number.
    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<u128, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
            Ok(v as u128)
        } else {
            Err(E::invalid_value(Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u128, E> {
        v.trim()
            .parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

fn deserialize_amount<'de, D>(deserializer: D) -> std::result::Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(AmountVisitor)
}

/// Read and decode the dataset at `path`.
pub fn load_records(path: &Path) -> Result<Vec<PoolRecord>> {
    let bytes = fs::read(path).map_err(|source| MinipoolError::Cache {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());

    let records = decode_records(&bytes, path)?;
    info!("Loaded {} minipools", records.len());
    Ok(records)
}

/// Decode dataset bytes; `path` is only used in error messages.
pub fn decode_records(bytes: &[u8], path: &Path) -> Result<Vec<PoolRecord>> {
    let json = decompress(bytes).map_err(|source| MinipoolError::Decompress {
        path: path.to_path_buf(),
        source,
    })?;

    let entries: Vec<serde_json::Value> =
        serde_json::from_slice(&json).map_err(|source| MinipoolError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<RawMinipool>(entry)
                .map_err(|e| MinipoolError::InvalidRecord {
                    index,
                    reason: e.to_string(),
                })?
                .into_record(index)
        })
        .collect()
}

fn decompress(bytes: &[u8]) -> io::Result<Cow<'_, [u8]>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        debug!("Dataset is not gzip-compressed, reading as plain JSON");
        return Ok(Cow::Borrowed(bytes));
    }

    let mut decoder = GzDecoder::new(bytes);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(Cow::Owned(decompressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &[u8] = include_bytes!("../../fixtures/minipools.json");

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn decode(bytes: &[u8]) -> Result<Vec<PoolRecord>> {
        decode_records(bytes, Path::new("minipools.json.gz"))
    }

    #[test]
    fn test_decode_fixture() {
        let records = decode(SAMPLE).unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(
            records[0],
            PoolRecord {
                category: 8,
                stake: 2_400_000_000_000_000_000_000,
                min_stake: 240_000_000_000_000_000_000,
            }
        );
        assert_eq!(records[1].category, 16);
        assert_eq!(records[3].min_stake, 0);
    }

    #[test]
    fn test_gzip_matches_plain() {
        assert_eq!(decode(&gzip(SAMPLE)).unwrap(), decode(SAMPLE).unwrap());
    }

    #[test]
    fn test_integer_and_string_amounts() {
        let json = br#"[
            {"nodeDepositBalance": 16000000000000000000, "node": {"rplStake": 5, "rplMinStake": "2"}},
            {"nodeDepositBalance": "8000000000000000000", "node": {"rplStake": "340282366920938463463374607431768211455", "rplMinStake": 1}}
        ]"#;
        let records = decode(json).unwrap();
        assert_eq!(records[0].category, 16);
        assert_eq!(records[0].stake, 5);
        assert_eq!(records[0].min_stake, 2);
        assert_eq!(records[1].category, 8);
        assert_eq!(records[1].stake, u128::MAX);
    }

    #[test]
    fn test_empty_array() {
        assert!(decode(&gzip(b"[]")).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_gzip() {
        let compressed = gzip(SAMPLE);
        let truncated = &compressed[..compressed.len() / 2];
        assert!(matches!(
            decode(truncated),
            Err(MinipoolError::Decompress { .. }) | Err(MinipoolError::Parse { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            decode(b"{\"not\": \"an array\"}"),
            Err(MinipoolError::Parse { .. })
        ));
    }

    #[test]
    fn test_non_numeric_amount() {
        let json = br#"[
            {"nodeDepositBalance": "8000000000000000000", "node": {"rplStake": "1", "rplMinStake": "1"}},
            {"nodeDepositBalance": "eight", "node": {"rplStake": "1", "rplMinStake": "1"}}
        ]"#;
        match decode(json) {
            Err(MinipoolError::InvalidRecord { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_node_field() {
        let json = br#"[{"nodeDepositBalance": "8000000000000000000"}]"#;
        assert!(matches!(
            decode(json),
            Err(MinipoolError::InvalidRecord { index: 0, .. })
        ));
    }

    #[test]
    fn test_load_records_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("minipools.json.gz");
        std::fs::write(&path, gzip(SAMPLE)).unwrap();

        assert_eq!(load_records(&path).unwrap().len(), 6);
        assert!(matches!(
            load_records(&dir.path().join("missing.json.gz")),
            Err(MinipoolError::Cache { .. })
        ));
    }
}
