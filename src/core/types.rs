//! Chain data as served by a Bitcoin Core node (`getblockheader` / `getblock 2`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of trailing txid hex characters used to recognise same-day spends
pub const TXID_SUFFIX_LEN: usize = 8;

/// Block header fields the oracle needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: String,
    pub height: u64,
    #[serde(rename = "time")]
    pub timestamp: i64,
}

impl BlockHeader {
    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Full block with decoded transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub height: u64,
    #[serde(rename = "time")]
    pub timestamp: i64,
    #[serde(rename = "tx", default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            hash: self.hash.clone(),
            height: self.height,
            timestamp: self.timestamp,
        }
    }

    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    #[serde(rename = "vin", default)]
    pub inputs: Vec<TxInput>,
    #[serde(rename = "vout", default)]
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn txid_suffix(&self) -> &str {
        suffix(&self.txid)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.first().map_or(false, TxInput::is_coinbase)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxInput {
    /// Present only on the reward input of a block's first transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase: Option<String>,
    /// Transaction whose output this input spends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    /// Hex-encoded witness stack items
    #[serde(rename = "txinwitness", default, skip_serializing_if = "Vec::is_empty")]
    pub witness: Vec<String>,
}

impl TxInput {
    pub fn spending(txid: impl Into<String>) -> Self {
        Self {
            txid: Some(txid.into()),
            ..Default::default()
        }
    }

    pub fn coinbase() -> Self {
        Self {
            coinbase: Some("00".to_string()),
            ..Default::default()
        }
    }

    pub fn with_witness(mut self, items: Vec<String>) -> Self {
        self.witness = items;
        self
    }

    pub fn is_coinbase(&self) -> bool {
        self.coinbase.is_some()
    }

    pub fn prev_txid_suffix(&self) -> Option<&str> {
        self.txid.as_deref().map(suffix)
    }

    /// Length of the longest witness item, in hex characters
    pub fn max_witness_len(&self) -> usize {
        self.witness.iter().map(String::len).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in BTC
    pub value: f64,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
}

impl TxOutput {
    pub fn new(value: f64, script_pub_key: ScriptPubKey) -> Self {
        Self { value, script_pub_key }
    }

    pub fn is_null_data(&self) -> bool {
        self.script_pub_key.is_null_data()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub asm: String,
}

impl ScriptPubKey {
    pub fn new(kind: &str, asm: &str) -> Self {
        Self {
            kind: kind.to_string(),
            asm: asm.to_string(),
        }
    }

    pub fn is_null_data(&self) -> bool {
        self.kind == "nulldata" || self.asm.contains("OP_RETURN")
    }
}

fn suffix(txid: &str) -> &str {
    let start = txid.len().saturating_sub(TXID_SUFFIX_LEN);
    txid.get(start..).unwrap_or(txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const GETBLOCK_JSON: &str = r#"{
        "hash": "00000000000000000002a7c4c1e48d76c5a37902165a270156b7a8d72728a054",
        "height": 820000,
        "time": 1702638000,
        "tx": [
            {
                "txid": "aa11",
                "vin": [{"coinbase": "03a0830c", "sequence": 4294967295}],
                "vout": [{"value": 6.5, "n": 0, "scriptPubKey": {"asm": "0 abcd", "type": "witness_v0_keyhash"}}]
            },
            {
                "txid": "4d3c2b1a0f9e8d7c6b5a49382716051d2c3b4a5968778695a4b3c2d1e0f1a2b3",
                "vin": [{"txid": "ffee00112233445566778899aabbccddeeff00112233445566778899deadbeef", "vout": 1, "txinwitness": ["3044", "02ab"]}],
                "vout": [
                    {"value": 0.00123, "n": 0, "scriptPubKey": {"asm": "0 1234", "type": "witness_v0_keyhash"}},
                    {"value": 0.0, "n": 1, "scriptPubKey": {"asm": "OP_RETURN 6f6d6e69", "type": "nulldata"}}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_getblock_verbose_decoding() {
        let block: Block = serde_json::from_str(GETBLOCK_JSON).unwrap();
        assert_eq!(block.height, 820000);
        assert_eq!(block.transactions.len(), 2);
        assert!(block.transactions[0].is_coinbase());

        let spend = &block.transactions[1];
        assert!(!spend.is_coinbase());
        assert_eq!(spend.txid_suffix(), "e0f1a2b3");
        assert_eq!(spend.inputs[0].prev_txid_suffix(), Some("deadbeef"));
        assert_eq!(spend.inputs[0].max_witness_len(), 4);
        assert!(!spend.outputs[0].is_null_data());
        assert!(spend.outputs[1].is_null_data());
        assert_eq!(block.time_utc().map(|t| t.date_naive()), NaiveDate::from_ymd_opt(2023, 12, 15));
    }

    #[test]
    fn test_short_txid_suffix() {
        let tx = Transaction {
            txid: "abc".to_string(),
            inputs: vec![],
            outputs: vec![],
        };
        assert_eq!(tx.txid_suffix(), "abc");
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_op_return_detected_from_asm() {
        let script = ScriptPubKey::new("nonstandard", "OP_RETURN 0011");
        assert!(script.is_null_data());
    }
}
