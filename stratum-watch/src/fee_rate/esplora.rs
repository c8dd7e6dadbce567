use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{FeeRateError, FeeRateSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for an Esplora-compatible REST API (mempool.space,
/// blockstream.info, a local electrs).
#[derive(Debug, Clone)]
pub struct EsploraClient {
    client: Client,
    base_url: String,
}

/// The fields of `GET /api/tx/{txid}` used here.
#[derive(Debug, Deserialize)]
struct EsploraTx {
    fee: u64,
    weight: u64,
}

impl EsploraTx {
    fn sat_per_vb(&self) -> Result<f64, FeeRateError> {
        if self.weight == 0 {
            return Err(FeeRateError::InvalidResponse("zero weight".to_string()));
        }
        let vsize = self.weight.div_ceil(4);
        Ok(self.fee as f64 / vsize as f64)
    }
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FeeRateError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn tx_url(&self, txid: Txid) -> String {
        format!("{}/api/tx/{}", self.base_url.trim_end_matches('/'), txid)
    }
}

#[async_trait]
impl FeeRateSource for EsploraClient {
    async fn fee_rate(&self, txid: Txid) -> Result<f64, FeeRateError> {
        let response = self.client.get(self.tx_url(txid)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(FeeRateError::NotFound);
        }

        let tx: EsploraTx = response.error_for_status()?.json().await?;
        tx.sat_per_vb()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn fee_rate_uses_rounded_up_vsize() {
        let tx: EsploraTx =
            serde_json::from_str(r#"{"txid":"ab","fee":2250,"weight":561,"status":{}}"#).unwrap();
        // vsize = ceil(561 / 4) = 141
        let rate = tx.sat_per_vb().unwrap();
        assert!((rate - 2250.0 / 141.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_is_rejected() {
        let tx = EsploraTx { fee: 1, weight: 0 };
        assert!(matches!(tx.sat_per_vb(), Err(FeeRateError::InvalidResponse(_))));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = EsploraClient::new("https://mempool.space/").unwrap();
        let txid = Txid::from_byte_array([0; 32]);
        assert_eq!(
            client.tx_url(txid),
            format!("https://mempool.space/api/tx/{}", "00".repeat(32))
        );
    }
}
