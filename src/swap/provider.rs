use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::NetworkParams;
use crate::error::SwapError;

const GET_PAIRS_ENDPOINT: &str = "/getpairs";
const GET_FEE_ESTIMATION_ENDPOINT: &str = "/getfeeestimation";
const CREATE_SWAP_ENDPOINT: &str = "/createswap";
const SWAP_STATUS_ENDPOINT: &str = "/swapstatus";
const BROADCAST_ENDPOINT: &str = "/broadcasttransaction";

pub const REVERSE_SWAP_TYPE: &str = "reversesubmarine";
pub const BTC_PAIR_ID: &str = "BTC/BTC";
pub const BTC_SYMBOL: &str = "BTC";

pub const STATUS_TX_MEMPOOL: &str = "transaction.mempool";
pub const STATUS_TX_CONFIRMED: &str = "transaction.confirmed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairsInfo {
    #[serde(default)]
    pub warnings: Vec<String>,
    pub pairs: BTreeMap<String, PairInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInfo {
    pub rate: f64,
    pub limits: PairLimits,
    pub fees: PairFees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairLimits {
    pub maximal: u64,
    pub minimal: u64,
    #[serde(default)]
    pub maximal_zero_conf: ZeroConfLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroConfLimits {
    pub base_asset: u64,
    pub quote_asset: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairFees {
    pub percentage: f64,
    pub miner_fees: MinerFees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerFees {
    pub base_asset: AssetMinerFees,
    pub quote_asset: AssetMinerFees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMinerFees {
    pub normal: u64,
    pub reverse: ReverseMinerFees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseMinerFees {
    pub lockup: u64,
    pub claim: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReverseQuote {
    pub invoice_amount: u64,
    pub percentage_fee: u64,
    pub lockup_fee: u64,
    pub onchain_amount: u64,
}

impl PairsInfo {
    /// What the provider should lock on chain for a reverse swap of `invoice_amount` sat.
    pub fn reverse_quote(&self, pair_id: &str, invoice_amount: u64) -> Result<ReverseQuote, SwapError> {
        let pair = self
            .pairs
            .get(pair_id)
            .ok_or_else(|| SwapError::InvalidInput(format!("unknown pair {pair_id}")))?;

        let limits = &pair.limits;
        if invoice_amount < limits.minimal || invoice_amount > limits.maximal {
            return Err(SwapError::InvalidInput(format!(
                "amount {invoice_amount} outside limits [{}, {}]",
                limits.minimal, limits.maximal
            )));
        }

        let percentage_fee = (invoice_amount as f64 * pair.fees.percentage / 100.0).ceil() as u64;
        let lockup_fee = pair.fees.miner_fees.base_asset.reverse.lockup;
        let onchain_amount = invoice_amount
            .checked_sub(percentage_fee)
            .and_then(|v| v.checked_sub(lockup_fee))
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                SwapError::InvalidInput(format!(
                    "fees exceed amount: {invoice_amount} - {percentage_fee} - {lockup_fee}"
                ))
            })?;

        Ok(ReverseQuote {
            invoice_amount,
            percentage_fee,
            lockup_fee,
            onchain_amount,
        })
    }
}

/// Fee estimates in sat/vbyte keyed by currency symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeEstimate(pub BTreeMap<String, f64>);

impl FeeEstimate {
    pub fn sat_per_vbyte(&self, symbol: &str) -> Option<f64> {
        self.0.get(symbol).copied()
    }

    /// sat per 1000 weight units; one vbyte is four weight units.
    pub fn fee_per_kw(&self, symbol: &str) -> Option<u64> {
        self.sat_per_vbyte(symbol)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| (v * 250.0).ceil() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReverseSwapRequest {
    #[serde(rename = "type")]
    pub swap_type: String,
    pub pair_id: String,
    pub order_side: String,
    pub invoice_amount: u64,
    pub preimage_hash: String,
    pub claim_public_key: String,
}

impl CreateReverseSwapRequest {
    pub fn new(invoice_amount: u64, preimage_hash: &[u8; 32], claim_pubkey: &PublicKey) -> Self {
        Self {
            swap_type: REVERSE_SWAP_TYPE.to_string(),
            pair_id: BTC_PAIR_ID.to_string(),
            order_side: "buy".to_string(),
            invoice_amount,
            preimage_hash: hex::encode(preimage_hash),
            claim_public_key: hex::encode(claim_pubkey.serialize()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReverseSwapResponse {
    pub id: String,
    pub redeem_script: String,
    pub timeout_block_height: u32,
    pub invoice: String,
    pub onchain_amount: u64,
    pub lockup_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransaction {
    pub id: String,
    #[serde(default)]
    pub hex: Option<String>,
    #[serde(default)]
    pub eta: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStatusResponse {
    pub status: String,
    #[serde(default)]
    pub transaction: Option<StatusTransaction>,
}

#[derive(Debug, Serialize)]
struct SwapIdRequest<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastRequest<'a> {
    currency: &'a str,
    transaction_hex: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// The provider operations the engine needs. Implementations are pure transport and make no
/// trust decisions.
#[async_trait]
pub trait SwapProvider: Send + Sync {
    async fn get_pairs(&self) -> Result<PairsInfo, SwapError>;

    async fn get_fee_estimate(&self) -> Result<FeeEstimate, SwapError>;

    async fn create_reverse_swap(
        &self,
        request: &CreateReverseSwapRequest,
    ) -> Result<CreateReverseSwapResponse, SwapError>;

    async fn get_swap_status(&self, id: &str) -> Result<SwapStatusResponse, SwapError>;

    async fn broadcast_claim(&self, raw_tx_hex: &str) -> Result<(), SwapError>;
}

/// HTTP client for the swap provider API.
#[derive(Debug, Clone)]
pub struct SwapServiceClient {
    http: reqwest::Client,
    api_url: String,
}

impl SwapServiceClient {
    /// `timeout` bounds every request end to end; expiry surfaces as [`SwapError::Network`].
    pub fn new(params: &NetworkParams, timeout: Duration) -> Result<Self, SwapError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SwapError::Network(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            api_url: params.api_url().to_string(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.api_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, SwapError> {
        let url = self.url(endpoint);
        let resp = self.http.get(&url).send().await?;
        decode_response(endpoint, resp, &[StatusCode::OK]).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        accepted: &[StatusCode],
    ) -> Result<T, SwapError> {
        let url = self.url(endpoint);
        let resp = self.http.post(&url).json(body).send().await?;
        decode_response(endpoint, resp, accepted).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    resp: reqwest::Response,
    accepted: &[StatusCode],
) -> Result<T, SwapError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !accepted.contains(&status) {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        tracing::debug!(endpoint, status = status.as_u16(), %message, "provider rejected request");
        return Err(SwapError::ServiceRejected {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        SwapError::Network(format!("decode {endpoint} response (status {status}): {e}"))
    })
}

#[async_trait]
impl SwapProvider for SwapServiceClient {
    async fn get_pairs(&self) -> Result<PairsInfo, SwapError> {
        self.get_json(GET_PAIRS_ENDPOINT).await
    }

    async fn get_fee_estimate(&self) -> Result<FeeEstimate, SwapError> {
        self.get_json(GET_FEE_ESTIMATION_ENDPOINT).await
    }

    async fn create_reverse_swap(
        &self,
        request: &CreateReverseSwapRequest,
    ) -> Result<CreateReverseSwapResponse, SwapError> {
        self.post_json(
            CREATE_SWAP_ENDPOINT,
            request,
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await
    }

    async fn get_swap_status(&self, id: &str) -> Result<SwapStatusResponse, SwapError> {
        self.post_json(SWAP_STATUS_ENDPOINT, &SwapIdRequest { id }, &[StatusCode::OK])
            .await
    }

    async fn broadcast_claim(&self, raw_tx_hex: &str) -> Result<(), SwapError> {
        let _: serde_json::Value = self
            .post_json(
                BROADCAST_ENDPOINT,
                &BroadcastRequest {
                    currency: BTC_SYMBOL,
                    transaction_hex: raw_tx_hex,
                },
                &[StatusCode::OK, StatusCode::CREATED],
            )
            .await?;
        Ok(())
    }
}
