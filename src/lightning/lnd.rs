use std::time::Duration;

use serde::Serialize;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Request, Status};

use crate::config::NodeConfig;
use crate::error::SwapError;
use crate::proto::lnrpc as pb;
use crate::proto::lnrpc::lightning_client::LightningClient;

const DEFAULT_TLS_DOMAIN: &str = "localhost";

/// Attaches the hex-encoded macaroon to every outgoing call.
#[derive(Clone)]
pub struct MacaroonInterceptor {
    macaroon: AsciiMetadataValue,
}

impl MacaroonInterceptor {
    pub fn new(macaroon: &[u8]) -> Result<Self, SwapError> {
        let macaroon = AsciiMetadataValue::try_from(hex::encode(macaroon))
            .map_err(|e| SwapError::Connection(format!("encode macaroon: {e}")))?;
        Ok(Self { macaroon })
    }
}

impl tonic::service::Interceptor for MacaroonInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("macaroon", self.macaroon.clone());
        Ok(request)
    }
}

type LndClient = LightningClient<InterceptedService<Channel, MacaroonInterceptor>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub identity_pubkey: String,
    pub alias: String,
    pub version: String,
    pub block_height: u32,
    pub block_hash: String,
    pub synced_to_chain: bool,
    pub synced_to_graph: bool,
    pub num_active_channels: u32,
    pub num_pending_channels: u32,
    pub num_peers: u32,
    pub networks: Vec<String>,
}

impl From<pb::GetInfoResponse> for NodeInfo {
    fn from(r: pb::GetInfoResponse) -> Self {
        Self {
            identity_pubkey: r.identity_pubkey,
            alias: r.alias,
            version: r.version,
            block_height: r.block_height,
            block_hash: r.block_hash,
            synced_to_chain: r.synced_to_chain,
            synced_to_graph: r.synced_to_graph,
            num_active_channels: r.num_active_channels,
            num_pending_channels: r.num_pending_channels,
            num_peers: r.num_peers,
            networks: r.chains.into_iter().map(|c| c.network).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInvoice {
    pub destination: String,
    pub payment_hash: String,
    pub amount_sats: u64,
    pub expiry_secs: i64,
    pub description: String,
    pub route_hints: Vec<pb::RouteHint>,
}

/// Authenticated gRPC session with one lnd node.
///
/// The channel is cloned cheaply and is safe to share between concurrent calls; it is released
/// when the last clone is dropped.
#[derive(Clone)]
pub struct NodeAdapter {
    client: LndClient,
}

impl NodeAdapter {
    pub async fn connect(cfg: &NodeConfig, timeout: Duration) -> Result<Self, SwapError> {
        let pem = tokio::fs::read(&cfg.tls_cert_path).await.map_err(|e| {
            SwapError::Connection(format!(
                "read tls certificate {}: {e}",
                cfg.tls_cert_path.display()
            ))
        })?;
        let macaroon = tokio::fs::read(&cfg.macaroon_path).await.map_err(|e| {
            SwapError::Connection(format!(
                "read macaroon {}: {e}",
                cfg.macaroon_path.display()
            ))
        })?;

        let tls = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(pem))
            .domain_name(
                cfg.tls_domain
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TLS_DOMAIN.to_string()),
            );

        let channel = Endpoint::from_shared(cfg.rpc_address.clone())
            .map_err(|e| SwapError::Connection(format!("invalid rpc_address: {e}")))?
            .tls_config(tls)
            .map_err(|e| SwapError::Connection(format!("tls config: {e}")))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await
            .map_err(|e| {
                tracing::error!(rpc_address = %cfg.rpc_address, error = %e, "lnd connection failed");
                SwapError::Connection(format!("connect {}: {e}", cfg.rpc_address))
            })?;

        tracing::debug!(rpc_address = %cfg.rpc_address, "lnd channel established");
        Self::from_channel(channel, &macaroon)
    }

    /// Wraps an already established channel. Used for plaintext test nodes.
    pub fn from_channel(channel: Channel, macaroon: &[u8]) -> Result<Self, SwapError> {
        let interceptor = MacaroonInterceptor::new(macaroon)?;
        Ok(Self {
            client: LightningClient::with_interceptor(channel, interceptor),
        })
    }

    pub async fn get_info(&self) -> Result<NodeInfo, SwapError> {
        let resp = self
            .client
            .clone()
            .get_info(pb::GetInfoRequest {})
            .await
            .map_err(|s| SwapError::Connection(format!("GetInfo: {}", s.message())))?;
        Ok(resp.into_inner().into())
    }

    pub async fn decode_invoice(&self, invoice: &str) -> Result<DecodedInvoice, SwapError> {
        let resp = self
            .client
            .clone()
            .decode_pay_req(pb::PayReqString {
                pay_req: invoice.to_string(),
            })
            .await
            .map_err(|s| {
                if is_transport_status(&s) {
                    SwapError::Connection(format!("DecodePayReq: {}", s.message()))
                } else {
                    SwapError::Decode(s.message().to_string())
                }
            })?
            .into_inner();

        let amount_sats = u64::try_from(resp.num_satoshis).map_err(|_| {
            SwapError::Decode(format!("negative invoice amount: {}", resp.num_satoshis))
        })?;

        Ok(DecodedInvoice {
            destination: resp.destination,
            payment_hash: resp.payment_hash,
            amount_sats,
            expiry_secs: resp.expiry,
            description: resp.description,
            route_hints: resp.route_hints,
        })
    }

    pub async fn query_routes(
        &self,
        amount_sats: u64,
        destination: &str,
        route_hints: Vec<pb::RouteHint>,
    ) -> Result<Option<pb::Route>, SwapError> {
        let amt = i64::try_from(amount_sats)
            .map_err(|_| SwapError::InvalidInput(format!("amount too large: {amount_sats}")))?;
        let resp = self
            .client
            .clone()
            .query_routes(pb::QueryRoutesRequest {
                pub_key: destination.to_string(),
                amt,
                use_mission_control: true,
                route_hints,
                ..Default::default()
            })
            .await
            .map_err(|s| SwapError::Connection(format!("QueryRoutes: {}", s.message())))?
            .into_inner();
        Ok(resp.routes.into_iter().next())
    }

    /// Best route for paying `invoice`, or `None` when the invoice cannot be decoded or no route
    /// is found. Failures are logged, not returned.
    pub async fn query_route(&self, invoice: &str) -> Option<pb::Route> {
        let decoded = match self.decode_invoice(invoice).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "decode invoice for route query failed");
                return None;
            }
        };

        match self
            .query_routes(decoded.amount_sats, &decoded.destination, decoded.route_hints)
            .await
        {
            Ok(route) => route,
            Err(e) => {
                tracing::warn!(
                    destination = %decoded.destination,
                    amount_sats = decoded.amount_sats,
                    error = %e,
                    "query route failed"
                );
                None
            }
        }
    }
}

fn is_transport_status(status: &Status) -> bool {
    matches!(
        status.code(),
        Code::Unavailable
            | Code::DeadlineExceeded
            | Code::Cancelled
            | Code::Unauthenticated
            | Code::PermissionDenied
    )
}
