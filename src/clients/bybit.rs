// Bybit v5 REST client: signed spot order endpoints and the public ticker

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ExchangeClient, ExchangeError, ExchangeOrderStatus, OrderAck, PriceSource};
use crate::config::ExchangeConfig;
use crate::core::types::{OrderSide, TimeInForce};

type HmacSha256 = Hmac<Sha256>;

const RET_CODE_OK: i64 = 0;
const RET_CODE_RATE_LIMIT: i64 = 10006;
const AUTH_RET_CODES: [i64; 3] = [10003, 10004, 10005];
const ORDER_NOT_FOUND_RET_CODES: [i64; 2] = [110001, 170213];
const QTY_DECIMALS: usize = 8;

pub struct BybitClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    category: String,
    recv_window_ms: u64,
}

impl BybitClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("dca-trading-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExchangeError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            category: config.category.clone(),
            recv_window_ms: config.recv_window_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn require_credentials(&self) -> Result<(), ExchangeError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ExchangeError::Authentication(
                "BYBIT_API_KEY and BYBIT_API_SECRET are required for order endpoints".to_string(),
            ));
        }
        Ok(())
    }

    /// HMAC-SHA256 over `timestamp + api_key + recv_window + payload`, hex encoded
    fn sign(&self, timestamp: &str, payload: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Authentication(format!("invalid API secret: {}", e)))?;
        mac.update(timestamp.as_bytes());
        mac.update(self.api_key.as_bytes());
        mac.update(self.recv_window_ms.to_string().as_bytes());
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn auth_request(
        &self,
        request: reqwest::RequestBuilder,
        payload: &str,
    ) -> Result<reqwest::RequestBuilder, ExchangeError> {
        self.require_credentials()?;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, payload)?;

        Ok(request
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", self.recv_window_ms.to_string())
            .header("X-BAPI-SIGN", signature))
    }

    async fn signed_post(&self, path: &str, body: Value) -> Result<Value, ExchangeError> {
        let body_text = body.to_string();
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body_text.clone());
        let request = self.auth_request(request, &body_text)?;

        debug!("POST {} {}", path, body_text);
        let response = request.send().await?;
        Self::read_envelope(path, response).await
    }

    async fn signed_get(&self, path: &str, query: &str) -> Result<Value, ExchangeError> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        let request = self.auth_request(self.http.get(&url), query)?;

        debug!("GET {}?{}", path, query);
        let response = request.send().await?;
        Self::read_envelope(path, response).await
    }

    async fn public_get(&self, path: &str, query: &str) -> Result<Value, ExchangeError> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        let response = self.http.get(&url).send().await?;
        Self::read_envelope(path, response).await
    }

    /// Unwrap the `{retCode, retMsg, result}` envelope
    async fn read_envelope(path: &str, response: reqwest::Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited(format!("{} returned HTTP 429", path)));
        }

        if !status.is_success() {
            return Err(ExchangeError::Connection(format!(
                "{} failed: status={} body={}",
                path, status, text
            )));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Response(format!("invalid JSON from {}: {}", path, e)))?;

        let ret_code = json
            .get("retCode")
            .and_then(Value::as_i64)
            .ok_or_else(|| ExchangeError::Response(format!("missing retCode from {}", path)))?;
        let ret_msg = json
            .get("retMsg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match ret_code {
            RET_CODE_OK => Ok(json.get("result").cloned().unwrap_or(Value::Null)),
            RET_CODE_RATE_LIMIT => Err(ExchangeError::RateLimited(ret_msg)),
            code if AUTH_RET_CODES.contains(&code) => Err(ExchangeError::Authentication(ret_msg)),
            code if ORDER_NOT_FOUND_RET_CODES.contains(&code) => Err(ExchangeError::OrderNotFound(ret_msg)),
            code => {
                warn!("Bybit {} rejected request: {} {}", path, code, ret_msg);
                Err(ExchangeError::Api { code, message: ret_msg })
            }
        }
    }

    async fn create_order(&self, body: Value) -> Result<OrderAck, ExchangeError> {
        let result = self.signed_post("/v5/order/create", body).await?;

        let order_id = result
            .get("orderId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ExchangeError::Response("order/create returned no orderId".to_string()))?;
        let client_order_id = result
            .get("orderLinkId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(OrderAck {
            order_id: order_id.to_string(),
            client_order_id,
        })
    }

    async fn find_order(&self, path: &str, pair: &str, order_id: &str) -> Result<Option<Value>, ExchangeError> {
        let query = format!("category={}&symbol={}&orderId={}", self.category, pair, order_id);
        let result = self.signed_get(path, &query).await?;
        Ok(result
            .get("list")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .cloned())
    }
}

/// Map a Bybit `orderStatus`; `cum_exec_qty` keeps the traded part of a cancelled order
pub fn parse_order_status(raw: &str, cum_exec_qty: f64) -> Option<ExchangeOrderStatus> {
    match raw {
        "New" | "Created" | "Untriggered" | "Triggered" => Some(ExchangeOrderStatus::New),
        "PartiallyFilled" | "Active" => Some(ExchangeOrderStatus::PartiallyFilled),
        "Filled" => Some(ExchangeOrderStatus::Filled),
        "Cancelled" | "PartiallyFilledCanceled" | "Deactivated" => {
            if cum_exec_qty > 0.0 {
                Some(ExchangeOrderStatus::PartiallyFilledCancelled { filled_quantity: cum_exec_qty })
            } else {
                Some(ExchangeOrderStatus::Cancelled)
            }
        }
        "Rejected" => Some(ExchangeOrderStatus::Rejected),
        _ => None,
    }
}

/// Plain decimal string without trailing zeros, as Bybit expects
pub fn format_decimal(value: f64, max_decimals: usize) -> String {
    let formatted = format!("{:.*}", max_decimals, value);
    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn place_market_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderAck, ExchangeError> {
        // baseCoin keeps every quantity in the system in base-asset units
        let body = json!({
            "category": self.category,
            "symbol": pair,
            "side": side.as_str(),
            "orderType": "Market",
            "qty": format_decimal(quantity, QTY_DECIMALS),
            "marketUnit": "baseCoin",
        });
        self.create_order(body).await
    }

    async fn place_limit_order(
        &self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
        time_in_force: TimeInForce,
        client_order_id: &str,
    ) -> Result<OrderAck, ExchangeError> {
        let body = json!({
            "category": self.category,
            "symbol": pair,
            "side": side.as_str(),
            "orderType": "Limit",
            "qty": format_decimal(quantity, QTY_DECIMALS),
            "price": format_decimal(price, QTY_DECIMALS),
            "timeInForce": time_in_force.as_str(),
            "orderLinkId": client_order_id,
        });
        self.create_order(body).await
    }

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<(), ExchangeError> {
        let body = json!({
            "category": self.category,
            "symbol": pair,
            "orderId": order_id,
        });
        self.signed_post("/v5/order/cancel", body).await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        pair: &str,
        order_id: &str,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        // Closed orders eventually drop out of the realtime list
        let order = match self.find_order("/v5/order/realtime", pair, order_id).await? {
            Some(order) => order,
            None => self
                .find_order("/v5/order/history", pair, order_id)
                .await?
                .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?,
        };

        let raw = order
            .get("orderStatus")
            .and_then(Value::as_str)
            .ok_or_else(|| ExchangeError::Response("order without orderStatus".to_string()))?;

        let cum_exec_qty = order
            .get("cumExecQty")
            .and_then(Value::as_str)
            .and_then(|q| q.parse::<f64>().ok())
            .unwrap_or(0.0);

        parse_order_status(raw, cum_exec_qty)
            .ok_or_else(|| ExchangeError::Response(format!("unknown order status {}", raw)))
    }
}

#[async_trait]
impl PriceSource for BybitClient {
    async fn current_price(&self, pair: &str) -> Result<f64, ExchangeError> {
        let query = format!("category={}&symbol={}", self.category, pair);
        let result = self.public_get("/v5/market/tickers", &query).await?;

        result
            .get("list")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .and_then(|ticker| ticker.get("lastPrice"))
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ExchangeError::PriceUnavailable(pair.to_string()))
    }
}
