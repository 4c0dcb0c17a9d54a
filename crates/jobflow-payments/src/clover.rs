//! HTTP-backed [`PaymentProcessor`] for a Clover-style payment processor.
//!
//! Out of scope (§1): the real processor itself. This implements only the
//! request/response shapes and idempotency-key plumbing a production
//! adapter needs; the wire format is a reasonable REST shape, not a
//! documented Clover contract.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::adapter::{
    AuthorizeRequest, AuthorizeResponse, CaptureRequest, CaptureResponse, PaymentProcessor,
    RefundRequest, RefundResponse, TokenizeRequest, TokenizeResponse, VoidRequest,
};
use crate::error::{PaymentError, PaymentErrorKind};

/// Client configuration, loaded via `jobflow-config`.
#[derive(Clone, Debug)]
pub struct CloverConfig {
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Clone, Debug)]
pub struct CloverAdapter {
    client: Client,
    config: CloverConfig,
}

impl CloverAdapter {
    pub fn new(config: CloverConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint, path)
    }

    /// Maps transport and HTTP-status failures onto [`PaymentErrorKind`].
    ///
    /// A response body is only consulted for classification on `409`
    /// (idempotency replay) and `402` (declined) — every other non-2xx
    /// status is treated by its class (5xx retryable, 4xx invalid).
    fn classify_status(status: StatusCode) -> PaymentErrorKind {
        if status == StatusCode::CONFLICT {
            PaymentErrorKind::AlreadyApplied
        } else if status == StatusCode::PAYMENT_REQUIRED {
            PaymentErrorKind::PermanentRejected
        } else if status.is_server_error() {
            PaymentErrorKind::Retryable
        } else {
            PaymentErrorKind::InvalidRequest
        }
    }

    async fn send<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, PaymentError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, path, "payment adapter request failed");
                PaymentError::new(PaymentErrorKind::Retryable, "payment adapter unreachable")
                    .with_detail(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let kind = Self::classify_status(status);
            let detail = response.text().await.unwrap_or_default();
            return Err(PaymentError::new(kind, format!("adapter returned {status}"))
                .with_detail(detail));
        }

        response.json::<Resp>().await.map_err(|e| {
            PaymentError::new(PaymentErrorKind::Retryable, "malformed adapter response")
                .with_detail(e.to_string())
        })
    }
}

#[async_trait]
impl PaymentProcessor for CloverAdapter {
    #[instrument(skip(self, request), fields(kind = "tokenize"))]
    async fn tokenize(&self, request: TokenizeRequest) -> Result<TokenizeResponse, PaymentError> {
        #[derive(Serialize)]
        struct Body<'a> {
            card_number: &'a str,
            exp_month: u8,
            exp_year: u16,
            cvc: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            source_token: String,
        }
        let resp: Resp = self
            .send(
                "/v1/tokens",
                &Body {
                    card_number: &request.card_number,
                    exp_month: request.exp_month,
                    exp_year: request.exp_year,
                    cvc: &request.cvc,
                },
            )
            .await?;
        Ok(TokenizeResponse {
            source_token: resp.source_token,
        })
    }

    #[instrument(skip(self, request), fields(kind = "authorize", idempotency_key = %request.idempotency_key))]
    async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeResponse, PaymentError> {
        #[derive(Serialize)]
        struct Body<'a> {
            source: &'a str,
            amount: String,
            currency: &'a str,
            idempotency_key: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            charge_id: String,
            authorization_expires_at: chrono::DateTime<chrono::Utc>,
        }
        let resp: Resp = self
            .send(
                "/v1/charges/authorize",
                &Body {
                    source: &request.source_token,
                    amount: request.amount.to_string(),
                    currency: &request.currency,
                    idempotency_key: &request.idempotency_key,
                },
            )
            .await?;
        Ok(AuthorizeResponse {
            charge_id: resp.charge_id,
            authorization_expires_at: resp.authorization_expires_at,
        })
    }

    #[instrument(skip(self, request), fields(kind = "capture", idempotency_key = %request.idempotency_key))]
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResponse, PaymentError> {
        #[derive(Serialize)]
        struct Body<'a> {
            charge_id: &'a str,
            amount: String,
            idempotency_key: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            payment_id: String,
        }
        let resp: Resp = self
            .send(
                "/v1/charges/capture",
                &Body {
                    charge_id: &request.charge_id,
                    amount: request.amount.to_string(),
                    idempotency_key: &request.idempotency_key,
                },
            )
            .await?;
        Ok(CaptureResponse {
            payment_id: resp.payment_id,
        })
    }

    #[instrument(skip(self, request), fields(kind = "refund", idempotency_key = %request.idempotency_key))]
    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, PaymentError> {
        #[derive(Serialize)]
        struct Body<'a> {
            charge_id: Option<&'a str>,
            payment_id: Option<&'a str>,
            amount: String,
            idempotency_key: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            refund_id: String,
        }
        let resp: Resp = self
            .send(
                "/v1/refunds",
                &Body {
                    charge_id: request.charge_id.as_deref(),
                    payment_id: request.payment_id.as_deref(),
                    amount: request.amount.to_string(),
                    idempotency_key: &request.idempotency_key,
                },
            )
            .await?;
        Ok(RefundResponse {
            refund_id: resp.refund_id,
        })
    }

    #[instrument(skip(self, request), fields(kind = "void", idempotency_key = %request.idempotency_key))]
    async fn void(&self, request: VoidRequest) -> Result<(), PaymentError> {
        #[derive(Serialize)]
        struct Body<'a> {
            charge_id: &'a str,
            idempotency_key: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {}
        let _: Resp = self
            .send(
                "/v1/charges/void",
                &Body {
                    charge_id: &request.charge_id,
                    idempotency_key: &request.idempotency_key,
                },
            )
            .await?;
        Ok(())
    }
}
