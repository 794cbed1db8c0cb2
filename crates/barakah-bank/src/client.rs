//! reqwest implementation of [`BankClient`].

use async_trait::async_trait;
use reqwest::{Response, Url};
use std::time::Duration;

use crate::types::{AccountsResponse, TransactionsResponse};
use crate::{BankAccount, BankClient, BankError, BankTransaction, TokenPair, TransactionFilter};

/// Connection settings for the aggregation API.
#[derive(Clone, Debug)]
pub struct BankConfig {
    /// e.g. `https://api.bank-aggregator.example/v1`
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub timeout: Duration,
}

/// HTTPS client for the aggregation API.
pub struct HttpBankClient {
    http: reqwest::Client,
    config: BankConfig,
}

impl HttpBankClient {
    pub fn new(config: BankConfig) -> Result<Self, BankError> {
        Url::parse(&config.base_url)
            .map_err(|e| BankError::InvalidConfig(format!("base url: {}", e)))?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BankError::InvalidConfig(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Turn a non-2xx response into [`BankError::Status`].
    async fn check(resp: Response) -> Result<Response, BankError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), %body, "bank API request failed");
        Err(BankError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl BankClient for HttpBankClient {
    fn connect_url(&self, state: &str) -> Result<String, BankError> {
        let url = Url::parse_with_params(
            &self.endpoint("link"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("state", state),
            ],
        )
        .map_err(|e| BankError::InvalidConfig(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair, BankError> {
        let resp = self
            .http
            .post(self.endpoint("auth/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BankError::Http(format!("token exchange failed: {}", e)))?;

        Self::check(resp)
            .await?
            .json::<TokenPair>()
            .await
            .map_err(|e| BankError::Decode(format!("token response: {}", e)))
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<BankAccount>, BankError> {
        let resp = self
            .http
            .get(self.endpoint("accounts"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| BankError::Http(format!("list accounts failed: {}", e)))?;

        let body: AccountsResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| BankError::Decode(format!("accounts response: {}", e)))?;
        Ok(body.accounts)
    }

    async fn list_transactions(
        &self,
        access_token: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<BankTransaction>, BankError> {
        let resp = self
            .http
            .get(self.endpoint("transactions"))
            .bearer_auth(access_token)
            .query(filter)
            .send()
            .await
            .map_err(|e| BankError::Http(format!("list transactions failed: {}", e)))?;

        let body: TransactionsResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| BankError::Decode(format!("transactions response: {}", e)))?;
        tracing::debug!(count = body.transactions.len(), "fetched bank transactions");
        Ok(body.transactions)
    }
}
