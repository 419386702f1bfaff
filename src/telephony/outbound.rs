//! Outbound call trigger via the Exotel Calls API
//!
//! Places a call to the customer and, once answered, bridges it into the
//! account's pre-built voice app (flow). No call state is kept here; the
//! provider rings this gateway back over the media stream websocket.

use std::time::Duration;

use secrecy::ExposeSecret;

use crate::config::{ExotelConfig, OutboundConfig};
use crate::{Error, Result};

/// Client for the Exotel REST API
#[derive(Debug)]
pub struct ExotelClient {
    client: reqwest::Client,
    config: ExotelConfig,
    outbound: OutboundConfig,
}

impl ExotelClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any credential field is blank. This
    /// re-checks what startup already validated so a hand-built config cannot
    /// reach the network half-configured.
    pub fn new(config: ExotelConfig, outbound: OutboundConfig) -> Result<Self> {
        let mut incomplete = Vec::new();
        if config.api_key.expose_secret().is_empty() {
            incomplete.push("api_key");
        }
        if config.api_token.expose_secret().is_empty() {
            incomplete.push("api_token");
        }
        if config.account_sid.is_empty() {
            incomplete.push("account_sid");
        }
        if config.caller_id.is_empty() {
            incomplete.push("caller_id");
        }
        if config.app_id.is_empty() {
            incomplete.push("app_id");
        }
        if !incomplete.is_empty() {
            return Err(Error::Config(format!(
                "incomplete Exotel credentials: {}",
                incomplete.join(", ")
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            outbound,
        })
    }

    /// Place an outbound call bridged into the pre-existing voice app
    ///
    /// Dials `customer_number` from the configured caller ID; when the
    /// customer answers, the provider connects the call to the voice app and
    /// opens the media stream back to this gateway.
    ///
    /// A 2xx response is success even when the body is empty or not JSON,
    /// which this API does in practice; a synthetic success value is returned
    /// in those cases.
    ///
    /// # Errors
    ///
    /// Returns a telephony error on any non-2xx status, network failure, or
    /// timeout. No retries are attempted.
    pub async fn connect_call(
        &self,
        customer_number: &str,
        custom_field: Option<&str>,
    ) -> Result<serde_json::Value> {
        let url = format!(
            "{}/v1/Accounts/{}/Calls/connect.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        );

        let mut form: Vec<(&str, String)> = vec![
            ("From", customer_number.to_string()),
            ("CallerId", self.config.caller_id.clone()),
            ("Url", self.config.voice_app_url()),
            ("CallType", "trans".to_string()),
            ("TimeLimit", self.outbound.time_limit_secs.to_string()),
            ("TimeOut", self.outbound.ring_timeout_secs.to_string()),
        ];
        if let Some(value) = custom_field {
            form.push(("CustomField", value.to_string()));
        }

        tracing::info!(
            number = %customer_number,
            app_id = %self.config.app_id,
            "placing outbound call"
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(
                self.config.api_key.expose_secret(),
                Some(self.config.api_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Telephony(format!("Exotel request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, %body, "Exotel call API rejected the request");
            return Err(Error::Telephony(format!(
                "Exotel API error {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Telephony(format!("failed to read Exotel response: {e}")))?;

        if body.trim().is_empty() {
            tracing::info!(number = %customer_number, "call initiated, empty provider response");
            return Ok(serde_json::json!({
                "status": "success",
                "message": "call initiated (empty provider response)",
            }));
        }

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => {
                tracing::info!(number = %customer_number, "call initiated");
                Ok(value)
            }
            Err(_) => {
                tracing::info!(number = %customer_number, "call initiated, non-JSON provider response");
                Ok(serde_json::json!({
                    "status": "success",
                    "raw_response": body,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn exotel_config() -> ExotelConfig {
        ExotelConfig {
            api_key: SecretString::from("key"),
            api_token: SecretString::from("token"),
            account_sid: "acme".to_string(),
            caller_id: "09513886363".to_string(),
            app_id: "12345".to_string(),
            subdomain: "api.exotel.com".to_string(),
            api_base: "https://api.exotel.com".to_string(),
        }
    }

    fn outbound_config() -> OutboundConfig {
        OutboundConfig {
            require_e164: true,
            allowed_country_codes: Vec::new(),
            default_custom_field: None,
            ring_timeout_secs: 30,
            time_limit_secs: 3600,
        }
    }

    #[test]
    fn complete_credentials_accepted() {
        assert!(ExotelClient::new(exotel_config(), outbound_config()).is_ok());
    }

    #[test]
    fn blank_credentials_rejected_before_any_network_call() {
        let mut config = exotel_config();
        config.api_token = SecretString::from("");
        config.app_id = String::new();

        let err = ExotelClient::new(config, outbound_config()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("api_token"));
        assert!(message.contains("app_id"));
        assert!(!message.contains("api_key"));
    }
}
