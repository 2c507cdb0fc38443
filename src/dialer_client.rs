use crate::checkers::ensure_success;
use crate::circuit_breaker::{create_dialer_circuit_breaker, DialerCircuitBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::{DialerType, Lead, ListRouting};
use failsafe::futures::CircuitBreaker;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;

const INTERNAL_POSTBACK_PATH: &str = "/api/webhooks/lead-postback";
const PITCH_BPO_INJECT_PATH: &str = "/HttpImport/InjectLead.php";
const RESPONSE_PREVIEW_CHARS: usize = 100;

/// Pitch BPO (Chase Data Corp) account settings.
#[derive(Debug, Clone)]
pub struct PitchBpoSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub account_id: String,
    pub campaign: String,
    pub subcampaign: String,
}

/// What the dialer said about a forwarded lead.
#[derive(Debug, Clone, Serialize)]
pub struct DialerForward {
    #[serde(rename = "type")]
    pub dialer: DialerType,
    pub forwarded: bool,
    pub status: u16,
    /// Start of the response body.
    pub response: String,
}

fn preview(text: &str) -> String {
    text.chars().take(RESPONSE_PREVIEW_CHARS).collect()
}

/// Forwards accepted leads to the downstream dialer.
#[derive(Clone)]
pub struct DialerClient {
    client: reqwest::Client,
    dialer_base_url: String,
    pitch_bpo: PitchBpoSettings,
    breaker: DialerCircuitBreaker,
}

impl DialerClient {
    pub fn new(dialer_base_url: String, pitch_bpo: PitchBpoSettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create dialer client: {}", e))
            })?;

        Ok(Self {
            client,
            dialer_base_url,
            pitch_bpo,
            breaker: create_dialer_circuit_breaker(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.dialer_base_url.clone(),
            PitchBpoSettings {
                base_url: config.pitch_bpo_base_url.clone(),
                token: config.pitch_bpo_token.clone(),
                account_id: config.pitch_bpo_account_id.clone(),
                campaign: config.pitch_bpo_campaign.clone(),
                subcampaign: config.pitch_bpo_subcampaign.clone(),
            },
        )
    }

    /// Sends `lead` to the dialer its routing points at. Fails fast while the
    /// circuit breaker is open.
    pub async fn forward(
        &self,
        lead: &Lead,
        routing: &ListRouting,
        subid: Option<&str>,
    ) -> Result<DialerForward, AppError> {
        match routing.dialer() {
            DialerType::Internal => self.guarded(self.post_internal(lead, routing)).await,
            DialerType::PitchBpo => self.guarded(self.inject_pitch_bpo(lead, routing, subid)).await,
        }
    }

    async fn guarded<F>(&self, call: F) -> Result<DialerForward, AppError>
    where
        F: Future<Output = Result<DialerForward, AppError>>,
    {
        match self.breaker.call(call).await {
            Ok(forward) => Ok(forward),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Dialer circuit open, not forwarding lead");
                Err(AppError::Unavailable(
                    "Dialer temporarily unavailable".to_string(),
                ))
            }
        }
    }

    async fn post_internal(
        &self,
        lead: &Lead,
        routing: &ListRouting,
    ) -> Result<DialerForward, AppError> {
        let token = routing.token.as_deref().ok_or_else(|| {
            AppError::InternalError(format!("Routing for list {} has no token", routing.list_id))
        })?;
        let campaign_id = routing.campaign_id.as_deref().unwrap_or("");
        let cadence_id = routing.cadence_id.as_deref().unwrap_or("");
        let lead_id = lead.id.to_string();

        let payload = json!({
            "first_name": lead.first_name.as_deref().unwrap_or(""),
            "last_name": lead.last_name.as_deref().unwrap_or(""),
            "email": lead.email.as_deref().unwrap_or(""),
            "phone": lead.phone,
            "address": lead.address.as_deref().unwrap_or(""),
            "city": lead.city.as_deref().unwrap_or(""),
            "state": lead.state.as_deref().unwrap_or(""),
            "zip_code": lead.zip_code.as_deref().unwrap_or(""),
            "source": "Compliance API",
            "trusted_form_cert_url": lead.trusted_form_cert_url.as_deref().unwrap_or(""),
            "custom_fields": { "compliance_lead_id": lead_id },
            "list_id": routing.list_id,
            "campaign_id": campaign_id,
            "cadence_id": cadence_id,
            "compliance_lead_id": lead_id,
        });

        let url = format!("{}{}", self.dialer_base_url, INTERNAL_POSTBACK_PATH);
        tracing::info!("Forwarding lead {} to internal dialer (list {})", lead.id, routing.list_id);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("list_id", routing.list_id.as_str()),
                ("campaign_id", campaign_id),
                ("cadence_id", cadence_id),
                ("token", token),
            ])
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Dialer request failed: {}", e)))?;

        let response = ensure_success(response, "Dialer").await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        tracing::info!("Internal dialer accepted lead {} ({})", lead.id, status);
        Ok(DialerForward {
            dialer: DialerType::Internal,
            forwarded: true,
            status,
            response: preview(&body),
        })
    }

    async fn inject_pitch_bpo(
        &self,
        lead: &Lead,
        routing: &ListRouting,
        subid: Option<&str>,
    ) -> Result<DialerForward, AppError> {
        let settings = &self.pitch_bpo;
        let token = settings
            .token
            .as_deref()
            .ok_or_else(|| AppError::InternalError("PITCH_BPO_TOKEN is not configured".to_string()))?;
        let lead_id = lead.id.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("token", token),
            ("accid", settings.account_id.as_str()),
            ("Campaign", settings.campaign.as_str()),
            ("Subcampaign", settings.subcampaign.as_str()),
            ("adv_SubID", routing.list_id.as_str()),
        ];
        if let Some(subid) = subid.filter(|s| !s.is_empty()) {
            params.push(("adv_SubID2", subid));
        }
        params.extend([
            ("PrimaryPhone", lead.phone.as_str()),
            ("FirstName", lead.first_name.as_deref().unwrap_or("")),
            ("LastName", lead.last_name.as_deref().unwrap_or("")),
            ("email", lead.email.as_deref().unwrap_or("")),
            ("ZipCode", lead.zip_code.as_deref().unwrap_or("")),
            ("State", lead.state.as_deref().unwrap_or("")),
            ("ClientId", lead_id.as_str()),
            ("Notes", "Lead from Compliance Engine"),
            ("ImportOnly", "0"),
            ("DuplicatesCheck", "1"),
            ("AllowDialingDups", "1"),
        ]);

        let url = format!("{}{}", settings.base_url, PITCH_BPO_INJECT_PATH);
        tracing::info!("Forwarding lead {} to Pitch BPO (list {})", lead.id, routing.list_id);

        let response = self
            .client
            .get(&url)
            .header("Accept", "*/*")
            .query(&params)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Pitch BPO request failed: {}", e)))?;

        let response = ensure_success(response, "Pitch BPO").await?;
        let status = response.status().as_u16();
        // Pitch BPO may answer with HTML
        let body = response.text().await.unwrap_or_default();

        Ok(DialerForward {
            dialer: DialerType::PitchBpo,
            forwarded: true,
            status,
            response: preview(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_char_safe() {
        let body = "é".repeat(150);
        assert_eq!(preview(&body).chars().count(), RESPONSE_PREVIEW_CHARS);
        assert_eq!(preview("ok"), "ok");
    }
}
