//! SMS notifications for student lifecycle events.
//!
//! Messages go through the Twilio REST API, or to the log when no provider is configured.
//! Delivery is best effort: [`SmsService::notify_student`] logs and counts failures and never
//! returns them, so a registration or edit succeeds even when the SMS does not.

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{SmsConfig, SmsProviderConfig},
    errors::Error,
    types::StudentAction,
};

pub struct SmsService {
    enabled: bool,
    system_name: String,
    default_country_code: Option<String>,
    transport: SmsTransport,
}

enum SmsTransport {
    Twilio {
        client: reqwest::Client,
        messages_url: String,
        account_sid: String,
        auth_token: String,
        from_number: String,
    },
    Log,
}

/// Form body of Twilio's Create Message call
#[derive(Serialize)]
struct TwilioMessageForm<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "Body")]
    body: &'a str,
}

#[derive(Deserialize)]
struct TwilioMessageResponse {
    sid: Option<String>,
}

#[derive(Deserialize)]
struct TwilioErrorResponse {
    code: Option<i64>,
    message: Option<String>,
}

impl SmsService {
    pub fn new(config: &SmsConfig) -> Result<Self, Error> {
        let transport = match &config.provider {
            SmsProviderConfig::Twilio {
                account_sid,
                auth_token,
                from_number,
                api_base_url,
            } => {
                crate::install_crypto_provider();
                let client = reqwest::Client::builder()
                    .timeout(config.timeout)
                    .build()
                    .map_err(|e| Error::Internal {
                        operation: format!("create SMS HTTP client: {e}"),
                    })?;

                SmsTransport::Twilio {
                    client,
                    messages_url: format!(
                        "{}/2010-04-01/Accounts/{account_sid}/Messages.json",
                        api_base_url.trim_end_matches('/')
                    ),
                    account_sid: account_sid.clone(),
                    auth_token: auth_token.clone(),
                    from_number: from_number.clone(),
                }
            }
            SmsProviderConfig::Log => SmsTransport::Log,
        };

        Ok(Self {
            enabled: config.enabled,
            system_name: config.system_name.clone(),
            default_country_code: config.default_country_code.clone(),
            transport,
        })
    }

    /// Text sent to a student for the given event
    pub fn message_for(&self, action: StudentAction, name: &str) -> String {
        match action {
            StudentAction::Registered => {
                format!("Hi {name}, welcome! Your registration is successful in the {}.", self.system_name)
            }
            StudentAction::Updated => format!("Hi {name}, your student profile has been updated."),
            StudentAction::Deleted => format!("Hi {name}, your student profile has been deleted from the system."),
        }
    }

    /// Prefix the default country code onto numbers that are not already international
    pub fn normalize_phone(&self, phone: &str) -> String {
        let phone = phone.trim();
        match &self.default_country_code {
            Some(code) if !phone.starts_with('+') => format!("{code}{phone}"),
            _ => phone.to_string(),
        }
    }

    /// Send one message. Errors carry the provider's reason.
    #[instrument(skip(self, body), err)]
    pub async fn send(&self, to: &str, body: &str) -> Result<(), Error> {
        match &self.transport {
            SmsTransport::Twilio {
                client,
                messages_url,
                account_sid,
                auth_token,
                from_number,
            } => {
                let form = serde_urlencoded::to_string(TwilioMessageForm {
                    to,
                    from: from_number,
                    body,
                })
                .map_err(|e| Error::Internal {
                    operation: format!("encode SMS request: {e}"),
                })?;

                let response = client
                    .post(messages_url)
                    .basic_auth(account_sid, Some(auth_token))
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(form)
                    .send()
                    .await
                    .map_err(|e| Error::Internal {
                        operation: format!("send SMS via Twilio: {e}"),
                    })?;

                let status = response.status();
                if !status.is_success() {
                    let reason = match response.json::<TwilioErrorResponse>().await {
                        Ok(TwilioErrorResponse {
                            code: Some(code),
                            message: Some(message),
                        }) => format!("{message} (code {code})"),
                        Ok(TwilioErrorResponse { message: Some(message), .. }) => message,
                        _ => status.to_string(),
                    };
                    return Err(Error::Internal {
                        operation: format!("send SMS via Twilio: HTTP {status}: {reason}"),
                    });
                }

                let sid = response.json::<TwilioMessageResponse>().await.ok().and_then(|r| r.sid);
                debug!(sid = sid.as_deref().unwrap_or("unknown"), "Twilio accepted message");
                Ok(())
            }
            SmsTransport::Log => {
                info!(to, body, "SMS (log transport)");
                Ok(())
            }
        }
    }

    /// Notify a student about a change to their record. Never fails.
    #[instrument(skip(self, phone))]
    pub async fn notify_student(&self, action: StudentAction, name: &str, phone: &str) {
        let outcome = if !self.enabled {
            debug!("SMS disabled, skipping notification");
            "skipped"
        } else if phone.trim().is_empty() {
            warn!("Student has no phone number, skipping notification");
            "skipped"
        } else {
            let to = self.normalize_phone(phone);
            let body = self.message_for(action, name);
            match self.send(&to, &body).await {
                Ok(()) => "sent",
                Err(e) => {
                    warn!("Failed to send {action} SMS: {e:#}");
                    "failed"
                }
            }
        };

        metrics::counter!("rollbook_sms_messages_total", "action" => action.as_str(), "outcome" => outcome).increment(1);
    }
}
