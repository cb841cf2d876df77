//! Google Calendar REST v3 client.
//!
//! Blocking [`CalendarService`] implementation over the async reqwest
//! client, driven by an owned current-thread runtime. Authentication is
//! OAuth2 with tokens in the OS keyring; client credentials are stored
//! there too, so nothing secret lands on disk.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::keyring_store;
use super::oauth::{self, OAuthConfig};
use super::{BusyEvent, CalendarInfo, CalendarService, CreatedEvent, EventDraft};
use crate::error::CalendarError;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
const TOKEN_SERVICE: &str = "google";

/// Minutes before the event start for the popup reminder attached to every
/// entry this engine creates.
const REMINDER_MINUTES: i64 = 10;

pub struct GoogleCalendar {
    client_id: String,
    client_secret: String,
    base_url: String,
    /// Fixed bearer token used instead of the OAuth flow, for tests.
    static_token: Option<String>,
    http: Client,
    runtime: tokio::runtime::Runtime,
}

impl GoogleCalendar {
    /// Load client credentials from the keyring. Missing credentials are
    /// tolerated here; API calls will fail with `NotAuthenticated` until
    /// [`GoogleCalendar::set_credentials`] and [`GoogleCalendar::authenticate`]
    /// have run.
    pub fn new() -> Result<Self, CalendarError> {
        let client_id = keyring_store::get("google_client_id")
            .map_err(|e| CalendarError::OAuth(format!("keyring read failed: {e}")))?
            .unwrap_or_default();
        let client_secret = keyring_store::get("google_client_secret")
            .map_err(|e| CalendarError::OAuth(format!("keyring read failed: {e}")))?
            .unwrap_or_default();

        Ok(Self {
            client_id,
            client_secret,
            base_url: DEFAULT_BASE_URL.to_string(),
            static_token: None,
            http: Client::new(),
            runtime: blocking_runtime()?,
        })
    }

    #[cfg(test)]
    fn with_base_url(base_url: &str, token: &str) -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: base_url.to_string(),
            static_token: Some(token.to_string()),
            http: Client::new(),
            runtime: blocking_runtime().unwrap(),
        }
    }

    /// Persist OAuth client credentials to the OS keyring.
    pub fn set_credentials(client_id: &str, client_secret: &str) -> Result<(), CalendarError> {
        keyring_store::set("google_client_id", client_id)
            .map_err(|e| CalendarError::OAuth(format!("keyring write failed: {e}")))?;
        keyring_store::set("google_client_secret", client_secret)
            .map_err(|e| CalendarError::OAuth(format!("keyring write failed: {e}")))?;
        Ok(())
    }

    pub fn is_authenticated() -> bool {
        oauth::load_tokens(TOKEN_SERVICE).is_some()
    }

    /// Run the interactive OAuth flow in the browser.
    pub fn authenticate(&self) -> Result<(), CalendarError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CalendarError::OAuth(
                "client_id / client_secret not configured, run auth set-credentials first"
                    .to_string(),
            ));
        }
        let config = self.oauth_config();
        self.runtime.block_on(oauth::authorize(&config))?;
        Ok(())
    }

    /// Drop stored tokens.
    pub fn disconnect() -> Result<(), CalendarError> {
        keyring_store::delete(TOKEN_SERVICE)
            .map_err(|e| CalendarError::OAuth(format!("keyring delete failed: {e}")))
    }

    fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            service_name: TOKEN_SERVICE.to_string(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/calendar".to_string()],
            redirect_port: 19821,
        }
    }

    /// A valid access token, refreshed if expired.
    fn access_token(&self) -> Result<String, CalendarError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let tokens = oauth::load_tokens(TOKEN_SERVICE).ok_or(CalendarError::NotAuthenticated {
            service: "google".to_string(),
        })?;
        if !oauth::is_expired(&tokens) {
            return Ok(tokens.access_token);
        }

        let refresh = tokens
            .refresh_token
            .as_deref()
            .ok_or_else(|| CalendarError::OAuth("no refresh token available".to_string()))?;
        let config = self.oauth_config();
        let refreshed = self.runtime.block_on(oauth::refresh_token(&config, refresh))?;
        Ok(refreshed.access_token)
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, CalendarError> {
        let token = self.access_token()?;
        debug!(url, "calendar GET");
        let body: Value = self.runtime.block_on(async {
            let resp = self
                .http
                .get(url)
                .query(query)
                .bearer_auth(&token)
                .send()
                .await?;
            resp.json()
                .await
                .map_err(|e| CalendarError::InvalidResponse(e.to_string()))
        })?;
        check_api_error(&body)?;
        Ok(body)
    }

    fn send_json(
        &self,
        method: reqwest::Method,
        url: &str,
        payload: &Value,
    ) -> Result<Value, CalendarError> {
        let token = self.access_token()?;
        debug!(url, method = %method, "calendar write");
        let body: Value = self.runtime.block_on(async {
            let resp = self
                .http
                .request(method, url)
                .bearer_auth(&token)
                .json(payload)
                .send()
                .await?;
            resp.json()
                .await
                .map_err(|e| CalendarError::InvalidResponse(e.to_string()))
        })?;
        check_api_error(&body)?;
        Ok(body)
    }
}

fn blocking_runtime() -> Result<tokio::runtime::Runtime, CalendarError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CalendarError::Unavailable(format!("cannot start runtime: {e}")))
}

fn check_api_error(body: &Value) -> Result<(), CalendarError> {
    if let Some(err) = body.get("error") {
        return Err(CalendarError::Api(err.to_string()));
    }
    Ok(())
}

/// Parse one event resource. Timed events carry `dateTime`; all-day events
/// carry a bare `date`, mapped to midnight UTC.
fn parse_event(item: &Value) -> Result<BusyEvent, CalendarError> {
    let id = item
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CalendarError::InvalidResponse("event missing id".to_string()))?
        .to_string();
    let title = item
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("(No title)")
        .to_string();

    let all_day = item
        .get("start")
        .and_then(|s| s.get("date"))
        .is_some();
    let start = parse_event_time(item, "start")?;
    let end = parse_event_time(item, "end")?;

    Ok(BusyEvent {
        id,
        title,
        start,
        end,
        all_day,
    })
}

fn parse_event_time(item: &Value, field: &str) -> Result<DateTime<Utc>, CalendarError> {
    let node = item
        .get(field)
        .ok_or_else(|| CalendarError::InvalidResponse(format!("event missing {field}")))?;

    if let Some(s) = node.get("dateTime").and_then(|v| v.as_str()) {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CalendarError::InvalidResponse(format!("bad {field} time: {e}")));
    }
    if let Some(s) = node.get("date").and_then(|v| v.as_str()) {
        let date: NaiveDate = s
            .parse()
            .map_err(|e| CalendarError::InvalidResponse(format!("bad {field} date: {e}")))?;
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(CalendarError::InvalidResponse(format!(
        "event {field} has neither date nor dateTime"
    )))
}

impl CalendarService for GoogleCalendar {
    fn list_calendars(&self) -> Result<Vec<CalendarInfo>, CalendarError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let body = self.get_json(&url, &[])?;

        let items = body
            .get("items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CalendarError::InvalidResponse("missing items".to_string()))?;
        Ok(items
            .iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?.to_string();
                let name = item
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&id)
                    .to_string();
                let primary = item
                    .get("primary")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Some(CalendarInfo { id, name, primary })
            })
            .collect())
    }

    fn list_events(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyEvent>, CalendarError> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);
        let query = [
            ("timeMin", from.to_rfc3339()),
            ("timeMax", to.to_rfc3339()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        let body = self.get_json(&url, &query)?;

        let items = body
            .get("items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| CalendarError::InvalidResponse("missing items".to_string()))?;
        items.iter().map(parse_event).collect()
    }

    fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, CalendarError> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);
        let payload = json!({
            "summary": draft.title,
            "description": draft.description,
            "start": {
                "dateTime": draft.start.to_rfc3339(),
                "timeZone": draft.timezone,
            },
            "end": {
                "dateTime": draft.end.to_rfc3339(),
                "timeZone": draft.timezone,
            },
            "visibility": "private",
            "reminders": {
                "useDefault": false,
                "overrides": [
                    {"method": "popup", "minutes": REMINDER_MINUTES},
                ],
            },
        });
        let body = self.send_json(reqwest::Method::POST, &url, &payload)?;

        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CalendarError::InvalidResponse("missing event id".to_string()))?
            .to_string();
        let html_url = body
            .get("htmlLink")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(CreatedEvent { id, url: html_url })
    }

    fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), CalendarError> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url, calendar_id, event_id
        );
        let payload = json!({
            "start": {"dateTime": start.to_rfc3339()},
            "end": {"dateTime": end.to_rfc3339()},
        });
        self.send_json(reqwest::Method::PATCH, &url, &payload)?;
        Ok(())
    }

    fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<BusyEvent, CalendarError> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url, calendar_id, event_id
        );
        let body = self.get_json(&url, &[])?;
        parse_event(&body)
    }
}
