//! WHOOP data tools.
//!
//! Each tool reads the persisted OAuth token, queries the WHOOP developer
//! API and renders the response as text (see [`format`]).
//!
//! WHOOP identifies sports only by number. Sport ids seen in workouts are
//! cached per client and listed by `get_sports_mapping`.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde_json::{json, Map, Value};

use crate::tools::format;
use crate::tools::token::{TokenStore, TokenStoreError};
use crate::tools::{RegistryError, Tool, ToolDescriptor, ToolRegistryBuilder};

const NOT_AUTHENTICATED: &str = "You are not authenticated with WHOOP. \
     Visit /whoop/auth on this server to connect your account.";

/// Workouts scanned when building the sport mapping.
const SPORT_DISCOVERY_LIMIT: &str = "25";

/// Sport IDs identified by the community. WHOOP does not publish names.
const KNOWN_SPORTS: &[(i32, &str)] = &[
    (0, "Other"),
    (1, "Running"),
    (2, "Cycling"),
    (3, "Weightlifting"),
    (4, "Swimming"),
    (9, "Walking"),
    (12, "Tennis"),
    (27, "Basketball"),
    (33, "Football"),
    (41, "Soccer"),
    (45, "HIIT"),
    (47, "Yoga"),
    (55, "Pilates"),
    (71, "Golf"),
    (103, "Meditation"),
    (104, "CrossFit"),
    (124, "Strength Training"),
];

/// Thin client for the WHOOP developer API.
#[derive(Debug)]
pub struct WhoopClient {
    http: reqwest::Client,
    api_base: String,
    tokens: TokenStore,
    sports: DashMap<i32, String>,
}

impl WhoopClient {
    /// Creates a client.
    #[must_use]
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, tokens: TokenStore) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
            sports: DashMap::new(),
        }
    }

    /// Display name for a sport id, remembering the id.
    pub fn sport_name(&self, id: i32) -> String {
        self.sports
            .entry(id)
            .or_insert_with(|| format!("Sport {id}"))
            .clone()
    }

    /// Sport ids seen so far with their names, ordered by id.
    #[must_use]
    pub fn known_sports(&self) -> Vec<(i32, String)> {
        let mut sports: Vec<_> = self
            .sports
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        sports.sort_unstable();
        sports
    }

    /// The token store backing this client.
    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// GETs `path` with the stored bearer token.
    ///
    /// Returns `Ok(None)` when there is no usable token.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Option<Value>> {
        let token = match self.tokens.load().await {
            Ok(Some(token)) => token,
            Ok(None) | Err(TokenStoreError::Corrupt { .. }) => return Ok(None),
            Err(e) => return Err(e).context("reading WHOOP token"),
        };

        let url = format!("{}{path}", self.api_base);
        tracing::debug!(%url, "WHOOP API request");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token.access_token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("requesting {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("WHOOP API returned {status} for {path}: {body}");
        }

        let body = response
            .json()
            .await
            .with_context(|| format!("decoding {path} response"))?;
        Ok(Some(body))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    AuthStatus,
    Profile,
    BodyMeasurement,
    Sleep,
    Recovery,
    Cycle,
    Workout,
    SportsMapping,
    SearchSports,
}

impl Kind {
    const ALL: [Self; 9] = [
        Self::AuthStatus,
        Self::Profile,
        Self::BodyMeasurement,
        Self::Sleep,
        Self::Recovery,
        Self::Cycle,
        Self::Workout,
        Self::SportsMapping,
        Self::SearchSports,
    ];
}

/// One WHOOP tool.
pub struct WhoopTool {
    kind: Kind,
    client: Arc<WhoopClient>,
}

fn date_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "date": {
                "type": "string",
                "description": "Optional date in YYYY-MM-DD format. Defaults to the most recent record."
            }
        },
        "required": []
    })
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

/// Query parameters restricting a collection endpoint to one calendar day.
fn day_query(arguments: &Map<String, Value>) -> anyhow::Result<Vec<(&'static str, String)>> {
    let Some(raw) = arguments.get("date").filter(|v| !v.is_null()) else {
        return Ok(vec![("limit", "1".to_string())]);
    };
    let raw = raw.as_str().context("date must be a string")?;
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))?;

    Ok(vec![
        ("start", format!("{date}T00:00:00Z")),
        ("end", format!("{date}T23:59:59Z")),
        ("limit", "1".to_string()),
    ])
}

/// Cached sports first, then community-known ids not already cached.
fn search_sports(client: &WhoopClient, query: &str) -> String {
    let needle = query.to_lowercase();
    let mut matches: Vec<(i32, String)> = client
        .known_sports()
        .into_iter()
        .filter(|(_, name)| name.to_lowercase().contains(&needle))
        .collect();
    matches.extend(
        KNOWN_SPORTS
            .iter()
            .filter(|(id, name)| {
                !client.sports.contains_key(id) && name.to_lowercase().contains(&needle)
            })
            .map(|(id, name)| (*id, (*name).to_string())),
    );
    matches.sort_unstable();

    if matches.is_empty() {
        return format!(
            "No matching sports found for '{query}'. Note that WHOOP sport names are based on \
             community knowledge, not official API data."
        );
    }

    let mut out = format!("WHOOP sports matching '{query}':\n\n");
    for (id, name) in matches {
        out.push_str(&format!("ID {id}: {name}\n"));
    }
    out.push_str("\nNote: These are community-identified sport IDs and may not be 100% accurate.");
    out
}

impl WhoopTool {
    async fn fetch<F>(&self, path: &str, query: &[(&str, String)], render: F) -> anyhow::Result<Value>
    where
        F: FnOnce(&Value) -> anyhow::Result<String> + Send,
    {
        match self.client.get(path, query).await? {
            Some(body) => render(&body).map(Value::String),
            None => Ok(Value::String(NOT_AUTHENTICATED.to_string())),
        }
    }

    async fn sports_mapping(&self) -> anyhow::Result<Value> {
        let query = [("limit", SPORT_DISCOVERY_LIMIT.to_string())];
        let Some(body) = self.client.get("/v1/activity/workout", &query).await? else {
            return Ok(Value::String(NOT_AUTHENTICATED.to_string()));
        };
        for id in format::workout_sports(&body)? {
            self.client.sport_name(id);
        }

        let sports = self.client.known_sports();
        if sports.is_empty() {
            return Ok(Value::String(
                "No sports found in your recent workout history. Try working out with \
                 different sports to build the mapping."
                    .to_string(),
            ));
        }

        let mut out = "WHOOP Sports from your workout history:\n\n".to_string();
        for (id, name) in sports {
            out.push_str(&format!("ID {id}: {name}\n"));
        }
        out.push_str(
            "\nNote: WHOOP API does not provide human-readable sport names, so we can only \
             identify by ID number.",
        );
        Ok(Value::String(out))
    }

    async fn auth_status(&self) -> Value {
        let text = match self.client.tokens().load().await {
            Ok(Some(token)) => format!(
                "You are authenticated with WHOOP.\nToken type: {}",
                token.token_type.as_deref().unwrap_or("unknown")
            ),
            Ok(None) => NOT_AUTHENTICATED.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable WHOOP token file");
                "Error reading the token file. It might be corrupted. Please authenticate again."
                    .to_string()
            }
        };
        Value::String(text)
    }
}

#[async_trait]
impl Tool for WhoopTool {
    fn descriptor(&self) -> ToolDescriptor {
        match self.kind {
            Kind::AuthStatus => ToolDescriptor::new(
                "check_authentication_status",
                "Check if you are authenticated with WHOOP.",
                empty_schema(),
            ),
            Kind::Profile => ToolDescriptor::new(
                "get_profile_data",
                "Get user profile data from WHOOP.",
                empty_schema(),
            ),
            Kind::BodyMeasurement => ToolDescriptor::new(
                "get_body_measurement_data",
                "Get body measurement data (height, weight, max heart rate) from WHOOP.",
                empty_schema(),
            ),
            Kind::Sleep => ToolDescriptor::new(
                "get_sleep_data",
                "Get sleep data from WHOOP for a date, or the most recent sleep.",
                date_schema(),
            ),
            Kind::Recovery => ToolDescriptor::new(
                "get_recovery_data",
                "Get recovery data from WHOOP for a date, or the most recent recovery.",
                date_schema(),
            ),
            Kind::Cycle => ToolDescriptor::new(
                "get_cycle_data",
                "Get daily cycle data (including strain) from WHOOP.",
                date_schema(),
            ),
            Kind::Workout => ToolDescriptor::new(
                "get_workout_data",
                "Get a workout by ID, or the most recent workout, from WHOOP.",
                json!({
                    "type": "object",
                    "properties": {
                        "workout_id": {
                            "type": "string",
                            "description": "Optional workout ID. Defaults to the most recent workout."
                        }
                    },
                    "required": []
                }),
            ),
            Kind::SportsMapping => ToolDescriptor::new(
                "get_sports_mapping",
                "Get a mapping of the sport IDs found in your recent WHOOP workouts.",
                empty_schema(),
            ),
            Kind::SearchSports => ToolDescriptor::new(
                "search_whoop_sports",
                "Search community-identified WHOOP sport IDs by name.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search term, e.g. \"yoga\""
                        }
                    },
                    "required": ["query"]
                }),
            ),
        }
    }

    async fn call(&self, arguments: Map<String, Value>) -> anyhow::Result<Value> {
        match self.kind {
            Kind::AuthStatus => Ok(self.auth_status().await),
            Kind::Profile => {
                self.fetch("/v1/user/profile/basic", &[], format::profile)
                    .await
            }
            Kind::BodyMeasurement => {
                self.fetch("/v1/user/measurement/body", &[], format::body_measurement)
                    .await
            }
            Kind::Sleep => {
                self.fetch("/v1/activity/sleep", &day_query(&arguments)?, format::sleep)
                    .await
            }
            Kind::Recovery => {
                self.fetch("/v1/recovery", &day_query(&arguments)?, format::recovery)
                    .await
            }
            Kind::Cycle => {
                self.fetch("/v1/cycle", &day_query(&arguments)?, format::cycle)
                    .await
            }
            Kind::Workout => {
                let (path, query) = match arguments.get("workout_id").and_then(Value::as_str) {
                    Some(id) if !id.is_empty() => {
                        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                            anyhow::bail!("workout_id contains unexpected characters");
                        }
                        (format!("/v1/activity/workout/{id}"), Vec::new())
                    }
                    _ => (
                        "/v1/activity/workout".to_string(),
                        vec![("limit", "1".to_string())],
                    ),
                };
                let client = &self.client;
                self.fetch(&path, &query, |body| {
                    format::workout(body, |id| client.sport_name(id))
                })
                .await
            }
            Kind::SportsMapping => self.sports_mapping().await,
            Kind::SearchSports => {
                let query = arguments
                    .get("query")
                    .and_then(Value::as_str)
                    .context("query is required")?;
                Ok(Value::String(search_sports(&self.client, query)))
            }
        }
    }
}

/// Registers every WHOOP tool, in listing order.
///
/// # Errors
///
/// Returns an error if a WHOOP tool name collides with one already registered.
pub fn register_tools(
    builder: &mut ToolRegistryBuilder,
    client: &Arc<WhoopClient>,
) -> Result<(), RegistryError> {
    for kind in Kind::ALL {
        builder.register(WhoopTool {
            kind,
            client: Arc::clone(client),
        })?;
    }
    Ok(())
}
