//! Scripted scenarios that exercise the cache against a live origin server.
//!
//! Each scenario prints an event log: the lines a UI would show in its
//! events panel as watched queries move between loading and ready.

use std::fmt::Write as _;
use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;
use tracing::info;

use cache_probe_client::queries::{
    AuthenticatedUser, HydrateSession, Login, Logout, UpsertProduct, authenticated_user,
    hydrate_session, login, logout, upsert_product,
};
use cache_probe_client::updates::{append_product_to_query, append_upserted_product};
use cache_probe_client::{
    ClientError, FetchPolicy, MutationOptions, ObservableQuery, ProbeClient, QueryState,
};

/// How long a scenario waits for a watched query to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("timed out waiting for `{0}` to settle")]
    Timeout(String),

    #[error("query `{0}` stopped publishing")]
    Closed(String),
}

/// Available scenarios, by command-line name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Argument-insensitive caching with `@connection` and list merging
    ConnectionDirective,
    /// `loading` transitions when a mutation invalidates a watched query
    LoadingState,
    /// Dropping a watched query stops its refetches
    ViewHierarchy,
}

impl Scenario {
    pub const ALL: [Self; 3] = [
        Self::ConnectionDirective,
        Self::LoadingState,
        Self::ViewHierarchy,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConnectionDirective => "connection-directive",
            Self::LoadingState => "loading-state",
            Self::ViewHierarchy => "view-hierarchy",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConnectionDirective => {
                "upsert a product, then refetch the list with different arguments"
            }
            Self::LoadingState => "log in and out while watching the authenticated user",
            Self::ViewHierarchy => "unmount the profile view, then log out and back in",
        }
    }

    /// Run the scenario and return its event log.
    ///
    /// # Errors
    ///
    /// Returns `DemoError` if a request fails or a watched query never settles.
    pub async fn run(self, client: &ProbeClient) -> Result<EventLog, DemoError> {
        info!(scenario = self.name(), "running scenario");
        match self {
            Self::ConnectionDirective => connection_directive(client).await,
            Self::LoadingState => loading_state(client).await,
            Self::ViewHierarchy => view_hierarchy(client).await,
        }
    }
}

/// Ordered scenario events.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<String>,
}

impl EventLog {
    pub fn push(&mut self, event: impl Into<String>) {
        let event = event.into();
        info!(%event, "event");
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    #[allow(clippy::print_stdout)]
    pub fn print(&self) {
        for event in self.events() {
            println!("{event}");
        }
    }
}

/// Logs each change of a watched query's `loading` flag.
struct LoadingTracker {
    operation: &'static str,
    seen: usize,
    last: Option<bool>,
}

impl LoadingTracker {
    const fn new(operation: &'static str) -> Self {
        Self {
            operation,
            seen: 0,
            last: None,
        }
    }

    fn observe(&mut self, query: &ObservableQuery, log: &mut EventLog) {
        let history = query.history();
        for state in history.iter().skip(self.seen) {
            if self.last != Some(state.loading) {
                log.push(state.describe(self.operation));
                self.last = Some(state.loading);
            }
        }
        self.seen = history.len();
    }
}

async fn settle(query: &mut ObservableQuery, operation: &str) -> Result<QueryState, DemoError> {
    tokio::time::timeout(SETTLE_TIMEOUT, query.wait_for(|state| !state.loading))
        .await
        .map_err(|_| DemoError::Timeout(operation.to_owned()))?
        .ok_or_else(|| DemoError::Closed(operation.to_owned()))
}

fn product_ids(state: &QueryState) -> String {
    let Ok(data) = state.data_as::<hydrate_session::ResponseData>() else {
        return "none".to_owned();
    };
    let ids: Vec<String> = data
        .session
        .and_then(|s| s.products)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|p| p.id)
        .map(|id| id.to_string())
        .collect();
    format!("[{}]", ids.join(", "))
}

fn user_line(state: &QueryState) -> String {
    let user = state
        .data_as::<authenticated_user::ResponseData>()
        .ok()
        .and_then(|data| data.session)
        .and_then(|session| session.authenticated_user);
    let mut line = String::from("user: ");
    match user {
        Some(user) => {
            let _ = write!(
                line,
                "{} (id {})",
                user.username.as_deref().unwrap_or("?"),
                user.id.map_or_else(|| "?".to_owned(), |id| id.to_string())
            );
        }
        None => line.push_str("none"),
    }
    line
}

async fn connection_directive(client: &ProbeClient) -> Result<EventLog, DemoError> {
    let mut log = EventLog::default();
    let mut tracker = LoadingTracker::new("HydrateSession");

    let mut products = client
        .watch_typed::<HydrateSession>(
            hydrate_session::Variables {
                is_decrementing_inventory: None,
            },
            FetchPolicy::CacheFirst,
        )
        .await?;
    let state = settle(&mut products, "HydrateSession").await?;
    tracker.observe(&products, &mut log);
    log.push(format!("products in cache: {}", product_ids(&state)));

    log.push("calling UpsertProduct with id 2");
    let options = MutationOptions::new()
        .update(append_upserted_product)
        .update_query("HydrateSession", append_product_to_query);
    client
        .mutate_typed::<UpsertProduct>(
            upsert_product::Variables {
                product: upsert_product::ProductInput { id: Some(2) },
            },
            options,
        )
        .await?;
    tracker.observe(&products, &mut log);
    log.push(format!(
        "products in cache: {}",
        product_ids(&products.current())
    ));

    log.push("refetching products with isDecrementingInventory: true");
    client
        .query_typed::<HydrateSession>(
            hydrate_session::Variables {
                is_decrementing_inventory: Some(true),
            },
            FetchPolicy::NetworkOnly,
        )
        .await?;
    tracker.observe(&products, &mut log);
    log.push(format!(
        "products in cache: {}",
        product_ids(&products.current())
    ));
    Ok(log)
}

async fn loading_state(client: &ProbeClient) -> Result<EventLog, DemoError> {
    let mut log = EventLog::default();
    let mut tracker = LoadingTracker::new("AuthenticatedUser");

    let mut user = client
        .watch_typed::<AuthenticatedUser>(authenticated_user::Variables, FetchPolicy::CacheFirst)
        .await?;
    let state = settle(&mut user, "AuthenticatedUser").await?;
    tracker.observe(&user, &mut log);
    log.push(user_line(&state));

    log.push("calling Login");
    client
        .mutate_typed::<Login>(login::Variables, MutationOptions::new())
        .await?;
    let state = settle(&mut user, "AuthenticatedUser").await?;
    tracker.observe(&user, &mut log);
    log.push(user_line(&state));

    log.push("calling Logout");
    client
        .mutate_typed::<Logout>(logout::Variables, MutationOptions::new())
        .await?;
    let state = settle(&mut user, "AuthenticatedUser").await?;
    tracker.observe(&user, &mut log);
    log.push(user_line(&state));
    Ok(log)
}

async fn mount_profile(client: &ProbeClient, log: &mut EventLog) -> Result<ObservableQuery, DemoError> {
    let mut tracker = LoadingTracker::new("AuthenticatedUser");
    let mut profile = client
        .watch_typed::<AuthenticatedUser>(authenticated_user::Variables, FetchPolicy::CacheFirst)
        .await?;
    let state = settle(&mut profile, "AuthenticatedUser").await?;
    tracker.observe(&profile, log);
    log.push(user_line(&state));
    Ok(profile)
}

async fn view_hierarchy(client: &ProbeClient) -> Result<EventLog, DemoError> {
    let mut log = EventLog::default();
    let transport = client.transport();

    log.push("calling Login");
    client
        .mutate_typed::<Login>(login::Variables, MutationOptions::new())
        .await?;

    log.push("showing profile");
    let profile = mount_profile(client, &mut log).await?;

    log.push("hiding profile");
    drop(profile);
    log.push(format!("watched queries: {}", client.active_watch_count()));

    let before = transport.request_count();
    log.push("calling Logout");
    let data = client
        .mutate_typed::<Logout>(logout::Variables, MutationOptions::new())
        .await?;
    let signed_in = data
        .logout
        .and_then(|session| session.authenticated_user)
        .is_some();
    log.push(format!(
        "logout returned user: {}",
        if signed_in { "present" } else { "none" }
    ));
    log.push(format!(
        "requests sent: {}",
        transport.request_count() - before
    ));

    log.push("calling Login");
    client
        .mutate_typed::<Login>(login::Variables, MutationOptions::new())
        .await?;

    log.push("showing profile");
    let before = transport.request_count();
    let profile = mount_profile(client, &mut log).await?;
    log.push(format!(
        "requests sent: {}",
        transport.request_count() - before
    ));
    drop(profile);
    Ok(log)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use cache_probe_client::{ClientConfig, probe_type_policies};
    use cache_probe_server::{AppState, LocalServer};

    use super::*;

    async fn setup() -> (LocalServer, ProbeClient) {
        let server = LocalServer::spawn(AppState::new())
            .await
            .unwrap();
        let config = ClientConfig::with_endpoint(&server.graphql_url()).unwrap();
        (server, ProbeClient::new(&config, probe_type_policies()))
    }

    #[test]
    fn test_scenario_names_round_trip_through_clap() {
        for scenario in Scenario::ALL {
            assert_eq!(Scenario::from_str(scenario.name(), false), Ok(scenario));
        }
    }

    #[tokio::test]
    async fn test_connection_directive_lists_each_product_once() {
        let (_server, client) = setup().await;
        let log = Scenario::ConnectionDirective.run(&client).await.unwrap();
        let events = log.events();
        assert_eq!(events[0], "loading `HydrateSession`: true");
        assert_eq!(events[1], "loading `HydrateSession`: false");
        assert_eq!(events[2], "products in cache: [1]");
        assert_eq!(events[4], "products in cache: [1, 2]");
        assert_eq!(events.last().unwrap(), "products in cache: [2]");
    }

    #[tokio::test]
    async fn test_loading_state_toggles_on_login() {
        let (_server, client) = setup().await;
        let log = Scenario::LoadingState.run(&client).await.unwrap();
        assert_eq!(
            log.events(),
            [
                "loading `AuthenticatedUser`: true",
                "loading `AuthenticatedUser`: false",
                "user: none",
                "calling Login",
                "loading `AuthenticatedUser`: true",
                "loading `AuthenticatedUser`: false",
                "user: jt (id 1)",
                "calling Logout",
                "user: none",
            ]
        );
    }

    #[tokio::test]
    async fn test_hidden_profile_sends_no_requests() {
        let (_server, client) = setup().await;
        let log = Scenario::ViewHierarchy.run(&client).await.unwrap();
        let events = log.events();
        assert!(events.contains(&"watched queries: 0".to_owned()));
        assert!(events.contains(&"logout returned user: none".to_owned()));
        let requests: Vec<&String> = events
            .iter()
            .filter(|e| e.starts_with("requests sent"))
            .collect();
        assert_eq!(requests, ["requests sent: 1", "requests sent: 0"]);
    }
}
