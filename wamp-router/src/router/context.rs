use std::sync::Arc;

use futures_util::lock::Mutex;
use log::warn;

use crate::{
    core::{
        hash::HashMap,
        id::{
            Id,
            IdAllocator,
            new_id_allocator,
        },
        uri::Uri,
    },
    router::{
        authorization::AuthorizationPolicy,
        realm::Realm,
        router::RouterConfig,
        session::SessionHandle,
    },
};

struct RouterState {
    config: RouterConfig,
    realms: HashMap<Uri, Arc<Realm>>,
    id_allocator: Arc<dyn IdAllocator>,
    policy: Option<Arc<dyn AuthorizationPolicy>>,
    sessions: Mutex<HashMap<Id, SessionHandle>>,
}

/// The context of a task running for a router.
///
/// Used to share ownership of router-wide state across many tasks: the configuration, the realms,
/// the shared ID space, the authorization policy, and the registry of live sessions.
#[derive(Clone)]
pub struct RouterContext {
    state: Arc<RouterState>,
}

impl RouterContext {
    /// Creates the context for a router with the given configuration.
    pub fn new(config: RouterConfig, policy: Option<Arc<dyn AuthorizationPolicy>>) -> Self {
        let id_allocator: Arc<dyn IdAllocator> = new_id_allocator(config.id_allocator).into();
        let mut realms = HashMap::default();
        for realm_config in &config.realms {
            let realm = Realm::new(realm_config.clone(), id_allocator.clone());
            if realms
                .insert(realm_config.uri.clone(), Arc::new(realm))
                .is_some()
            {
                warn!(
                    "Realm {} is configured more than once; using the last configuration",
                    realm_config.uri
                );
            }
        }
        Self {
            state: Arc::new(RouterState {
                config,
                realms,
                id_allocator,
                policy,
                sessions: Mutex::new(HashMap::default()),
            }),
        }
    }

    /// The router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.state.config
    }

    /// Looks up a realm by URI.
    pub fn realm(&self, uri: &Uri) -> Option<Arc<Realm>> {
        self.state.realms.get(uri).cloned()
    }

    /// All realms on the router.
    pub fn realms(&self) -> impl Iterator<Item = &Arc<Realm>> {
        self.state.realms.values()
    }

    /// The ID space shared by sessions, subscriptions, and registrations.
    pub fn id_allocator(&self) -> &Arc<dyn IdAllocator> {
        &self.state.id_allocator
    }

    /// The authorization policy for all connections, if any.
    pub fn policy(&self) -> Option<&Arc<dyn AuthorizationPolicy>> {
        self.state.policy.as_ref()
    }

    /// Adds a live session to the registry.
    pub async fn add_session(&self, session: SessionHandle) {
        self.state
            .sessions
            .lock()
            .await
            .insert(session.id(), session);
    }

    /// Removes a session from the registry, releasing its ID.
    pub async fn remove_session(&self, id: Id) {
        if self.state.sessions.lock().await.remove(&id).is_some() {
            self.state.id_allocator.release_id(id).await;
        }
    }

    /// All live sessions.
    pub async fn sessions(&self) -> Vec<SessionHandle> {
        self.state
            .sessions
            .lock()
            .await
            .values()
            .cloned()
            .collect()
    }
}
