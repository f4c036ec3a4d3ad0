use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    future::{
        BoxFuture,
        join_all,
    },
    lock::Mutex,
};
use log::{
    debug,
    info,
    warn,
};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::{
    core::{
        close::CloseReason,
        error::InteractionError,
        galois::GaloisFieldIdAllocator,
        hash::HashMap,
        id::{
            Id,
            IdAllocator,
        },
        types::{
            Dictionary,
            List,
        },
        uri::Uri,
    },
    message::message::{
        EventMessage,
        Message,
    },
    router::session::SessionHandle,
};

/// Configuration for a realm.
#[derive(Debug, Clone)]
pub struct RealmConfig {
    /// Name of the realm, mostly for logging.
    pub name: String,
    /// URI for peers to connect to the realm.
    pub uri: Uri,
}

/// The successful result of a procedure invocation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcYield {
    pub arguments: Option<List>,
    pub arguments_keyword: Option<Dictionary>,
}

/// The failed result of a procedure invocation, reported by the callee or the router.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("procedure invocation failed: {error}")]
pub struct RpcError {
    pub error: Uri,
    pub details: Dictionary,
    pub arguments: Option<List>,
    pub arguments_keyword: Option<Dictionary>,
}

impl RpcError {
    /// The invocation was abandoned because its callee went away.
    pub fn canceled() -> Self {
        Self {
            error: InteractionError::Canceled.uri(),
            details: Dictionary::default(),
            arguments: None,
            arguments_keyword: None,
        }
    }
}

/// The result of a procedure invocation.
pub type InvocationResult = std::result::Result<RpcYield, RpcError>;

/// A publication whose events have been queued, but not necessarily sent.
pub struct Publication {
    id: Id,
    deliveries: Vec<BoxFuture<'static, Result<()>>>,
}

impl Publication {
    /// The publication ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The number of subscribers an event was queued for.
    pub fn deliveries(&self) -> usize {
        self.deliveries.len()
    }

    /// Waits for every queued event to be sent, or to fail.
    ///
    /// The publication ID is returned regardless of individual delivery failures.
    pub async fn complete(self) -> Id {
        let results = join_all(self.deliveries).await;
        let failed = results.iter().filter(|result| result.is_err()).count();
        if failed > 0 {
            debug!(
                "Publication {} failed to deliver {failed} of {} events",
                self.id,
                results.len()
            );
        }
        self.id
    }
}

/// An invocation that has been delivered to its callee, awaiting the callee's response.
pub struct PendingInvocation {
    id: Id,
    result_rx: oneshot::Receiver<InvocationResult>,
}

impl PendingInvocation {
    /// The invocation ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Waits for the callee's response.
    ///
    /// If the callee closes without responding, the invocation fails as canceled.
    pub async fn result(self) -> InvocationResult {
        match self.result_rx.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::canceled()),
        }
    }
}

struct Registration {
    id: Id,
    session: SessionHandle,
}

#[derive(Default)]
struct RealmState {
    sessions: HashMap<Id, SessionHandle>,
    // Topic to subscription ID to subscriber.
    subscriptions: HashMap<Uri, HashMap<Id, SessionHandle>>,
    subscription_topics: HashMap<Id, Uri>,
    registrations: HashMap<Uri, Registration>,
    registration_procedures: HashMap<Id, Uri>,
}

/// A realm, which is a scoped area for peer sessions and resources.
///
/// The realm acts as both the broker and the dealer for its sessions. WAMP sessions cannot
/// communicate across realms.
pub struct Realm {
    config: RealmConfig,
    state: Mutex<RealmState>,
    // Shared with the router, for sessions, subscriptions, and registrations.
    id_allocator: Arc<dyn IdAllocator>,
    // Publications and invocations.
    request_ids: GaloisFieldIdAllocator,
}

impl Realm {
    /// Creates a new realm.
    pub fn new(config: RealmConfig, id_allocator: Arc<dyn IdAllocator>) -> Self {
        Self {
            config,
            state: Mutex::new(RealmState::default()),
            id_allocator,
            request_ids: GaloisFieldIdAllocator::new(None),
        }
    }

    /// The URI for accessing the realm.
    pub fn uri(&self) -> &Uri {
        &self.config.uri
    }

    /// The name of the realm.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Adds a session that has joined the realm.
    pub async fn add_session(&self, session: SessionHandle) {
        self.state.lock().await.sessions.insert(session.id(), session);
    }

    /// The number of sessions in the realm.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Removes a session from the realm, along with all of its subscriptions and registrations.
    ///
    /// All identifiers owned by the session's resources are released.
    pub async fn remove_session(&self, session: Id) {
        let released = {
            let mut state = self.state.lock().await;
            state.sessions.remove(&session);

            let mut released = Vec::default();
            let subscription_topics = std::mem::take(&mut state.subscription_topics);
            for (subscription, topic) in subscription_topics {
                let owned = state
                    .subscriptions
                    .get(&topic)
                    .and_then(|subscribers| subscribers.get(&subscription))
                    .is_some_and(|subscriber| subscriber.id() == session);
                if !owned {
                    state.subscription_topics.insert(subscription, topic);
                    continue;
                }
                if let Some(subscribers) = state.subscriptions.get_mut(&topic) {
                    subscribers.remove(&subscription);
                    if subscribers.is_empty() {
                        state.subscriptions.remove(&topic);
                    }
                }
                released.push(subscription);
            }

            let procedures = state
                .registrations
                .iter()
                .filter(|(_, registration)| registration.session.id() == session)
                .map(|(procedure, _)| procedure.clone())
                .collect::<Vec<_>>();
            for procedure in procedures {
                if let Some(registration) = state.registrations.remove(&procedure) {
                    state.registration_procedures.remove(&registration.id);
                    released.push(registration.id);
                }
            }
            released
        };

        if !released.is_empty() {
            debug!(
                "Released {} subscriptions and registrations of session {session} in realm {}",
                released.len(),
                self.uri()
            );
        }
        for id in released {
            self.id_allocator.release_id(id).await;
        }
    }

    /// Adds a subscription for the session to the topic.
    ///
    /// Always succeeds with a fresh subscription ID.
    pub async fn add_subscription(&self, session: SessionHandle, topic: Uri) -> Id {
        self.add_subscription_with(session, topic, |_| ()).await.0
    }

    /// Same as [`Self::add_subscription`], but runs `f` with the new subscription ID before any
    /// publication can observe the subscription.
    pub async fn add_subscription_with<F, T>(
        &self,
        session: SessionHandle,
        topic: Uri,
        f: F,
    ) -> (Id, T)
    where
        F: FnOnce(Id) -> T,
    {
        let subscription = self.id_allocator.generate_id().await;
        let mut state = self.state.lock().await;
        debug!(
            "Session {} subscribed to {topic} with subscription {subscription}",
            session.id()
        );
        state
            .subscriptions
            .entry(topic.clone())
            .or_default()
            .insert(subscription, session);
        state.subscription_topics.insert(subscription, topic);
        let output = f(subscription);
        (subscription, output)
    }

    /// Removes a subscription, only if it is owned by the session.
    ///
    /// Returns whether the subscription was removed.
    pub async fn remove_subscription(&self, session: Id, subscription: Id) -> bool {
        {
            let mut state = self.state.lock().await;
            let topic = match state.subscription_topics.get(&subscription) {
                Some(topic) => topic.clone(),
                None => return false,
            };
            let subscribers = match state.subscriptions.get_mut(&topic) {
                Some(subscribers) => subscribers,
                None => return false,
            };
            if !subscribers
                .get(&subscription)
                .is_some_and(|subscriber| subscriber.id() == session)
            {
                return false;
            }
            subscribers.remove(&subscription);
            if subscribers.is_empty() {
                state.subscriptions.remove(&topic);
            }
            state.subscription_topics.remove(&subscription);
        }
        self.id_allocator.release_id(subscription).await;
        true
    }

    /// The IDs of the sessions subscribed to a topic, one per subscription.
    pub async fn subscribers(&self, topic: &Uri) -> Vec<Id> {
        self.state
            .lock()
            .await
            .subscriptions
            .get(topic)
            .map(|subscribers| subscribers.values().map(|session| session.id()).collect())
            .unwrap_or_default()
    }

    /// Adds a registration for the session to the procedure.
    ///
    /// Fails if the procedure is already registered.
    pub async fn add_registration(&self, session: SessionHandle, procedure: Uri) -> Result<Id> {
        self.add_registration_with(session, procedure, |_| ())
            .await
            .map(|(registration, _)| registration)
    }

    /// Same as [`Self::add_registration`], but runs `f` with the new registration ID before any
    /// call can observe the registration.
    pub async fn add_registration_with<F, T>(
        &self,
        session: SessionHandle,
        procedure: Uri,
        f: F,
    ) -> Result<(Id, T)>
    where
        F: FnOnce(Id) -> T,
    {
        let mut state = self.state.lock().await;
        if state.registrations.contains_key(&procedure) {
            return Err(InteractionError::ProcedureAlreadyExists.into());
        }
        let registration = self.id_allocator.generate_id().await;
        debug!(
            "Session {} registered {procedure} with registration {registration}",
            session.id()
        );
        state.registrations.insert(
            procedure.clone(),
            Registration {
                id: registration,
                session,
            },
        );
        state
            .registration_procedures
            .insert(registration, procedure);
        let output = f(registration);
        Ok((registration, output))
    }

    /// Removes a registration, only if it is owned by the session.
    ///
    /// Returns whether the registration was removed.
    pub async fn remove_registration(&self, session: Id, registration: Id) -> bool {
        {
            let mut state = self.state.lock().await;
            let procedure = match state.registration_procedures.get(&registration) {
                Some(procedure) => procedure.clone(),
                None => return false,
            };
            if !state
                .registrations
                .get(&procedure)
                .is_some_and(|owner| owner.id == registration && owner.session.id() == session)
            {
                return false;
            }
            state.registrations.remove(&procedure);
            state.registration_procedures.remove(&registration);
        }
        self.id_allocator.release_id(registration).await;
        true
    }

    /// Queues an event for every subscriber of the topic.
    ///
    /// Subscribers are read from a snapshot, so subscriptions changing concurrently do not affect
    /// an ongoing publication. A subscriber whose session has an authorization policy only receives
    /// the event if the policy authorizes it.
    pub async fn start_publish(
        &self,
        topic: &Uri,
        arguments: Option<List>,
        arguments_keyword: Option<Dictionary>,
    ) -> Publication {
        let publication = self.request_ids.generate_id().await;
        let subscribers = self
            .state
            .lock()
            .await
            .subscriptions
            .get(topic)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .map(|(subscription, session)| (*subscription, session.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut deliveries = Vec::with_capacity(subscribers.len());
        for (subscription, subscriber) in subscribers {
            let event = EventMessage {
                subscribed_subscription: subscription,
                published_publication: publication,
                details: Dictionary::default(),
                publish_arguments: arguments.clone(),
                publish_arguments_keyword: arguments_keyword.clone(),
            };
            if let Some(authorization) = subscriber.authorization() {
                if !authorization
                    .policy
                    .authorize_event(&authorization.client, topic, &event)
                    .await
                {
                    debug!(
                        "Event for publication {publication} not authorized for session {}",
                        subscriber.id()
                    );
                    continue;
                }
            }
            deliveries.push(subscriber.queue_message(Message::Event(event)));
        }

        Publication {
            id: publication,
            deliveries,
        }
    }

    /// Publishes an event to every subscriber of the topic, returning the publication ID once all
    /// deliveries have completed.
    pub async fn publish(
        &self,
        topic: &Uri,
        _options: &Dictionary,
        arguments: Option<List>,
        arguments_keyword: Option<Dictionary>,
    ) -> Id {
        self.start_publish(topic, arguments, arguments_keyword)
            .await
            .complete()
            .await
    }

    /// Delivers an INVOCATION to the session that registered the procedure.
    pub async fn start_call(
        &self,
        procedure: &Uri,
        arguments: Option<List>,
        arguments_keyword: Option<Dictionary>,
    ) -> Result<PendingInvocation> {
        let (registration, callee) = {
            let state = self.state.lock().await;
            let registration = state
                .registrations
                .get(procedure)
                .ok_or(InteractionError::NoSuchProcedure)?;
            (registration.id, registration.session.clone())
        };
        let invocation = self.request_ids.generate_id().await;
        let result_rx = callee
            .invoke(invocation, registration, arguments, arguments_keyword)
            .await?;
        Ok(PendingInvocation {
            id: invocation,
            result_rx,
        })
    }

    /// Calls a procedure, returning the callee's result.
    ///
    /// Fails with [`InteractionError::NoSuchProcedure`] if the procedure is not registered, or with
    /// [`RpcError`] if the invocation fails.
    pub async fn call(
        &self,
        procedure: &Uri,
        arguments: Option<List>,
        arguments_keyword: Option<Dictionary>,
    ) -> Result<RpcYield> {
        self.start_call(procedure, arguments, arguments_keyword)
            .await?
            .result()
            .await
            .map_err(Error::new)
    }

    /// Shuts down the realm by attempting to end all sessions cleanly.
    ///
    /// Sessions that have not closed after the timeout are closed abruptly.
    pub async fn shut_down(&self, close_reason: CloseReason, timeout: Duration) -> Result<()> {
        let sessions = self
            .state
            .lock()
            .await
            .sessions
            .values()
            .cloned()
            .collect::<Vec<_>>();
        info!(
            "Shutting down realm {} with {} sessions",
            self.uri(),
            sessions.len()
        );
        let result = shut_down_sessions(&sessions, close_reason, timeout).await;
        if result.is_err() {
            warn!("Realm {} did not shut down cleanly", self.uri());
        }
        result
    }
}

impl PartialEq for Realm {
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl Eq for Realm {}

/// Shuts down all sessions concurrently, waiting for each to close.
///
/// Sessions that do not close within the timeout are closed abruptly, and an error is returned.
pub(crate) async fn shut_down_sessions(
    sessions: &[SessionHandle],
    close_reason: CloseReason,
    timeout: Duration,
) -> Result<()> {
    let closed = sessions
        .iter()
        .map(|session| session.shut_down(close_reason))
        .collect::<Vec<_>>();
    if tokio::time::timeout(timeout, join_all(closed)).await.is_ok() {
        return Ok(());
    }
    for session in sessions {
        session.close();
    }
    Err(Error::msg(
        "timed out waiting for sessions to close cleanly",
    ))
}
