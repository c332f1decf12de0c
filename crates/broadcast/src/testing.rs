//! Scriptable in-memory gateway for unit tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    herald_channels::{
        ConnectError, Contact, DeliveryError, GatewayClient, GatewayConnector, Group, Identity,
        LifecycleSink, Recipient, RecipientId,
    },
    secrecy::Secret,
};

pub(crate) fn identity(name: &str) -> Identity {
    Identity {
        id: format!("{name}-id"),
        name: name.to_string(),
        discriminator: None,
    }
}

#[derive(Clone)]
enum OnConnect {
    Ready(Identity),
    ReadyAfter(Duration, Identity),
    Silent,
    Stall,
    Reject(String),
    Fail(String),
}

pub(crate) struct FakeConnector {
    on_connect: Mutex<OnConnect>,
    sinks: Mutex<Vec<Arc<dyn LifecycleSink>>>,
    client: Arc<FakeClient>,
}

impl FakeConnector {
    fn with(on_connect: OnConnect) -> Arc<Self> {
        Arc::new(Self {
            on_connect: Mutex::new(on_connect),
            sinks: Mutex::new(Vec::new()),
            client: Arc::new(FakeClient::default()),
        })
    }

    /// Handshake completes during `connect`.
    pub(crate) fn ready(name: &str) -> Arc<Self> {
        Self::with(OnConnect::Ready(identity(name)))
    }

    pub(crate) fn ready_after(delay: Duration, name: &str) -> Arc<Self> {
        Self::with(OnConnect::ReadyAfter(delay, identity(name)))
    }

    /// Connects but never reports anything.
    pub(crate) fn silent() -> Arc<Self> {
        Self::with(OnConnect::Silent)
    }

    /// `connect` itself never returns.
    pub(crate) fn stalled() -> Arc<Self> {
        Self::with(OnConnect::Stall)
    }

    pub(crate) fn rejecting(reason: &str) -> Arc<Self> {
        Self::with(OnConnect::Reject(reason.to_string()))
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Self::with(OnConnect::Fail(message.to_string()))
    }

    pub(crate) fn set_ready_on_connect(&self, identity: Identity) {
        *self.on_connect.lock().unwrap() = OnConnect::Ready(identity);
    }

    pub(crate) fn connects(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Lifecycle sink handed over by the nth connect call.
    pub(crate) fn sink(&self, index: usize) -> Arc<dyn LifecycleSink> {
        Arc::clone(&self.sinks.lock().unwrap()[index])
    }

    pub(crate) fn client(&self) -> Arc<FakeClient> {
        Arc::clone(&self.client)
    }
}

#[async_trait]
impl GatewayConnector for FakeConnector {
    async fn connect(
        &self,
        _credential: &Secret<String>,
        events: Arc<dyn LifecycleSink>,
    ) -> Result<Arc<dyn GatewayClient>, ConnectError> {
        let on_connect = self.on_connect.lock().unwrap().clone();
        match on_connect {
            OnConnect::Reject(reason) => {
                self.sinks.lock().unwrap().push(events);
                return Err(ConnectError::invalid_credential(reason));
            },
            OnConnect::Fail(message) => {
                self.sinks.lock().unwrap().push(events);
                return Err(ConnectError::transport(message));
            },
            OnConnect::Stall => {
                self.sinks.lock().unwrap().push(events);
                return std::future::pending().await;
            },
            OnConnect::Ready(identity) => events.ready(identity),
            OnConnect::ReadyAfter(delay, identity) => {
                let events = Arc::clone(&events);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    events.ready(identity);
                });
            },
            OnConnect::Silent => {},
        }
        self.sinks.lock().unwrap().push(events);
        Ok(Arc::clone(&self.client) as Arc<dyn GatewayClient>)
    }
}

#[derive(Default)]
pub(crate) struct FakeClient {
    groups: Mutex<Vec<Group>>,
    contacts: Mutex<Vec<Contact>>,
    failures: Mutex<HashMap<RecipientId, DeliveryError>>,
    sent: Mutex<Vec<(RecipientId, String)>>,
    closes: AtomicUsize,
}

impl FakeClient {
    pub(crate) fn add_group(&self, name: &str, members: &[(u64, bool)]) {
        let members = members
            .iter()
            .map(|&(id, is_service)| Contact {
                recipient: Recipient::user(id),
                is_service,
            })
            .collect();
        let mut groups = self.groups.lock().unwrap();
        let id = groups.len().to_string();
        groups.push(Group {
            id,
            name: name.to_string(),
            members,
        });
    }

    pub(crate) fn add_direct_contact(&self, id: u64, is_service: bool) {
        self.contacts.lock().unwrap().push(Contact {
            recipient: Recipient::user(id),
            is_service,
        });
    }

    pub(crate) fn fail_for(&self, id: u64, error: DeliveryError) {
        self.failures.lock().unwrap().insert(RecipientId(id), error);
    }

    pub(crate) fn heal(&self, id: u64) {
        self.failures.lock().unwrap().remove(&RecipientId(id));
    }

    pub(crate) fn sent(&self) -> Vec<(RecipientId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sends_to(&self, id: u64) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == RecipientId(id))
            .count()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayClient for FakeClient {
    async fn list_groups(&self) -> herald_channels::Result<Vec<Group>> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn list_direct_contacts(&self) -> herald_channels::Result<Vec<Contact>> {
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn send_to(&self, recipient: &Recipient, text: &str) -> Result<(), DeliveryError> {
        if let Some(err) = self.failures.lock().unwrap().get(&recipient.id) {
            return Err(err.clone());
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.id, text.to_string()));
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
