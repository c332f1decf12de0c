//! Recipient discovery and paced, cooldown-aware delivery.

use std::{collections::BTreeMap, fmt, sync::Arc};

use {
    herald_channels::{GatewayClient, Recipient, RecipientId},
    serde::Serialize,
    tokio::time::Instant,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use herald_metrics::{broadcast as broadcast_metrics, counter, histogram, labels};

use crate::{
    cooldown::CooldownStore,
    error::{Error, Result},
    session::Session,
    settings::BroadcastSettings,
};

/// Outcome of one broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastResult {
    pub sent_count: usize,
    pub failed_count: usize,
    pub skipped_cooldown_count: usize,
    pub total_candidates: usize,
}

impl fmt::Display for BroadcastResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted broadcast to {} recipients: sent {}, failed {}, skipped {} due to cooldown",
            self.total_candidates, self.sent_count, self.failed_count, self.skipped_cooldown_count
        )
    }
}

pub struct BroadcastDispatcher {
    cooldowns: Arc<CooldownStore>,
    settings: BroadcastSettings,
}

impl BroadcastDispatcher {
    #[must_use]
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            cooldowns: Arc::new(CooldownStore::new(
                settings.retention(),
                settings.sweep_every,
            )),
            settings,
        }
    }

    #[must_use]
    pub fn cooldowns(&self) -> &CooldownStore {
        &self.cooldowns
    }

    /// Send `message` to every non-service recipient reachable through
    /// `session`, skipping those still inside their cooldown window.
    ///
    /// Not atomic: if the caller goes away mid-broadcast, the recipients
    /// already sent to keep their cooldown entries.
    pub async fn broadcast(&self, session: &Session, message: &str) -> Result<BroadcastResult> {
        let client = session.ready_client()?;
        let credential = session.credential();

        let recipients = discover(client.as_ref()).await?;
        if recipients.is_empty() {
            info!(credential = %credential.fingerprint(), "no recipients to broadcast to");
            return Err(Error::NoRecipients);
        }

        let started = Instant::now();
        let mut result = BroadcastResult {
            total_candidates: recipients.len(),
            ..Default::default()
        };
        info!(
            credential = %credential.fingerprint(),
            candidates = result.total_candidates,
            "starting broadcast"
        );

        let mut attempts = 0usize;
        for recipient in recipients {
            let Some(claim) = self.cooldowns.try_claim(
                credential.key(),
                recipient.id,
                Instant::now(),
                self.settings.cooldown,
            ) else {
                debug!(recipient = %recipient.id, "skipping recipient inside cooldown window");
                result.skipped_cooldown_count += 1;
                continue;
            };

            if attempts > 0 && !self.settings.pacing.is_zero() {
                tokio::time::sleep(self.settings.pacing).await;
            }
            attempts += 1;

            match client.send_to(&recipient, message).await {
                Ok(()) => {
                    claim.confirm(Instant::now());
                    result.sent_count += 1;
                },
                Err(e) => {
                    drop(claim);
                    warn!(
                        recipient = %recipient.id,
                        reason = e.reason(),
                        error = %e,
                        "broadcast delivery failed"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(broadcast_metrics::RECIPIENTS_FAILED_TOTAL, labels::REASON => e.reason())
                        .increment(1);
                    result.failed_count += 1;
                },
            }
        }

        #[cfg(feature = "metrics")]
        {
            counter!(broadcast_metrics::BROADCASTS_TOTAL).increment(1);
            counter!(broadcast_metrics::RECIPIENTS_SENT_TOTAL).increment(result.sent_count as u64);
            counter!(broadcast_metrics::RECIPIENTS_SKIPPED_TOTAL)
                .increment(result.skipped_cooldown_count as u64);
            histogram!(broadcast_metrics::DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        }

        info!(
            credential = %credential.fingerprint(),
            sent = result.sent_count,
            failed = result.failed_count,
            skipped = result.skipped_cooldown_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "broadcast finished"
        );
        Ok(result)
    }
}

/// Union of group members and direct contacts, service accounts removed,
/// deduplicated by recipient id.
async fn discover(client: &dyn GatewayClient) -> Result<Vec<Recipient>> {
    let groups = client.list_groups().await?;
    let direct = client.list_direct_contacts().await?;

    let mut unique: BTreeMap<RecipientId, Recipient> = BTreeMap::new();
    let contacts = groups
        .iter()
        .flat_map(|group| group.members.iter())
        .chain(direct.iter());
    for contact in contacts.filter(|contact| !contact.is_service) {
        unique
            .entry(contact.recipient.id)
            .or_insert(contact.recipient);
    }

    debug!(
        groups = groups.len(),
        direct = direct.len(),
        unique = unique.len(),
        "discovered broadcast recipients"
    );
    Ok(unique.into_values().collect())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            credential::Credential,
            testing::{FakeClient, FakeConnector},
        },
        herald_channels::{DeliveryError, GatewayConnector},
        std::time::Duration,
    };

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn settings(pacing: Duration) -> BroadcastSettings {
        BroadcastSettings {
            cooldown: Duration::from_secs(1),
            pacing,
            ..Default::default()
        }
    }

    async fn ready_session() -> (Session, Arc<FakeClient>) {
        let connector = FakeConnector::ready("herald");
        let client = connector.client();
        let session = Session::new(
            Credential::new("token").unwrap(),
            connector as Arc<dyn GatewayConnector>,
        );
        session.ensure_ready(TIMEOUT).await.unwrap();
        (session, client)
    }

    fn result(sent: usize, failed: usize, skipped: usize, total: usize) -> BroadcastResult {
        BroadcastResult {
            sent_count: sent,
            failed_count: failed,
            skipped_cooldown_count: skipped,
            total_candidates: total,
        }
    }

    #[tokio::test]
    async fn not_ready_session_sends_nothing() {
        let connector = FakeConnector::ready("herald");
        let client = connector.client();
        client.add_direct_contact(1, false);
        let session = Session::new(
            Credential::new("token").unwrap(),
            connector as Arc<dyn GatewayConnector>,
        );
        let dispatcher = BroadcastDispatcher::new(settings(Duration::ZERO));

        let err = dispatcher.broadcast(&session, "hi").await.unwrap_err();

        assert!(matches!(err, Error::NotReady));
        assert!(client.sent().is_empty());
        assert!(dispatcher.cooldowns().is_empty());
    }

    #[tokio::test]
    async fn nobody_to_send_to() {
        let (session, client) = ready_session().await;
        client.add_group("bots only", &[(10, true), (11, true)]);
        let dispatcher = BroadcastDispatcher::new(settings(Duration::ZERO));

        let err = dispatcher.broadcast(&session, "hi").await.unwrap_err();

        assert!(matches!(err, Error::NoRecipients));
        assert!(dispatcher.cooldowns().is_empty());
    }

    #[tokio::test]
    async fn recipients_are_deduplicated_and_services_dropped() {
        let (session, client) = ready_session().await;
        client.add_group("one", &[(1, false), (2, false), (99, true)]);
        client.add_group("two", &[(2, false), (3, false)]);
        client.add_direct_contact(3, false);
        client.add_direct_contact(4, false);
        client.add_direct_contact(98, true);
        let dispatcher = BroadcastDispatcher::new(settings(Duration::ZERO));

        let outcome = dispatcher.broadcast(&session, "hello").await.unwrap();

        assert_eq!(outcome, result(4, 0, 0, 4));
        for id in [1, 2, 3, 4] {
            assert_eq!(client.sends_to(id), 1);
        }
        assert_eq!(client.sends_to(98), 0);
        assert_eq!(client.sends_to(99), 0);
        assert!(client.sent().iter().all(|(_, text)| text == "hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_window_skips_then_releases() {
        let (session, client) = ready_session().await;
        client.add_group("guild", &[(1, false), (2, false)]);
        let dispatcher = BroadcastDispatcher::new(settings(Duration::ZERO));

        let first = dispatcher.broadcast(&session, "a").await.unwrap();
        assert_eq!(first, result(2, 0, 0, 2));

        tokio::time::advance(Duration::from_millis(500)).await;
        let second = dispatcher.broadcast(&session, "b").await.unwrap();
        assert_eq!(second, result(0, 0, 2, 2));

        tokio::time::advance(Duration::from_millis(700)).await;
        let third = dispatcher.broadcast(&session, "c").await.unwrap();
        assert_eq!(third, result(2, 0, 0, 2));

        assert_eq!(client.sends_to(1), 2);
        assert_eq!(client.sends_to(2), 2);
    }

    #[tokio::test]
    async fn failed_send_does_not_start_cooldown() {
        let (session, client) = ready_session().await;
        client.add_group("guild", &[(1, false), (2, false)]);
        client.fail_for(2, DeliveryError::PermissionDenied("dms closed".into()));
        let dispatcher = BroadcastDispatcher::new(settings(Duration::ZERO));

        let first = dispatcher.broadcast(&session, "a").await.unwrap();
        assert_eq!(first, result(1, 1, 0, 2));
        assert_eq!(dispatcher.cooldowns().len(), 1);

        client.heal(2);
        let second = dispatcher.broadcast(&session, "b").await.unwrap();
        assert_eq!(second, result(1, 0, 1, 2));
        assert_eq!(client.sends_to(2), 1);
    }

    #[tokio::test]
    async fn every_failure_kind_counts_as_failed() {
        let (session, client) = ready_session().await;
        client.add_direct_contact(1, false);
        client.add_direct_contact(2, false);
        client.add_direct_contact(3, false);
        client.fail_for(1, DeliveryError::PermissionDenied("50007".into()));
        client.fail_for(2, DeliveryError::UnsupportedRecipient("voice".into()));
        client.fail_for(3, DeliveryError::Transport("reset".into()));
        let dispatcher = BroadcastDispatcher::new(settings(Duration::ZERO));

        let outcome = dispatcher.broadcast(&session, "a").await.unwrap();

        assert_eq!(outcome, result(0, 3, 0, 3));
        assert!(dispatcher.cooldowns().is_empty());
    }

    #[tokio::test]
    async fn concurrent_broadcasts_send_once_per_recipient() {
        let (session, client) = ready_session().await;
        client.add_group("guild", &[(1, false), (2, false), (3, false)]);
        let dispatcher = BroadcastDispatcher::new(settings(Duration::from_millis(5)));

        let (a, b) = tokio::join!(
            dispatcher.broadcast(&session, "x"),
            dispatcher.broadcast(&session, "y"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.sent_count + b.sent_count, 3);
        assert_eq!(a.skipped_cooldown_count + b.skipped_cooldown_count, 3);
        for id in [1, 2, 3] {
            assert_eq!(client.sends_to(id), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_spaces_send_attempts() {
        let (session, client) = ready_session().await;
        client.add_group("guild", &[(1, false), (2, false), (3, false)]);
        let dispatcher = BroadcastDispatcher::new(settings(Duration::from_millis(100)));

        let start = Instant::now();
        dispatcher.broadcast(&session, "x").await.unwrap();
        // Two gaps between three sends; none before the first.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));

        // Everyone is in cooldown: no sends, so no pacing.
        let start = Instant::now();
        let skipped = dispatcher.broadcast(&session, "y").await.unwrap();
        assert_eq!(skipped.skipped_cooldown_count, 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn summary_line() {
        assert_eq!(
            result(3, 1, 2, 6).to_string(),
            "attempted broadcast to 6 recipients: sent 3, failed 1, skipped 2 due to cooldown"
        );
    }
}
