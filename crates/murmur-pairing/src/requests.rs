//! Pending pairing-request ledger
//!
//! Custody of inbound pairing requests awaiting a decision. A request is
//! decided immediately when the configured auto-reject rules can be
//! evaluated, and deferred otherwise — the requester may simply not be
//! resolvable yet (out of render range), and guessing would reject people
//! the user never meant to filter. Deferred requests are re-evaluated
//! opportunistically as their requesters come into proximity.
//!
//! Requests never persist across process restarts; any response, user- or
//! auto-initiated, removes the entry.

use crate::filter::{self, Verdict};
use murmur_core::{
    AccountRef, EventSink, Ident, NoteStore, PairRequest, PairingEvent, PairingServer,
    ProximityOracle, RequestDecision, RequestId, RulesProvider,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct PendingEntry {
    request: PairRequest,
    /// The auto-reject verdict could not be computed at receipt because a
    /// configured filter needed an unresolvable attribute.
    deferred: bool,
}

/// Holds inbound pairing requests keyed by request id.
pub struct RequestLedger {
    server: Arc<dyn PairingServer>,
    oracle: Arc<dyn ProximityOracle>,
    rules: Arc<dyn RulesProvider>,
    notes: Arc<dyn NoteStore>,
    sink: Arc<dyn EventSink>,
    pending: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl RequestLedger {
    /// Create an empty ledger.
    pub fn new(
        server: Arc<dyn PairingServer>,
        oracle: Arc<dyn ProximityOracle>,
        rules: Arc<dyn RulesProvider>,
        notes: Arc<dyn NoteStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            server,
            oracle,
            rules,
            notes,
            sink,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Currently pending requests.
    pub fn pending_requests(&self) -> Vec<PairRequest> {
        self.pending
            .lock()
            .values()
            .map(|entry| entry.request.clone())
            .collect()
    }

    /// Whether a given request is pending with a deferred verdict.
    pub fn is_deferred(&self, request_id: RequestId) -> bool {
        self.pending
            .lock()
            .get(&request_id)
            .map(|entry| entry.deferred)
            .unwrap_or(false)
    }

    /// Handle an inbound pairing request.
    ///
    /// Malformed requests (no requester ident and no account reference) are
    /// rejected with an explanatory reason rather than silently dropped —
    /// they indicate a client or protocol bug worth telling the sender
    /// about. Otherwise the auto-reject rules run with deferral enabled;
    /// an immediate rejection is answered and never stored.
    pub async fn receive(&self, dto: PairRequest) {
        if dto.is_malformed() {
            tracing::warn!(
                request_id = %dto.request_id,
                "rejecting malformed pair request: missing requester ident and account ref"
            );
            self.respond_decision(
                dto.request_id,
                false,
                Some("Malformed pairing request. Try moving a little closer?".to_string()),
            )
            .await;
            return;
        }

        let rules = self.rules.rules();
        let verdict =
            filter::evaluate(self.oracle.as_ref(), &rules, &dto.requester_ident, true).await;

        let deferred = match verdict {
            Verdict::Reject { reason } => {
                self.respond_decision(dto.request_id, false, Some(reason)).await;
                return;
            }
            Verdict::Defer => true,
            Verdict::Accept => false,
        };

        self.pending.lock().insert(
            dto.request_id,
            PendingEntry {
                request: dto.clone(),
                deferred,
            },
        );

        self.sink.publish(PairingEvent::RequestReceived(dto.clone()));
        self.sink.publish(PairingEvent::PendingListChanged);

        let display_name = self.display_name(&dto, true).await;
        self.sink.publish(PairingEvent::RequestNotice { display_name });
    }

    /// Deliver a decision on a request and drop it from the ledger.
    ///
    /// On accept, a note is auto-filled for the requester so the pair list
    /// stays recognizable — but only when the user has not already set one.
    pub async fn respond(&self, request_id: RequestId, accepted: bool, reason: Option<String>) {
        let entry = self.pending.lock().get(&request_id).cloned();

        let Some(entry) = entry else {
            // Unknown id: answer the server anyway, nothing local to update.
            self.respond_decision(request_id, accepted, reason).await;
            return;
        };

        let display_name = self.display_name(&entry.request, false).await;
        self.respond_decision(request_id, accepted, reason).await;

        if accepted {
            self.apply_auto_note(&entry.request, &display_name);
        }

        self.pending.lock().remove(&request_id);
        self.sink.publish(PairingEvent::PendingListChanged);
    }

    /// Re-evaluate pending requests whose requesters are now nearby.
    ///
    /// A request that was deferred at receipt is rejected silently — the
    /// requester never received feedback, so none is sent now either. A
    /// request that passed at receipt but fails now is rejected with the
    /// computed reason, and the local user is told it happened.
    pub async fn evaluate_pending(&self, nearby: &HashSet<Ident>) {
        let entries: Vec<PendingEntry> = self.pending.lock().values().cloned().collect();
        let rules = self.rules.rules();

        for entry in entries {
            if !nearby.contains(&entry.request.requester_ident) {
                continue;
            }

            let verdict = filter::evaluate(
                self.oracle.as_ref(),
                &rules,
                &entry.request.requester_ident,
                false,
            )
            .await;

            let Verdict::Reject { reason } = verdict else {
                continue;
            };

            if entry.deferred {
                self.respond(entry.request.request_id, false, None).await;
                continue;
            }

            self.respond(entry.request.request_id, false, Some(reason)).await;
            let display_name = self.display_name(&entry.request, false).await;
            self.sink
                .publish(PairingEvent::RequestAutoRejected { display_name });
        }
    }

    /// Drop every pending request (login/logout). Publishes a list change
    /// only when something was actually dropped.
    pub fn clear(&self) {
        {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return;
            }
            pending.clear();
        }
        self.sink.publish(PairingEvent::PendingListChanged);
    }

    /// Send a decision to the server; transport failures are logged, never
    /// propagated to the interactive caller.
    async fn respond_decision(&self, request_id: RequestId, accepted: bool, reason: Option<String>) {
        let decision = RequestDecision {
            request_id,
            accepted,
            reason,
        };
        if let Err(err) = self.server.respond(decision).await {
            tracing::warn!(%request_id, %err, "failed to respond to pair request");
        }
    }

    /// Best currently-resolvable display name for a requester.
    ///
    /// When the requester is resolvable, the display name is recorded
    /// against their account, and — at receipt time only — seeded as a note
    /// unless the user already set one. Falls back to the account reference,
    /// then the ident token.
    async fn display_name(&self, dto: &PairRequest, seed_note: bool) -> String {
        let profile = self.oracle.resolve_profile(&dto.requester_ident).await;

        if profile.resolved {
            if let Some(name) = profile
                .display_name
                .as_deref()
                .filter(|name| !name.trim().is_empty())
            {
                let account = Self::account_key(dto);
                self.notes.set_display_name(&account, name);
                if seed_note && self.notes.note_for(&account).is_none() {
                    self.notes.set_note(&account, name);
                }
                return name.to_string();
            }
        }

        if !dto.requester.is_blank() {
            dto.requester.to_string()
        } else {
            dto.requester_ident.to_string()
        }
    }

    /// Auto-fill a note for an accepted requester, first-writer-wins.
    fn apply_auto_note(&self, request: &PairRequest, display_name: &str) {
        if display_name.trim().is_empty() || request.requester.is_blank() {
            return;
        }
        if self.notes.note_for(&request.requester).is_some() {
            return;
        }
        self.notes.set_note(&request.requester, display_name);
    }

    fn account_key(dto: &PairRequest) -> AccountRef {
        if dto.requester.is_blank() {
            AccountRef::new(dto.requester_ident.as_str())
        } else {
            dto.requester.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::ResolvedProfile;
    use murmur_testkit::{MemoryNotes, MockOracle, MockServer, RecordingSink, StaticRules};

    struct Fixture {
        server: Arc<MockServer>,
        oracle: Arc<MockOracle>,
        rules: Arc<StaticRules>,
        notes: Arc<MemoryNotes>,
        sink: Arc<RecordingSink>,
        ledger: RequestLedger,
    }

    fn fixture() -> Fixture {
        let server = Arc::new(MockServer::new());
        let oracle = Arc::new(MockOracle::new());
        let rules = Arc::new(StaticRules::enabled());
        let notes = Arc::new(MemoryNotes::new());
        let sink = Arc::new(RecordingSink::new());
        let ledger = RequestLedger::new(
            Arc::clone(&server) as Arc<dyn PairingServer>,
            Arc::clone(&oracle) as Arc<dyn ProximityOracle>,
            Arc::clone(&rules) as Arc<dyn RulesProvider>,
            Arc::clone(&notes) as Arc<dyn NoteStore>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );
        Fixture {
            server,
            oracle,
            rules,
            notes,
            sink,
            ledger,
        }
    }

    fn request(ident: &str, account: &str) -> PairRequest {
        PairRequest {
            request_id: RequestId::new(),
            requester: AccountRef::new(account),
            requester_ident: Ident::new(ident),
            requested_at_ms: 1_700_000_000_000,
        }
    }

    fn resolvable(name: &str, level: u8) -> ResolvedProfile {
        ResolvedProfile {
            resolved: true,
            display_name: Some(name.to_string()),
            level: Some(level),
            home_region: Some(1),
            appearance: None,
        }
    }

    fn nearby(tokens: &[&str]) -> HashSet<Ident> {
        tokens.iter().map(|token| Ident::new(*token)).collect()
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected_with_reason() {
        let fx = fixture();
        fx.ledger.receive(request("", "")).await;

        let decisions = fx.server.decisions();
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].accepted);
        assert!(decisions[0].reason.as_deref().unwrap().contains("Malformed"));
        assert!(fx.ledger.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_requester_defers_with_filters_configured() {
        let fx = fixture();
        fx.rules.update(|rules| rules.minimum_level = 50);

        let dto = request("ghost", "UID-1");
        fx.ledger.receive(dto.clone()).await;

        // No rejection sent yet; stored as deferred.
        assert!(fx.server.decisions().is_empty());
        assert_eq!(fx.ledger.pending_requests().len(), 1);
        assert!(fx.ledger.is_deferred(dto.request_id));
        assert_eq!(fx.sink.pending_changed_count(), 1);
    }

    #[tokio::test]
    async fn test_immediate_auto_reject_is_never_stored() {
        let fx = fixture();
        fx.rules.update(|rules| rules.minimum_level = 50);
        fx.oracle.set_profile("lowbie", resolvable("Low Bie", 10));

        fx.ledger.receive(request("lowbie", "UID-2")).await;

        let decisions = fx.server.decisions();
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].accepted);
        assert!(decisions[0].reason.as_deref().unwrap().contains("level 50"));
        assert!(fx.ledger.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_request_publishes_and_seeds_note() {
        let fx = fixture();
        fx.oracle.set_profile("pal", resolvable("Pal Astra", 80));

        fx.ledger.receive(request("pal", "UID-3")).await;

        assert_eq!(fx.ledger.pending_requests().len(), 1);
        let events = fx.sink.events();
        assert!(events
            .iter()
            .any(|event| matches!(event, PairingEvent::RequestReceived(_))));
        assert!(events.iter().any(|event| matches!(
            event,
            PairingEvent::RequestNotice { display_name } if display_name == "Pal Astra"
        )));
        // Display name captured and seeded as a note.
        let account = AccountRef::new("UID-3");
        assert_eq!(fx.notes.display_name_for(&account).as_deref(), Some("Pal Astra"));
        assert_eq!(fx.notes.note_for(&account).as_deref(), Some("Pal Astra"));
    }

    #[tokio::test]
    async fn test_receive_does_not_overwrite_existing_note() {
        let fx = fixture();
        fx.oracle.set_profile("pal", resolvable("Pal Astra", 80));
        let account = AccountRef::new("UID-3");
        fx.notes.set_note(&account, "my friend");

        fx.ledger.receive(request("pal", "UID-3")).await;

        assert_eq!(fx.notes.note_for(&account).as_deref(), Some("my friend"));
    }

    #[tokio::test]
    async fn test_deferred_request_rejects_silently_once_in_range() {
        let fx = fixture();
        fx.rules.update(|rules| rules.minimum_level = 50);

        let dto = request("ghost", "UID-4");
        fx.ledger.receive(dto.clone()).await;
        assert!(fx.ledger.is_deferred(dto.request_id));

        // Requester comes into range below the level threshold.
        fx.oracle.set_profile("ghost", resolvable("Gho St", 10));
        fx.ledger.evaluate_pending(&nearby(&["ghost"])).await;

        let decisions = fx.server.decisions();
        assert_eq!(decisions.len(), 1);
        assert!(!decisions[0].accepted);
        assert!(decisions[0].reason.is_none(), "deferred reject must be silent");
        assert!(fx.ledger.pending_requests().is_empty());
        // No user-facing auto-reject notice either.
        assert!(!fx
            .sink
            .events()
            .iter()
            .any(|event| matches!(event, PairingEvent::RequestAutoRejected { .. })));
    }

    #[tokio::test]
    async fn test_non_deferred_request_rejects_with_reason_and_notice() {
        let fx = fixture();

        // No filters at receipt: stored as a normal pending request.
        let dto = request("shifty", "UID-5");
        fx.oracle.set_profile("shifty", resolvable("Shifty Ray", 10));
        fx.ledger.receive(dto.clone()).await;
        assert!(!fx.ledger.is_deferred(dto.request_id));

        // User then configures a level filter; requester is nearby.
        fx.rules.update(|rules| rules.minimum_level = 50);
        fx.ledger.evaluate_pending(&nearby(&["shifty"])).await;

        let decisions = fx.server.decisions();
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].reason.as_deref().unwrap().contains("level 50"));
        assert!(fx
            .sink
            .events()
            .iter()
            .any(|event| matches!(event, PairingEvent::RequestAutoRejected { .. })));
    }

    #[tokio::test]
    async fn test_evaluate_skips_requesters_not_nearby() {
        let fx = fixture();
        fx.rules.update(|rules| rules.minimum_level = 50);

        fx.ledger.receive(request("ghost", "UID-6")).await;
        fx.ledger.evaluate_pending(&nearby(&["someone-else"])).await;

        assert_eq!(fx.ledger.pending_requests().len(), 1);
        assert!(fx.server.decisions().is_empty());
    }

    #[tokio::test]
    async fn test_accept_fills_note_first_writer_wins() {
        let fx = fixture();
        fx.oracle.set_profile("pal", resolvable("Pal Astra", 80));

        let dto = request("pal", "UID-7");
        fx.ledger.receive(dto.clone()).await;
        // receive() already seeded the note; replace it with a user note to
        // prove accept never overwrites.
        let account = AccountRef::new("UID-7");
        fx.notes.set_note(&account, "roommate");

        fx.ledger.respond(dto.request_id, true, None).await;

        assert_eq!(fx.notes.note_for(&account).as_deref(), Some("roommate"));
        assert!(fx.ledger.pending_requests().is_empty());
        let decisions = fx.server.decisions();
        assert!(decisions.last().unwrap().accepted);
    }

    #[tokio::test]
    async fn test_respond_to_unknown_id_still_answers_server() {
        let fx = fixture();
        let id = RequestId::new();

        fx.ledger.respond(id, false, Some("no thanks".to_string())).await;

        let decisions = fx.server.decisions();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].request_id, id);
    }

    #[tokio::test]
    async fn test_duplicate_request_id_keeps_single_entry() {
        let fx = fixture();
        let dto = request("pal", "UID-8");

        fx.ledger.receive(dto.clone()).await;
        fx.ledger.receive(dto).await;

        assert_eq!(fx.ledger.pending_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_publishes_only_when_nonempty() {
        let fx = fixture();
        fx.ledger.clear();
        assert_eq!(fx.sink.pending_changed_count(), 0);

        fx.ledger.receive(request("pal", "UID-9")).await;
        fx.sink.clear();
        fx.ledger.clear();
        assert_eq!(fx.sink.pending_changed_count(), 1);
        assert!(fx.ledger.pending_requests().is_empty());
    }
}
