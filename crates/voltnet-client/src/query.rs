use crate::error::SyncError;

type ApplyFn<T> = Box<dyn Fn(&mut T) + Send>;

/// Handle for a single in-flight fetch. Settling with a stale generation is
/// discarded: last request wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchGeneration(u64);

/// Handle for one pending optimistic mutation, used to roll it back if the
/// backing request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationTicket(u64);

enum Phase {
    Idle,
    Fetching,
    Error(SyncError),
}

/// Observed state of a tracked query. The snapshot inside is the rendered
/// view: base snapshot with pending optimistic mutations applied in arrival
/// order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    Idle(Option<T>),
    Fetching(Option<T>),
    Error(SyncError, Option<T>),
}

struct PendingMutation<T> {
    ticket: MutationTicket,
    apply: ApplyFn<T>,
}

/// Per-query synchronization state machine.
///
/// One instance tracks one server query (a conversation's messages, the
/// notification list, an unread counter). Fetches move Idle -> Fetching ->
/// Idle/Error; optimistic mutations overlay the base snapshot until an
/// authoritative refetch replaces it or a rollback removes them.
pub struct TrackedQuery<T: Clone> {
    base: Option<T>,
    phase: Phase,
    pending: Vec<PendingMutation<T>>,
    /// Most recently started fetch. A settle for anything older is stale.
    latest_generation: u64,
    next_ticket: u64,
}

impl<T: Clone> Default for TrackedQuery<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> TrackedQuery<T> {
    pub fn new() -> Self {
        Self {
            base: None,
            phase: Phase::Idle,
            pending: Vec::new(),
            latest_generation: 0,
            next_ticket: 0,
        }
    }

    /// Base snapshot with pending mutations applied in arrival order.
    pub fn view(&self) -> Option<T> {
        let mut snapshot = self.base.clone()?;
        for mutation in &self.pending {
            (mutation.apply)(&mut snapshot);
        }
        Some(snapshot)
    }

    pub fn state(&self) -> QueryState<T> {
        let view = self.view();
        match &self.phase {
            Phase::Idle => QueryState::Idle(view),
            Phase::Fetching => QueryState::Fetching(view),
            Phase::Error(e) => QueryState::Error(e.clone(), view),
        }
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Fetching)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enter Fetching. Allowed from any state: background polling re-enters
    /// on its cadence regardless of what the query is doing, and the newer
    /// generation supersedes anything still in flight.
    pub fn begin_fetch(&mut self) -> FetchGeneration {
        self.latest_generation += 1;
        self.phase = Phase::Fetching;
        FetchGeneration(self.latest_generation)
    }

    /// Settle a fetch. Returns false when the response was stale — a fresher
    /// fetch started after this one, so the arrival is discarded unseen.
    ///
    /// A successful settle installs the authoritative snapshot and drops all
    /// pending mutations: anything the server accepted is in the new base,
    /// anything it rejected should not survive it either. A failed settle
    /// keeps the previous snapshot visible alongside the error.
    pub fn settle(&mut self, generation: FetchGeneration, result: Result<T, SyncError>) -> bool {
        if generation.0 < self.latest_generation {
            return false;
        }

        match result {
            Ok(snapshot) => {
                self.base = Some(snapshot);
                self.pending.clear();
                self.phase = Phase::Idle;
            }
            Err(e) => {
                self.phase = Phase::Error(e);
            }
        }
        true
    }

    /// Overlay an optimistic mutation. Only meaningful once a snapshot
    /// exists and no fetch is in flight; otherwise there is nothing coherent
    /// to mutate and the caller should go through a plain fetch.
    pub fn apply_optimistic(
        &mut self,
        apply: impl Fn(&mut T) + Send + 'static,
    ) -> Option<MutationTicket> {
        if self.base.is_none() || !matches!(self.phase, Phase::Idle) {
            return None;
        }

        self.next_ticket += 1;
        let ticket = MutationTicket(self.next_ticket);
        self.pending.push(PendingMutation {
            ticket,
            apply: Box::new(apply),
        });
        Some(ticket)
    }

    /// Remove a pending mutation. The rendered view returns to what it was
    /// before that mutation was applied (later mutations re-apply on top of
    /// the restored snapshot).
    pub fn rollback(&mut self, ticket: MutationTicket) {
        self.pending.retain(|m| m.ticket != ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct CommunityView {
        member_count: u32,
        joined: bool,
    }

    fn settled(view: CommunityView) -> TrackedQuery<CommunityView> {
        let mut q = TrackedQuery::new();
        let generation = q.begin_fetch();
        assert!(q.settle(generation, Ok(view)));
        q
    }

    #[test]
    fn fetch_transitions_idle_to_fetching_to_idle() {
        let mut q: TrackedQuery<u64> = TrackedQuery::new();
        assert_eq!(q.state(), QueryState::Idle(None));

        let generation = q.begin_fetch();
        assert_eq!(q.state(), QueryState::Fetching(None));

        assert!(q.settle(generation, Ok(7)));
        assert_eq!(q.state(), QueryState::Idle(Some(7)));
    }

    #[test]
    fn failed_fetch_keeps_previous_snapshot() {
        let mut q: TrackedQuery<u64> = TrackedQuery::new();
        let generation = q.begin_fetch();
        q.settle(generation, Ok(7));

        let generation = q.begin_fetch();
        assert_eq!(q.state(), QueryState::Fetching(Some(7)));

        let err = SyncError::Transport("connection reset".into());
        assert!(q.settle(generation, Err(err.clone())));
        assert_eq!(q.state(), QueryState::Error(err, Some(7)));

        // A later successful poll recovers.
        let generation = q.begin_fetch();
        assert!(q.settle(generation, Ok(9)));
        assert_eq!(q.state(), QueryState::Idle(Some(9)));
    }

    #[test]
    fn stale_poll_response_is_discarded() {
        let mut q: TrackedQuery<u64> = TrackedQuery::new();

        let old_poll = q.begin_fetch();
        let fresh = q.begin_fetch();

        // The superseded poll arrives late; its payload must not land.
        assert!(!q.settle(old_poll, Ok(1)));
        assert_eq!(q.state(), QueryState::Fetching(None));

        assert!(q.settle(fresh, Ok(2)));
        assert_eq!(q.state(), QueryState::Idle(Some(2)));
    }

    #[test]
    fn optimistic_join_then_rollback_restores_member_count() {
        let mut q = settled(CommunityView {
            member_count: 41,
            joined: false,
        });

        let ticket = q
            .apply_optimistic(|view: &mut CommunityView| {
                view.member_count += 1;
                view.joined = true;
            })
            .unwrap();

        assert_eq!(
            q.view().unwrap(),
            CommunityView {
                member_count: 42,
                joined: true
            }
        );

        // Server rejected the join: the visible count reverts exactly.
        q.rollback(ticket);
        assert_eq!(
            q.view().unwrap(),
            CommunityView {
                member_count: 41,
                joined: false
            }
        );
    }

    #[test]
    fn pending_mutations_apply_in_arrival_order() {
        let mut q = settled(CommunityView {
            member_count: 10,
            joined: false,
        });

        let double = q
            .apply_optimistic(|v: &mut CommunityView| v.member_count *= 2)
            .unwrap();
        q.apply_optimistic(|v: &mut CommunityView| v.member_count += 1)
            .unwrap();

        assert_eq!(q.view().unwrap().member_count, 21);

        // Rolling back the first leaves the second applied to the base.
        q.rollback(double);
        assert_eq!(q.view().unwrap().member_count, 11);
    }

    #[test]
    fn refetch_supersedes_pending_mutations() {
        let mut q = settled(CommunityView {
            member_count: 5,
            joined: false,
        });
        q.apply_optimistic(|v: &mut CommunityView| v.member_count += 1)
            .unwrap();
        assert_eq!(q.pending_len(), 1);

        // Authoritative refetch replaces the overlayed view wholesale.
        let generation = q.begin_fetch();
        q.settle(
            generation,
            Ok(CommunityView {
                member_count: 6,
                joined: true,
            }),
        );
        assert_eq!(q.pending_len(), 0);
        assert_eq!(q.view().unwrap().member_count, 6);
    }

    #[test]
    fn no_optimistic_mutation_without_a_snapshot_or_mid_fetch() {
        let mut q: TrackedQuery<u64> = TrackedQuery::new();
        assert!(q.apply_optimistic(|v| *v += 1).is_none());

        let generation = q.begin_fetch();
        assert!(q.apply_optimistic(|v| *v += 1).is_none());
        q.settle(generation, Ok(1));
        assert!(q.apply_optimistic(|v| *v += 1).is_some());
    }
}
