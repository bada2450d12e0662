//! Property-based tests for the session event queue and roster merging

use std::collections::BTreeSet;

use duelsync_core::Gamertag;
use duelsync_runtime::session::EventQueue;
use duelsync_runtime::{Roster, SessionEndReason, SessionEvent};
use proptest::prelude::*;

fn arb_roster_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        r"[A-Z][a-z]{0,6}".prop_map(|n| SessionEvent::GamerJoined {
            gamer: Gamertag::new(n)
        }),
        r"[A-Z][a-z]{0,6}".prop_map(|n| SessionEvent::GamerLeft {
            gamer: Gamertag::new(n)
        }),
        Just(SessionEvent::GameStarted),
        Just(SessionEvent::GameEnded),
    ]
}

fn arb_reason() -> impl Strategy<Value = SessionEndReason> {
    prop_oneof![
        Just(SessionEndReason::ClientSignedOut),
        Just(SessionEndReason::Disconnected),
        Just(SessionEndReason::HostEndedSession),
        Just(SessionEndReason::RemovedByHost),
    ]
}

/// Distinct gamertags split into (host view, locally seen only)
fn arb_gamer_split() -> impl Strategy<Value = (Vec<Gamertag>, Vec<Gamertag>)> {
    prop::collection::btree_set(r"[a-z]{1,8}", 2..10).prop_flat_map(|names| {
        let names: Vec<Gamertag> = names.into_iter().map(Gamertag::new).collect();
        let len = names.len();
        (Just(names), 2..=len).prop_map(|(names, split)| {
            let (host, local) = names.split_at(split);
            (host.to_vec(), local.to_vec())
        })
    })
}

proptest! {
    #[test]
    fn events_come_out_in_push_order(events in prop::collection::vec(arb_roster_event(), 0..20)) {
        let mut queue = EventQueue::new();
        for event in &events {
            queue.push(event.clone());
        }
        let drained: Vec<SessionEvent> = std::iter::from_fn(|| queue.get_next_event()).collect();
        prop_assert_eq!(drained, events);
    }

    #[test]
    fn pushed_back_events_are_handled_first(
        events in prop::collection::vec(arb_roster_event(), 1..20),
        taken in any::<prop::sample::Index>(),
    ) {
        let mut queue = EventQueue::new();
        for event in &events {
            queue.push(event.clone());
        }
        let count = taken.index(events.len()) + 1;
        let mut held: Vec<SessionEvent> = (0..count).filter_map(|_| queue.get_next_event()).collect();
        while let Some(event) = held.pop() {
            queue.push_back_event(event);
        }
        let drained: Vec<SessionEvent> = std::iter::from_fn(|| queue.get_next_event()).collect();
        prop_assert_eq!(drained, events);
    }

    #[test]
    fn session_end_leaves_only_itself(
        events in prop::collection::vec(arb_roster_event(), 0..20),
        reason in arb_reason(),
    ) {
        let mut queue = EventQueue::new();
        for event in events {
            queue.push(event);
        }
        queue.push(SessionEvent::SessionEnded { reason });
        prop_assert_eq!(queue.len(), 1);
        prop_assert_eq!(queue.get_next_event(), Some(SessionEvent::SessionEnded { reason }));
    }

    #[test]
    fn reconcile_keeps_every_gamer_once((host_view, local_only) in arb_gamer_split()) {
        let mut observed = local_only.clone();
        observed.extend(host_view.iter().take(1).cloned());
        let mut roster = Roster::observed(observed);

        let active = host_view[..2].to_vec();
        roster.reconcile(&host_view, &active, &[1, 2]);

        let gamers = roster.gamers();
        prop_assert_eq!(&gamers[..host_view.len()], host_view.as_slice());
        let unique: BTreeSet<&Gamertag> = gamers.iter().collect();
        prop_assert_eq!(unique.len(), gamers.len());
        prop_assert_eq!(gamers.len(), host_view.len() + local_only.len());
        for gamer in &local_only {
            prop_assert!(roster.contains(gamer));
            prop_assert!(!roster.is_welcomed(gamer));
        }
        prop_assert_eq!(roster.active(), active.as_slice());
        prop_assert_eq!(roster.slot_of(&active[1]).map(|s| s.index()), Some(1));
    }
}
