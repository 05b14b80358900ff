//! Per-peer link state and offer collision rules.

use crate::media::LinkId;
use common::types::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// We sent the offer.
    Offerer,
    /// We answered the peer's offer.
    Answerer,
}

/// `Discovered -> Negotiating -> Connected -> (Closed | Failed)`
///
/// `Discovered` covers the span between opening a link and producing or
/// applying the first offer on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Discovered,
    Negotiating { role: NegotiationRole },
    Connected,
    Closed,
    Failed,
}

impl PeerState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::Discovered => "discovered",
            PeerState::Negotiating { .. } => "negotiating",
            PeerState::Connected => "connected",
            PeerState::Closed => "closed",
            PeerState::Failed => "failed",
        }
    }

    /// Whether `next` may follow this state. Closed and failed are final;
    /// any live state may end in them.
    #[must_use]
    pub fn can_become(self, next: PeerState) -> bool {
        match (self, next) {
            (PeerState::Closed | PeerState::Failed, _) => false,
            (_, PeerState::Closed | PeerState::Failed) => true,
            (PeerState::Discovered, PeerState::Negotiating { .. }) => true,
            (PeerState::Negotiating { .. }, PeerState::Connected) => true,
            _ => false,
        }
    }
}

/// Our view of the current link to one peer, as far as offer handling
/// needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkView {
    pub state: PeerState,
    pub link_id: LinkId,
    /// We sent an ICE restart offer on this link and have no answer yet.
    pub restart_pending: bool,
}

/// The side with the smaller connection id yields during offer collisions.
#[must_use]
pub fn is_polite(me: &ConnectionId, peer: &ConnectionId) -> bool {
    me < peer
}

/// What to do with an incoming offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAction {
    /// No link yet: answer on a new link.
    Accept,
    /// Offer for the current link (ICE restart or renegotiation): answer in place.
    Renegotiate,
    /// Collision and we are polite: drop our own offer, answer theirs.
    Yield,
    /// Restart collision on the current link and we are polite: roll back
    /// our restart, answer theirs in place.
    YieldRestart,
    /// The peer started a fresh link: replace ours and answer.
    Replace,
    /// Duplicate, or collision and we are impolite.
    Ignore,
}

/// Decide how to handle an offer carrying `offer_link` from `peer`, given
/// our current view of that peer.
#[must_use]
pub fn offer_action(
    me: &ConnectionId,
    peer: &ConnectionId,
    current: Option<LinkView>,
    offer_link: LinkId,
) -> OfferAction {
    let Some(view) = current else {
        return OfferAction::Accept;
    };

    if view.link_id == offer_link {
        return match view.state {
            PeerState::Connected if !view.restart_pending => OfferAction::Renegotiate,
            PeerState::Connected if is_polite(me, peer) => OfferAction::YieldRestart,
            _ => OfferAction::Ignore,
        };
    }

    match view.state {
        PeerState::Negotiating {
            role: NegotiationRole::Offerer,
        } => {
            if is_polite(me, peer) {
                OfferAction::Yield
            } else {
                OfferAction::Ignore
            }
        }
        _ => OfferAction::Replace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFERING: PeerState = PeerState::Negotiating {
        role: NegotiationRole::Offerer,
    };
    const ANSWERING: PeerState = PeerState::Negotiating {
        role: NegotiationRole::Answerer,
    };

    fn view(state: PeerState, link_id: LinkId) -> Option<LinkView> {
        Some(LinkView {
            state,
            link_id,
            restart_pending: false,
        })
    }

    fn restarting(link_id: LinkId) -> Option<LinkView> {
        Some(LinkView {
            state: PeerState::Connected,
            link_id,
            restart_pending: true,
        })
    }

    #[test]
    fn test_politeness_is_antisymmetric() {
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");
        assert!(is_polite(&a, &b));
        assert!(!is_polite(&b, &a));
    }

    #[test]
    fn test_first_offer_is_accepted() {
        let me = ConnectionId::from("m");
        let peer = ConnectionId::from("p");
        assert_eq!(offer_action(&me, &peer, None, 1), OfferAction::Accept);
    }

    #[test]
    fn test_glare_exactly_one_side_yields() {
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");

        // a offered link 10, b offered link 20, each receives the other's.
        let at_a = offer_action(&a, &b, view(OFFERING, 10), 20);
        let at_b = offer_action(&b, &a, view(OFFERING, 20), 10);

        assert_eq!(at_a, OfferAction::Yield);
        assert_eq!(at_b, OfferAction::Ignore);
    }

    #[test]
    fn test_restart_offer_on_connected_link_renegotiates() {
        let me = ConnectionId::from("m");
        let peer = ConnectionId::from("p");
        assert_eq!(
            offer_action(&me, &peer, view(PeerState::Connected, 7), 7),
            OfferAction::Renegotiate
        );
    }

    #[test]
    fn test_crossing_restarts_exactly_one_side_yields() {
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");

        // Both restarted link 7 and each receives the other's restart offer.
        let at_a = offer_action(&a, &b, restarting(7), 7);
        let at_b = offer_action(&b, &a, restarting(7), 7);

        assert_eq!(at_a, OfferAction::YieldRestart);
        assert_eq!(at_b, OfferAction::Ignore);
    }

    #[test]
    fn test_duplicate_offer_is_ignored() {
        let me = ConnectionId::from("m");
        let peer = ConnectionId::from("p");
        assert_eq!(
            offer_action(&me, &peer, view(ANSWERING, 7), 7),
            OfferAction::Ignore
        );
    }

    #[test]
    fn test_fresh_link_from_peer_replaces_ours() {
        let me = ConnectionId::from("m");
        let peer = ConnectionId::from("p");
        assert_eq!(
            offer_action(&me, &peer, view(ANSWERING, 7), 8),
            OfferAction::Replace
        );
        assert_eq!(
            offer_action(&me, &peer, view(PeerState::Connected, 7), 8),
            OfferAction::Replace
        );
        assert_eq!(
            offer_action(&me, &peer, restarting(7), 8),
            OfferAction::Replace
        );
    }

    #[test]
    fn test_state_transitions() {
        let discovered = PeerState::Discovered;
        assert!(discovered.can_become(OFFERING));
        assert!(discovered.can_become(ANSWERING));
        assert!(!discovered.can_become(PeerState::Connected));
        assert!(OFFERING.can_become(PeerState::Connected));
        assert!(PeerState::Connected.can_become(PeerState::Failed));
        assert!(!PeerState::Connected.can_become(PeerState::Discovered));
        assert!(!PeerState::Closed.can_become(PeerState::Connected));
        assert!(!PeerState::Failed.can_become(PeerState::Closed));
    }
}
