//! Bounce generation never loops, whatever the addresses

use cells_types::{ActorPath, BounceReason, Envelope, Payload};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_-]{0,15}"
}

fn reason() -> impl Strategy<Value = BounceReason> {
    prop_oneof![
        Just(BounceReason::TransportFailure),
        Just(BounceReason::UnresolvedName),
        Just(BounceReason::NoRouteLocally),
    ]
}

proptest! {
    #[test]
    fn bounce_goes_to_source_and_is_never_bounced(
        src_actor in name(),
        src_domain in name(),
        dst_actor in name(),
        dst_domain in name(),
        first in reason(),
        second in reason(),
    ) {
        let source = ActorPath::new(src_actor, src_domain).unwrap();
        let destination = ActorPath::new(dst_actor, dst_domain).unwrap();
        let envelope = Envelope::data(source.clone(), destination.clone(), vec![1, 2, 3]);
        let gateway = ActorPath::new("tunnel", "gw").unwrap();

        let bounce = envelope.bounce(first, "failed", gateway.clone()).unwrap();
        prop_assert_eq!(bounce.destination(), &source);
        prop_assert_ne!(bounce.id(), envelope.id());
        match bounce.payload() {
            Payload::Bounce(notice) => {
                prop_assert_eq!(notice.original_id, envelope.id());
                prop_assert_eq!(&notice.original_destination, &destination);
            }
            other => prop_assert!(false, "unexpected payload {:?}", other),
        }

        // retargeting keeps the bounce a bounce
        let moved = bounce.with_destination_domain("elsewhere");
        prop_assert!(moved.bounce(second, "again", gateway).is_none());
    }
}
