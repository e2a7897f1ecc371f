//! End-to-end checks of the message grammar: reply derivation, depth
//! monotonicity, terminal classification and field isolation.

use negotiation_core::{
    AnyMessage, Envelope, Explanation, Feature, MessageKind, Motivation, Query, QueryMessage,
    Recommendation, METADATA_DEPTH, METADATA_TYPE,
};

fn root_query() -> QueryMessage {
    QueryMessage::new(
        Query::new("question?"),
        "user@host.any",
        "agent@host.any",
        "conversation#1",
    )
}

#[test]
fn recommendation_reply_from_query() {
    let query = root_query();
    assert_eq!(query.depth(), 0);

    let rec = query
        .make_recommendation_reply(&Recommendation::new("answer!"))
        .unwrap();

    assert_eq!(rec.kind(), MessageKind::Recommendation);
    assert_eq!(rec.depth(), 1);
    assert_eq!(rec.query().unwrap(), Query::new("question?"));
    assert_eq!(rec.recommendation().unwrap(), Recommendation::new("answer!"));
    assert_eq!(rec.envelope().thread, "conversation#1");
    assert!(!rec.is_terminal());
}

#[test]
fn why_reply_keeps_query_and_recommendation() {
    let rec = root_query()
        .make_recommendation_reply(&Recommendation::new("answer!"))
        .unwrap();
    let why = rec.make_why_reply().unwrap();

    assert_eq!(why.kind(), MessageKind::Why);
    assert_eq!(why.depth(), 2);
    assert_eq!(why.query().unwrap(), Query::new("question?"));
    assert_eq!(why.recommendation().unwrap(), Recommendation::new("answer!"));
    assert!(!why.is_terminal());
}

#[test]
fn accept_reply_is_terminal() {
    let rec = root_query()
        .make_recommendation_reply(&Recommendation::new("answer!"))
        .unwrap();
    let accept = rec.make_accept_reply().unwrap();

    assert_eq!(accept.kind(), MessageKind::Accept);
    assert_eq!(accept.depth(), 2);
    assert!(accept.is_terminal());
}

#[test]
fn comparison_flow_carries_all_four_fields() {
    let rec = root_query()
        .make_recommendation_reply(&Recommendation::new("answer!"))
        .unwrap();
    let why_not = rec
        .make_why_not_reply(&Recommendation::new("another_answer!"))
        .unwrap();
    let comparison = why_not
        .make_comparison_reply(&Explanation::new("it is faster"))
        .unwrap();

    assert_eq!(comparison.kind(), MessageKind::Comparison);
    assert_eq!(comparison.depth(), why_not.depth() + 1);
    assert_eq!(comparison.query().unwrap(), Query::new("question?"));
    assert_eq!(
        comparison.recommendation().unwrap(),
        Recommendation::new("answer!")
    );
    assert_eq!(
        comparison.alternative().unwrap(),
        Recommendation::new("another_answer!")
    );
    assert_eq!(
        comparison.explanation().unwrap(),
        Explanation::new("it is faster")
    );
    assert!(!comparison.is_terminal());

    let accept = comparison.make_accept_reply().unwrap();
    assert!(accept.is_terminal());
    assert_eq!(accept.depth(), comparison.depth() + 1);
}

#[test]
fn every_reply_increments_depth_by_one() {
    let query = root_query();
    let rec = query
        .make_recommendation_reply(&Recommendation::new("r"))
        .unwrap();
    let alt = Recommendation::new("alt");
    let expl = Explanation::new("e");

    let replies: Vec<(u32, u32)> = vec![
        (query.depth(), rec.depth()),
        (rec.depth(), rec.make_why_reply().unwrap().depth()),
        (rec.depth(), rec.make_why_not_reply(&alt).unwrap().depth()),
        (rec.depth(), rec.make_accept_reply().unwrap().depth()),
        (
            rec.depth(),
            rec.make_collision_reply(&Feature::new("f")).unwrap().depth(),
        ),
        (
            rec.depth(),
            rec.make_disapprove_reply(&Motivation::new("m"))
                .unwrap()
                .depth(),
        ),
    ];
    for (parent, child) in replies {
        assert_eq!(child, parent + 1);
    }

    let why_not = rec.make_why_not_reply(&alt).unwrap();
    let comparison = why_not.make_comparison_reply(&expl).unwrap();
    let invalid = why_not.make_invalid_alternative_reply(&expl).unwrap();
    assert_eq!(comparison.depth(), why_not.depth() + 1);
    assert_eq!(invalid.depth(), why_not.depth() + 1);
    assert_eq!(
        comparison.make_prefer_alternative_reply().unwrap().depth(),
        comparison.depth() + 1
    );
    assert_eq!(
        invalid
            .make_override_recommendation_reply()
            .unwrap()
            .depth(),
        invalid.depth() + 1
    );

    let details = rec
        .make_why_reply()
        .unwrap()
        .make_more_details_reply(&expl)
        .unwrap();
    let unclear = details.make_unclear_reply().unwrap();
    assert_eq!(unclear.depth(), details.depth() + 1);
    assert_eq!(
        unclear
            .make_more_details_reply(&Explanation::new("e2"))
            .unwrap()
            .depth(),
        unclear.depth() + 1
    );
}

#[test]
fn field_reassignment_touches_only_its_segment() {
    let mut rec = root_query()
        .make_recommendation_reply(&Recommendation::new("answer!"))
        .unwrap();
    let body_before = rec.envelope().body().to_owned();

    rec.set_recommendation(&Recommendation::new("another_answer!"));

    let body_after = rec.envelope().body();
    assert!(body_after.contains("<query>question?</query>"));
    assert!(body_after.contains("<recommendation>another_answer!</recommendation>"));
    assert!(!body_after.contains("<recommendation>answer!</recommendation>"));
    // The query segment is byte-for-byte what it was.
    let query_segment = "<query>question?</query>";
    assert!(body_before.contains(query_segment));
    assert!(body_after.contains(query_segment));
}

#[test]
fn inbound_envelope_dispatches_on_the_type_tag() {
    let mut env = Envelope::new("agent@host.any", "user@host.any", "conversation#1");
    env.set_metadata(METADATA_TYPE, "Recommendation");
    env.set_metadata(METADATA_DEPTH, "1");
    env.pack_field("query", &Query::new("question?"));
    env.pack_field("recommendation", &Recommendation::new("answer!"));

    let any = AnyMessage::from_envelope(env).unwrap();
    assert_eq!(any.kind(), MessageKind::Recommendation);
    assert_eq!(any.depth(), 1);
    match any {
        AnyMessage::Recommendation(rec) => {
            assert_eq!(rec.query().unwrap(), Query::new("question?"));
        }
        other => panic!("wrapped as {:?}", other.kind()),
    }
}

#[test]
fn wire_round_trip_preserves_structural_equality() {
    let rec = root_query()
        .make_recommendation_reply(&Recommendation::new("answer!"))
        .unwrap();
    let wire = rec.envelope().clone();
    let back = AnyMessage::from_envelope(wire).unwrap();
    assert_eq!(back, AnyMessage::Recommendation(rec));
}
