//! Assembly validation: every inconsistency is reported at build time, by
//! name, before any tick can run.

use ripple_engine::prelude::*;

// -- Test entities ----------------------------------------------------------

static FEED: EventChannel<u64> = EventChannel::new("FEED");
static FEED_AS_TEXT: EventChannel<String> = EventChannel::new("FEED");
static UNREGISTERED: EventChannel<u64> = EventChannel::new("UNREGISTERED");

static X: EntityKey<String, u64> = EntityKey::new("X");
static Y: EntityKey<String, u64> = EntityKey::new("Y");
static Z: EntityKey<String, u64> = EntityKey::new("Z");
static Y_AS_TEXT: EntityKey<String, String> = EntityKey::new("Y");
static NUMBERED: EntityKey<u32, u64> = EntityKey::new("NUMBERED");

/// A manager that never produces keys on its own.
struct Inert;

struct Unchanged;

impl<K: 'static> ElementManager<K, u64> for Inert {
    fn create(
        &self,
        _key: &K,
        _ctx: &UpdateContext,
        _toolbox: &mut Toolbox<'_>,
    ) -> Box<dyn ElementUpdater<u64>> {
        Box::new(Unchanged)
    }
}

impl ElementUpdater<u64> for Unchanged {
    fn update(
        &mut self,
        _previous: Option<&u64>,
        _ctx: &UpdateContext,
        _toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<u64> {
        UpdateResult::Nothing
    }
}

struct Sum;

impl<K: ElementKey> SimpleElementManager<K, u64> for Sum {
    fn update(
        &self,
        _key: &K,
        _previous: Option<&u64>,
        _ctx: &UpdateContext,
        _toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<u64> {
        UpdateResult::Nothing
    }
}

fn feed_entity(builder: EngineBuilder) -> EngineBuilder {
    builder
        .channel(&FEED)
        .entity(&X, Inert, &[], &[FEED.erased()])
}

// -- Reference checks -------------------------------------------------------

#[test]
fn missing_dependency_names_entity_and_dependency() {
    static MISSING: EntityKey<String, u64> = EntityKey::new("MISSING");

    let err = EngineBuilder::new()
        .entity(&X, Inert, &[MISSING.erased()], &[])
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::MissingDependencies {
            entity: "X".to_owned(),
            missing: vec!["MISSING".to_owned()],
        }
    );
    let message = err.to_string();
    assert!(message.contains('X') && message.contains("MISSING"), "{message}");
}

#[test]
fn missing_dependencies_are_sorted_and_unique() {
    static P: EntityKey<String, u64> = EntityKey::new("P");
    static Q: EntityKey<String, u64> = EntityKey::new("Q");

    let err = EngineBuilder::new()
        .entity(&X, Inert, &[Q.erased(), P.erased(), Q.erased()], &[])
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::MissingDependencies {
            entity: "X".to_owned(),
            missing: vec!["P".to_owned(), "Q".to_owned()],
        }
    );
}

#[test]
fn missing_channel_is_reported() {
    let err = EngineBuilder::new()
        .entity(&X, Inert, &[], &[UNREGISTERED.erased()])
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::MissingChannels {
            entity: "X".to_owned(),
            missing: vec!["UNREGISTERED".to_owned()],
        }
    );
}

#[test]
fn duplicate_names_are_rejected() {
    let err = feed_entity(EngineBuilder::new())
        .entity(&X, Inert, &[], &[FEED.erased()])
        .build()
        .unwrap_err();
    assert_eq!(err, BuildError::DuplicateEntity("X".to_owned()));

    let err = feed_entity(EngineBuilder::new())
        .channel(&FEED)
        .build()
        .unwrap_err();
    assert_eq!(err, BuildError::DuplicateChannel("FEED".to_owned()));
}

#[test]
fn duplicate_channel_is_checked_before_duplicate_entity() {
    let err = feed_entity(feed_entity(EngineBuilder::new()))
        .build()
        .unwrap_err();
    assert_eq!(err, BuildError::DuplicateChannel("FEED".to_owned()));
}

#[test]
fn entity_without_inputs_is_isolated() {
    let err = feed_entity(EngineBuilder::new())
        .entity(&Y, Inert, &[], &[])
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::Isolated {
            entity: "Y".to_owned()
        }
    );
}

// -- Type checks ------------------------------------------------------------

#[test]
fn dependency_token_with_other_state_type_is_rejected() {
    let err = feed_entity(EngineBuilder::new())
        .entity(&Y, Inert, &[X.erased()], &[])
        .entity(&Z, Inert, &[Y_AS_TEXT.erased()], &[])
        .build()
        .unwrap_err();

    match err {
        BuildError::TypeMismatch {
            entity,
            reference,
            expected,
            found,
        } => {
            assert_eq!(entity, "Z");
            assert_eq!(reference, "Y");
            assert!(expected.ends_with("u64"), "{expected}");
            assert!(found.ends_with("String"), "{found}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn channel_token_with_other_payload_is_rejected() {
    let err = feed_entity(EngineBuilder::new())
        .entity(&Y, Inert, &[], &[FEED_AS_TEXT.erased()])
        .build()
        .unwrap_err();
    assert!(
        matches!(err, BuildError::TypeMismatch { ref entity, ref reference, .. }
            if entity == "Y" && reference == "FEED"),
        "{err}"
    );
}

#[test]
fn simple_entity_needs_matching_key_types() {
    let err = feed_entity(EngineBuilder::new())
        .entity(&NUMBERED, Inert, &[], &[FEED.erased()])
        .simple_entity(&Y, Sum, &[X.erased(), NUMBERED.erased()])
        .build()
        .unwrap_err();

    match err {
        BuildError::KeyTypeMismatch {
            entity, dependency, ..
        } => {
            assert_eq!(entity, "Y");
            assert_eq!(dependency, "NUMBERED");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// -- Cycles -----------------------------------------------------------------

#[test]
fn dependency_cycle_reports_path() {
    let err = feed_entity(EngineBuilder::new())
        .entity(&Y, Inert, &[X.erased(), Z.erased()], &[])
        .entity(&Z, Inert, &[Y.erased()], &[])
        .build()
        .unwrap_err();

    assert_eq!(
        err,
        BuildError::DependencyCycle {
            cycle: vec!["Y".to_owned(), "Z".to_owned(), "Y".to_owned()],
        }
    );
    assert_eq!(err.to_string(), "dependency cycle: Y -> Z -> Y");
}

#[test]
fn valid_graph_builds() {
    let engine = feed_entity(EngineBuilder::new())
        .simple_entity(&Y, Sum, &[X.erased()])
        .simple_entity(&Z, Sum, &[X.erased(), Y.erased()])
        .build()
        .unwrap();
    assert_eq!(engine.entity_names(), vec!["X", "Y", "Z"]);
    assert_eq!(
        engine.topology()[0].dependents,
        vec!["Y".to_owned(), "Z".to_owned()]
    );
}
