use super::*;
use crate::runtime::{ActorError, ActorKey, Context, Duration, Inputs, PortKey, PortKind};

struct Nop;

impl runtime::Actor for Nop {
    fn fire(&mut self, _ctx: &mut Context, _inputs: &Inputs) -> Result<(), ActorError> {
        Ok(())
    }
}

/// Add an actor with one input and one output.
fn stage(builder: &mut ModelBuilder, name: &str) -> (BuilderPortKey, BuilderPortKey) {
    let actor = builder.add_actor(name, Nop).unwrap();
    let input = builder.add_input(actor, "in").unwrap();
    let output = builder.add_output(actor, "out").unwrap();
    (input, output)
}

#[test_log::test]
fn test_duplicate_actors_and_ports() {
    let mut builder = ModelBuilder::new();
    let actor = builder.add_actor("ramp", Nop).unwrap();
    assert!(matches!(
        builder.add_actor("ramp", Nop).expect_err("Expected duplicate"),
        BuilderError::DuplicateActorDefinition(name) if name == "ramp"
    ));

    builder.add_output(actor, "out").unwrap();
    assert!(matches!(
        builder
            .add_input(actor, "out")
            .expect_err("Expected duplicate"),
        BuilderError::DuplicatePortDefinition {
            actor_name,
            port_name
        } if actor_name == "ramp" && port_name == "out"
    ));
}

#[test_log::test]
fn test_port_bind_errors() {
    let mut builder = ModelBuilder::new();
    let (a_in, a_out) = stage(&mut builder, "a");
    let (b_in, b_out) = stage(&mut builder, "b");

    assert!(matches!(
        builder.connect(a_in, b_in).expect_err("Expected bind error"),
        BuilderError::PortBindError { from, .. } if from == "a.in"
    ));
    assert!(matches!(
        builder.connect(a_out, b_out).expect_err("Expected bind error"),
        BuilderError::PortBindError { to, .. } if to == "b.out"
    ));

    builder.connect(a_out, b_in).unwrap();
    assert!(matches!(
        builder.connect(a_out, b_in),
        Err(BuilderError::PortBindError { .. })
    ));
}

#[test_log::test]
fn test_depths_and_order() {
    let mut builder = ModelBuilder::new();
    // Added sink first so that runtime keys follow depth rather than insertion order.
    let (sink_in, _) = stage(&mut builder, "sink");
    let (add_in, add_out) = stage(&mut builder, "add");
    let (_, ramp_out) = stage(&mut builder, "ramp");
    let (scale_in, scale_out) = stage(&mut builder, "scale");

    // ramp -> add -> sink, ramp -> scale -> add
    builder.connect(ramp_out, add_in).unwrap();
    builder.connect(ramp_out, scale_in).unwrap();
    builder.connect(scale_out, add_in).unwrap();
    builder.connect(add_out, sink_in).unwrap();

    let depths = builder.build_depth_map().unwrap();
    let depth_of = |name| depths[builder.find_actor_by_name(name).unwrap()];
    assert_eq!(depth_of("ramp"), 0);
    assert_eq!(depth_of("scale"), 1);
    assert_eq!(depth_of("add"), 2);
    assert_eq!(depth_of("sink"), 3);

    let ramp = builder.find_actor_by_name("ramp").unwrap();
    let parts = builder.build().unwrap();
    let topology = parts.model.topology();
    let names: Vec<_> = topology.iter().map(|(_, info)| info.name.as_str()).collect();
    assert_eq!(names, ["ramp", "scale", "add", "sink"]);
    assert_eq!(parts.actor_key(ramp), Some(ActorKey::from(0)));

    let ramp_info = topology.actor(ActorKey::from(0)).unwrap();
    let out = ramp_info.find_port("out").unwrap();
    assert_eq!(out, PortKey::from(1));
    let port = ramp_info.port(out).unwrap();
    assert_eq!(port.kind, PortKind::Output);
    assert_eq!(port.connections.len(), 2);
    assert!(port.connections.iter().all(|c| c.delay.is_none()));

    let destination = parts.destination(sink_in).unwrap();
    assert_eq!(destination.actor, topology.find_actor("sink").unwrap());
    assert_eq!(destination.port, Some(PortKey::from(0)));
}

#[test_log::test]
fn test_causality_loop() {
    let mut builder = ModelBuilder::new();
    let (src_in, src_out) = stage(&mut builder, "src");
    let (a_in, a_out) = stage(&mut builder, "a");
    let (b_in, b_out) = stage(&mut builder, "b");

    builder.connect(src_out, a_in).unwrap();
    builder.connect(a_out, b_in).unwrap();
    builder.connect(b_out, a_in).unwrap();
    builder
        .connect_delayed(b_out, src_in, Duration::ZERO)
        .unwrap();

    match builder.build().expect_err("Expected a causality loop") {
        BuilderError::CausalityLoop { mut actors } => {
            actors.sort();
            assert_eq!(actors, ["a", "b"]);
        }
        err => panic!("unexpected error {err}"),
    }
}

#[test_log::test]
fn test_self_loop() {
    let mut builder = ModelBuilder::new();
    let (a_in, a_out) = stage(&mut builder, "a");
    builder.connect(a_out, a_in).unwrap();
    assert!(matches!(
        builder.build_depth_map(),
        Err(BuilderError::CausalityLoop { actors }) if actors == ["a"]
    ));
}

#[test_log::test]
fn test_delayed_feedback_builds() -> anyhow::Result<()> {
    let mut builder = ModelBuilder::new();
    let (a_in, a_out) = stage(&mut builder, "a");
    let (b_in, b_out) = stage(&mut builder, "b");
    builder.connect(a_out, b_in)?;
    builder.connect_delayed(b_out, a_in, Duration::from_millis(5))?;

    let parts = builder.build()?;
    let topology = parts.model.topology();
    let b = topology.actor(ActorKey::from(1))?;
    assert_eq!(b.name, "b");
    assert_eq!(b.depth, 1);
    let feedback = &b.port(PortKey::from(1)).unwrap().connections[0];
    assert_eq!(feedback.actor, ActorKey::from(0));
    assert_eq!(feedback.delay, Some(Duration::from_millis(5)));
    Ok(())
}
