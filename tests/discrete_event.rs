use std::sync::{Arc, Mutex};

use ptolemy::prelude::*;
use ptolemy::runtime::CalendarQueue;

type Received = Arc<Mutex<Vec<(Tag, Token)>>>;

/// Emits 0, 1, 2, ... every `period`, starting at the start time.
struct Ramp {
    period: Duration,
    next: i64,
    out: Option<PortKey>,
}

impl Ramp {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next: 0,
            out: None,
        }
    }
}

impl Actor for Ramp {
    fn initialize(&mut self, ctx: &mut Context) -> Result<(), ActorError> {
        self.out = Some(ctx.port("out")?);
        ctx.fire_at(ctx.actor(), ctx.model_time(), 1)?;
        Ok(())
    }

    fn fire(&mut self, ctx: &mut Context, _inputs: &Inputs) -> Result<(), ActorError> {
        let out = self.out.ok_or("uninitialized")?;
        ctx.send(out, self.next)?;
        self.next += 1;
        ctx.fire_after(self.period)?;
        Ok(())
    }
}

/// Records every token received on its `in` port.
struct Recorder {
    received: Received,
}

impl Actor for Recorder {
    fn fire(&mut self, ctx: &mut Context, inputs: &Inputs) -> Result<(), ActorError> {
        let mut received = self.received.lock().unwrap();
        for (_, token) in inputs.iter() {
            received.push((ctx.tag(), token.clone()));
        }
        Ok(())
    }
}

fn ramp_model(period: Duration, received: &Received) -> anyhow::Result<ModelBuilder> {
    let mut builder = ModelBuilder::new();
    // Added before the ramp so that ordering comes from the connection, not insertion.
    let recorder = builder.add_actor(
        "recorder",
        Recorder {
            received: received.clone(),
        },
    )?;
    let input = builder.add_input(recorder, "in")?;
    let ramp = builder.add_actor("ramp", Ramp::new(period))?;
    let out = builder.add_output(ramp, "out")?;
    builder.connect(out, input)?;
    Ok(builder)
}

fn at(secs: u64, microstep: usize) -> Tag {
    Tag::new(Timestamp::new(secs, 0), microstep)
}

#[test_log::test]
fn self_scheduling_model_stops_at_stop_time() -> anyhow::Result<()> {
    let received = Received::default();
    let parts = ramp_model(Duration::from_secs(1), &received)?.build()?;

    let config = Config::default().with_stop_time(Timestamp::new(5, 0));
    let stats = Director::new(parts.model, config).run()?;

    let received = received.lock().unwrap();
    let values: Vec<_> = received.iter().filter_map(|(_, t)| t.as_long()).collect();
    assert_eq!(values, [0, 1, 2, 3, 4, 5]);
    // The first firing happens at microstep 1 of the start time, then every second after.
    assert_eq!(received[0].0, at(0, 1));
    assert_eq!(received[1].0, at(1, 0));
    assert_eq!(stats.final_tag, at(5, 0));
    Ok(())
}

#[test_log::test]
fn timeout_halts_after_its_tag() -> anyhow::Result<()> {
    let received = Received::default();
    let mut builder = ramp_model(Duration::from_millis(500), &received)?;
    builder.add_actor("timeout", Timeout::new(Duration::from_secs(2)))?;

    let stats = ptolemy::runner::run_model(builder, Config::default())?;

    let received = received.lock().unwrap();
    // Tokens at 0, 0.5, 1, 1.5 and 2 seconds; the tag of the timeout itself is completed.
    assert_eq!(received.len(), 5);
    assert_eq!(received.last().unwrap().0, at(2, 0));
    assert_eq!(stats.final_tag, at(2, 0));
    Ok(())
}

#[test_log::test]
fn iterations_bound_the_run() -> anyhow::Result<()> {
    let received = Received::default();
    let parts = ramp_model(Duration::from_secs(1), &received)?.build()?;

    let config = Config::default().with_iterations(4);
    Director::new(parts.model, config).run()?;

    // Each iteration fires either the ramp or the recorder.
    assert_eq!(received.lock().unwrap().len(), 2);
    Ok(())
}

#[test]
fn queue_extracts_in_tag_order() {
    let actor = ActorKey::from(0);
    let mut queue = CalendarQueue::new();
    for tag in [
        Tag::new(Timestamp::new(1, 0), 0),
        Tag::new(Timestamp::new(1, 0), 1),
        Tag::new(Timestamp::new(0, 500_000_000), 0),
    ] {
        queue.insert(Event::pure(tag, actor)).unwrap();
    }

    let order: Vec<Tag> = std::iter::from_fn(|| queue.extract_min())
        .map(|event| event.tag())
        .collect();
    assert_eq!(
        order,
        [
            Tag::new(Timestamp::new(0, 500_000_000), 0),
            Tag::new(Timestamp::new(1, 0), 0),
            Tag::new(Timestamp::new(1, 0), 1),
        ]
    );
}

#[test]
fn tag_add_normalizes() {
    let tag = Tag::new(Timestamp::ZERO, 0)
        .add(time::Duration::new(1, 1_500_000_000))
        .unwrap();
    assert_eq!(tag.timestamp, Timestamp::new(2, 500_000_000));
    assert_eq!(tag.microstep, 0);
}

#[test_log::test]
fn builder_rejects_zero_delay_loop() {
    let mut builder = ModelBuilder::new();
    let a = builder.add_actor("a", Ramp::new(Duration::from_secs(1))).unwrap();
    let b = builder.add_actor("b", Ramp::new(Duration::from_secs(1))).unwrap();
    let a_in = builder.add_input(a, "in").unwrap();
    let a_out = builder.add_output(a, "out").unwrap();
    let b_in = builder.add_input(b, "in").unwrap();
    let b_out = builder.add_output(b, "out").unwrap();
    builder.connect(a_out, b_in).unwrap();
    builder.connect(b_out, a_in).unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, BuilderError::CausalityLoop { .. }));
    assert!(err.to_string().contains("a"));
}
