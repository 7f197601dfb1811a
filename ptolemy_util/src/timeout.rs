//! An actor that halts the model after a given timeout.

use ptolemy_runtime::{Actor, ActorError, Context, Duration, Inputs, Timestamp};

#[derive(Debug, Clone)]
pub struct Timeout {
    timeout: Duration,
    stop_at: Option<Timestamp>,
}

impl Timeout {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            stop_at: None,
        }
    }
}

impl Actor for Timeout {
    fn initialize(&mut self, ctx: &mut Context) -> Result<(), ActorError> {
        let stop_at = ctx.model_time().offset(self.timeout);
        ctx.fire_at(ctx.actor(), stop_at, 0)?;
        self.stop_at = Some(stop_at);
        Ok(())
    }

    fn fire(&mut self, _ctx: &mut Context, _inputs: &Inputs) -> Result<(), ActorError> {
        Ok(())
    }

    fn postfire(&mut self, ctx: &mut Context) -> Result<bool, ActorError> {
        let expired = self.stop_at.is_some_and(|stop_at| ctx.model_time() >= stop_at);
        if expired {
            tracing::info!(tag = %ctx.tag(), "Timeout reached");
        }
        Ok(!expired)
    }
}
