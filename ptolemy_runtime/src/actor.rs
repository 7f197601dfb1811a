use crate::{ActorError, Context, PortKey, Token};

/// The action-method capability a director drives.
///
/// Every method receives the director's [`Context`] for the firing. Only [`Actor::fire`] is
/// mandatory; the default `prefire` and `postfire` keep the actor enabled.
pub trait Actor: Send {
    /// Called once, in topological order, before the first firing. May schedule events.
    fn initialize(&mut self, _ctx: &mut Context) -> Result<(), ActorError> {
        Ok(())
    }

    /// Returning `false` skips this firing; the delivered inputs are consumed regardless.
    fn prefire(&mut self, _ctx: &mut Context, _inputs: &Inputs) -> Result<bool, ActorError> {
        Ok(true)
    }

    fn fire(&mut self, ctx: &mut Context, inputs: &Inputs) -> Result<(), ActorError>;

    /// Returning `false` disables the actor and asks the director to wrap up.
    fn postfire(&mut self, _ctx: &mut Context) -> Result<bool, ActorError> {
        Ok(true)
    }

    /// Called once, in reverse topological order, at the end of the run.
    fn wrapup(&mut self, _ctx: &mut Context) -> Result<(), ActorError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor").finish_non_exhaustive()
    }
}

/// Tokens delivered to an actor for one firing, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    values: Vec<(PortKey, Token)>,
    /// Number of pure events (refire requests) in this firing.
    refires: usize,
}

impl Inputs {
    pub(crate) fn push(&mut self, port: Option<PortKey>, value: Token) {
        match port {
            Some(port) => self.values.push((port, value)),
            None => self.refires += 1,
        }
    }

    /// The first token delivered on `port`, if any.
    pub fn get(&self, port: PortKey) -> Option<&Token> {
        self.get_all(port).next()
    }

    /// All tokens delivered on `port`.
    pub fn get_all(&self, port: PortKey) -> impl Iterator<Item = &Token> {
        self.values
            .iter()
            .filter(move |(key, _)| *key == port)
            .map(|(_, value)| value)
    }

    pub fn has_token(&self, port: PortKey) -> bool {
        self.get(port).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortKey, &Token)> {
        self.values.iter().map(|(port, value)| (*port, value))
    }

    /// `true` if the firing was requested through `fire_at` rather than by an input token.
    pub fn is_refire(&self) -> bool {
        self.refires > 0
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
