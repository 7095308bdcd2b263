//! Projection runner: deterministic replay for rebuilds.

use crate::{EventEnvelope, Projection};

/// Runs envelopes through a projection, tracking how many have been
/// applied. Read models are disposable — events are the source of truth —
/// so rebuilding is just replaying a fresh `Projection` through this.
#[derive(Debug)]
pub struct ProjectionRunner<P> {
    projection: P,
    applied: u64,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self { projection, applied: 0 }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn apply(&mut self, envelope: &EventEnvelope<P::Key, P::Ev>) {
        self.projection.apply(envelope);
        self.applied += 1;
    }

    pub fn run<'a>(&mut self, envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Key, P::Ev>>)
    where
        P::Key: 'a,
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env);
        }
    }

    /// Rebuild a projection from scratch by replaying the full event
    /// history through a freshly constructed instance.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Key, P::Ev>>,
    ) -> P
    where
        P::Key: 'a,
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes);
        runner.into_projection()
    }
}
