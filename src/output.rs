//! Output buffer ownership and routing
//!
//! The engine owns every [`BlipBuffer`]. Chips keep a [`ChannelRoute`] per
//! channel and are handed `&mut OutputBuffers` for each call that emits
//! deltas, so re-routing a channel never invalidates anything.

use crate::blip::BlipBuffer;

/// Number of triangle/noise/DMC buffers.
pub const TND_BUFFER_COUNT: usize = 3;

/// Destination of one chip channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelRoute {
    /// Channel produces no output
    #[default]
    Silenced,
    /// Linearly mixed group (pulses and every expansion)
    Linear,
    /// One of the non-linear TND buffers (0..3)
    Tnd(usize),
}

impl ChannelRoute {
    /// True unless the channel is silenced.
    pub fn is_audible(self) -> bool {
        !matches!(self, ChannelRoute::Silenced)
    }

    /// Linear when enabled, silenced otherwise.
    pub fn linear_if(enabled: bool) -> Self {
        if enabled {
            ChannelRoute::Linear
        } else {
            ChannelRoute::Silenced
        }
    }
}

/// Linear buffer plus the three TND buffers.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffers {
    linear: BlipBuffer,
    tnd: [BlipBuffer; TND_BUFFER_COUNT],
}

impl OutputBuffers {
    /// Create unconfigured buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a route to its buffer.
    #[inline]
    pub fn get_mut(&mut self, route: ChannelRoute) -> Option<&mut BlipBuffer> {
        match route {
            ChannelRoute::Silenced => None,
            ChannelRoute::Linear => Some(&mut self.linear),
            ChannelRoute::Tnd(slot) => self.tnd.get_mut(slot),
        }
    }

    /// Resolve a route to its buffer.
    #[inline]
    pub fn get(&self, route: ChannelRoute) -> Option<&BlipBuffer> {
        match route {
            ChannelRoute::Silenced => None,
            ChannelRoute::Linear => Some(&self.linear),
            ChannelRoute::Tnd(slot) => self.tnd.get(slot),
        }
    }

    /// Linearly mixed buffer.
    pub fn linear(&self) -> &BlipBuffer {
        &self.linear
    }

    /// Linearly mixed buffer.
    pub fn linear_mut(&mut self) -> &mut BlipBuffer {
        &mut self.linear
    }

    /// TND buffers.
    pub fn tnd(&self) -> &[BlipBuffer; TND_BUFFER_COUNT] {
        &self.tnd
    }

    /// TND buffers.
    pub fn tnd_mut(&mut self) -> &mut [BlipBuffer; TND_BUFFER_COUNT] {
        &mut self.tnd
    }

    /// Linear buffer and TND buffers borrowed together.
    pub fn split_mut(&mut self) -> (&mut BlipBuffer, &mut [BlipBuffer; TND_BUFFER_COUNT]) {
        (&mut self.linear, &mut self.tnd)
    }

    /// Every buffer, linear first.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BlipBuffer> {
        std::iter::once(&mut self.linear).chain(self.tnd.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_resolution() {
        let mut bufs = OutputBuffers::new();
        bufs.tnd_mut()[2].set_clock_rate(1234);
        assert!(bufs.get(ChannelRoute::Silenced).is_none());
        assert!(bufs.get(ChannelRoute::Linear).is_some());
        assert_eq!(bufs.get_mut(ChannelRoute::Tnd(2)).map(|b| b.clock_rate()), Some(1234));
        assert!(bufs.get(ChannelRoute::Tnd(3)).is_none());
    }

    #[test]
    fn test_linear_if() {
        assert_eq!(ChannelRoute::linear_if(true), ChannelRoute::Linear);
        assert!(!ChannelRoute::linear_if(false).is_audible());
    }
}
